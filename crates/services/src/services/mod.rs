pub mod board;
pub mod config;
pub mod events;
pub mod notifications;
pub mod session;
