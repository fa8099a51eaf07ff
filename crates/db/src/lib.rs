//! Entities, remote seams and gateway implementations for the Kanban board.

pub mod auth;
pub mod gateway;
pub mod memory;
pub mod models;
pub mod remote;
pub mod types;

pub use auth::{AuthError, AuthProvider, AuthSession, AuthUser};
pub use gateway::{Filter, Gateway, GatewayError, GatewayOp, Table};
pub use memory::{MemoryAuth, MemoryGateway};
pub use remote::{RemoteClient, auth::RestAuth, gateway::RestGateway};
