pub mod column;
pub mod comment;
pub mod profile;
pub mod subtask;
pub mod task;
