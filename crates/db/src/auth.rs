use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub user: AuthUser,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("Email already registered")]
    AlreadyRegistered,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid auth url: {0}")]
    Url(#[from] url::ParseError),
    #[error("auth service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error(transparent)]
    Decode(#[from] serde_json::Error),
}

/// Session-based authentication provided by the hosted service.
///
/// Session changes (sign-in, sign-out) are published on a watch channel so
/// the board can load or drop its data without polling.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_session(&self) -> Option<AuthSession>;

    fn subscribe(&self) -> watch::Receiver<Option<AuthSession>>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// Registers a user. Returns a session when the service signs the user in
    /// immediately, `None` when the address still has to be confirmed.
    async fn sign_up(&self, email: &str, password: &str)
    -> Result<Option<AuthSession>, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}
