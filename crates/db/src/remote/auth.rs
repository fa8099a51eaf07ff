use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;

use super::{RemoteClient, error_message};
use crate::auth::{AuthError, AuthProvider, AuthSession, AuthUser};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

impl From<TokenResponse> for AuthSession {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            user: response.user,
        }
    }
}

/// Sign-up answers with a session when the account is usable right away and
/// with the bare user when the address still needs confirming.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    Pending(AuthUser),
}

/// `AuthProvider` over the service's password auth endpoints.
pub struct RestAuth {
    client: Arc<RemoteClient>,
    session: watch::Sender<Option<AuthSession>>,
}

impl RestAuth {
    pub fn new(client: Arc<RemoteClient>) -> Self {
        let (session, _) = watch::channel(None);
        Self { client, session }
    }

    fn publish(&self, session: Option<AuthSession>) {
        self.client
            .set_access_token(session.as_ref().map(|s| s.access_token.clone()));
        self.session.send_replace(session);
    }

    async fn post(
        &self,
        path: &str,
        query: Option<(&str, &str)>,
        body: serde_json::Value,
    ) -> Result<(StatusCode, String), AuthError> {
        let mut url = self.client.endpoint(path)?;
        if let Some((key, value)) = query {
            url.query_pairs_mut().append_pair(key, value);
        }
        let response = self
            .client
            .request(Method::POST, url)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        Ok((status, response.text().await?))
    }
}

#[async_trait]
impl AuthProvider for RestAuth {
    async fn current_session(&self) -> Option<AuthSession> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.session.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let (status, body) = self
            .post(
                "auth/v1/token",
                Some(("grant_type", "password")),
                json!({ "email": email, "password": password }),
            )
            .await?;

        if status == StatusCode::BAD_REQUEST {
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let session: AuthSession = serde_json::from_str::<TokenResponse>(&body)?.into();
        tracing::info!(user_id = %session.user.id, "signed in");
        self.publish(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<AuthSession>, AuthError> {
        let (status, body) = self
            .post(
                "auth/v1/signup",
                None,
                json!({ "email": email, "password": password }),
            )
            .await?;

        if !status.is_success() {
            let message = error_message(&body);
            if message.to_lowercase().contains("already registered") {
                return Err(AuthError::AlreadyRegistered);
            }
            return Err(AuthError::Status {
                status: status.as_u16(),
                message,
            });
        }

        match serde_json::from_str(&body)? {
            SignUpResponse::Session(response) => {
                let session: AuthSession = response.into();
                tracing::info!(user_id = %session.user.id, "signed up and signed in");
                self.publish(Some(session.clone()));
                Ok(Some(session))
            }
            SignUpResponse::Pending(user) => {
                tracing::info!(user_id = %user.id, "signed up, awaiting confirmation");
                Ok(None)
            }
        }
    }

    /// Always drops the local session, even when the service call fails.
    async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.post("auth/v1/logout", None, json!({})).await;
        self.publish(None);
        tracing::info!("signed out");

        let (status, body) = result?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "remote sign-out failed");
            return Err(AuthError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(())
    }
}
