//! Keeps the board's data in step with the signed-in session.
//!
//! The board itself holds no session. The gate listens to the auth
//! provider's session channel, loads tasks and profiles once for every newly
//! established session and clears the board when the session ends.

use std::sync::Arc;

use db::auth::{AuthError, AuthProvider, AuthSession, AuthUser};
use tokio::{sync::watch, task::JoinHandle};

use super::board::BoardService;

#[derive(Clone)]
pub struct SessionGate {
    auth: Arc<dyn AuthProvider>,
    board: BoardService,
    /// User the board is currently loaded for.
    loaded: Arc<watch::Sender<Option<AuthUser>>>,
}

impl SessionGate {
    pub fn new(auth: Arc<dyn AuthProvider>, board: BoardService) -> Self {
        let (loaded, _) = watch::channel(None);
        Self {
            auth,
            board,
            loaded: Arc::new(loaded),
        }
    }

    pub fn board(&self) -> &BoardService {
        &self.board
    }

    pub async fn current_user(&self) -> Option<AuthUser> {
        self.auth.current_session().await.map(|session| session.user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.auth.sign_in(email, password).await
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<AuthSession>, AuthError> {
        self.auth.sign_up(email, password).await
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.auth.sign_out().await
    }

    /// Waits until the board has been loaded for a session and returns its
    /// user. Returns `None` if the gate is gone.
    pub async fn until_loaded(&self) -> Option<AuthUser> {
        let mut loaded = self.loaded.subscribe();
        let user = loaded.wait_for(Option::is_some).await.ok()?;
        (*user).clone()
    }

    /// Starts following session changes. The current session, if any, is
    /// handled right away.
    pub fn spawn(&self) -> JoinHandle<()> {
        let board = self.board.clone();
        let sessions = self.auth.subscribe();
        let loaded = self.loaded.clone();
        tokio::spawn(follow_sessions(board, sessions, loaded))
    }
}

async fn follow_sessions(
    board: BoardService,
    mut sessions: watch::Receiver<Option<AuthSession>>,
    loaded: Arc<watch::Sender<Option<AuthUser>>>,
) {
    let mut active: Option<String> = None;
    loop {
        let session = sessions.borrow_and_update().clone();
        apply_session(&board, session.as_ref(), &mut active).await;
        loaded.send_replace(session.map(|session| session.user));
        if sessions.changed().await.is_err() {
            tracing::debug!("session channel closed");
            return;
        }
    }
}

/// `active` is the access token of the session the board was loaded for.
async fn apply_session(
    board: &BoardService,
    session: Option<&AuthSession>,
    active: &mut Option<String>,
) {
    match session {
        Some(session) if active.as_deref() == Some(session.access_token.as_str()) => {}
        Some(session) => {
            if active.is_some() {
                board.clear();
            }
            *active = Some(session.access_token.clone());
            tracing::info!(user = %session.user.email, "session established, loading board");

            // Failures are already reported as notifications.
            let (tasks, profiles) = tokio::join!(board.fetch_tasks(), board.fetch_profiles());
            if let Err(err) = tasks.and(profiles) {
                tracing::warn!(error = %err, "board only partially loaded");
            }
        }
        None => {
            if active.take().is_some() {
                tracing::info!("session ended, clearing board");
                board.clear();
            }
        }
    }
}
