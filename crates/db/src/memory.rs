//! In-process stand-ins for the hosted service.
//!
//! `MemoryGateway` keeps rows in plain JSON tables and lets callers inject
//! failures or park a call until they decide its outcome. `MemoryAuth` is a
//! password table with a watch channel for session changes.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::{
    auth::{AuthError, AuthProvider, AuthSession, AuthUser},
    gateway::{Filter, Gateway, GatewayError, GatewayOp, Table},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub table: Table,
    pub op: GatewayOp,
    pub id: Option<String>,
}

struct Hold {
    started: oneshot::Sender<()>,
    release: oneshot::Receiver<bool>,
}

/// A parked gateway call. Dropping it lets the call succeed.
pub struct HeldCall {
    started: Option<oneshot::Receiver<()>>,
    release: Option<oneshot::Sender<bool>>,
}

impl HeldCall {
    /// Waits until the parked call has been issued.
    pub async fn started(&mut self) {
        if let Some(started) = self.started.take() {
            let _ = started.await;
        }
    }

    pub fn succeed(mut self) {
        self.finish(true);
    }

    pub fn fail(mut self) {
        self.finish(false);
    }

    fn finish(&mut self, succeed: bool) {
        if let Some(release) = self.release.take() {
            let _ = release.send(succeed);
        }
    }
}

impl Drop for HeldCall {
    fn drop(&mut self) {
        self.finish(true);
    }
}

#[derive(Default)]
struct Tables {
    rows: HashMap<Table, Vec<Value>>,
    failures: HashMap<(Table, GatewayOp), usize>,
    holds: HashMap<(Table, GatewayOp), VecDeque<Hold>>,
    offline: bool,
    calls: Vec<GatewayCall>,
}

#[derive(Default)]
pub struct MemoryGateway {
    inner: Mutex<Tables>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Appends rows directly, bypassing failure injection and the call log.
    pub fn seed<T: Serialize>(&self, table: Table, rows: &[T]) -> Result<(), serde_json::Error> {
        let values = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.lock().rows.entry(table).or_default().extend(values);
        Ok(())
    }

    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.lock().rows.get(&table).cloned().unwrap_or_default()
    }

    pub fn row(&self, table: Table, id: &str) -> Option<Value> {
        self.lock()
            .rows
            .get(&table)
            .and_then(|rows| rows.iter().find(|row| row_id(row) == Some(id)).cloned())
    }

    /// Makes the next `op` on `table` fail. Calls stack.
    pub fn fail_next(&self, table: Table, op: GatewayOp) {
        *self.lock().failures.entry((table, op)).or_default() += 1;
    }

    /// While offline every call fails.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Parks the next `op` on `table` until the returned handle is resolved.
    pub fn hold_next(&self, table: Table, op: GatewayOp) -> HeldCall {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.lock()
            .holds
            .entry((table, op))
            .or_default()
            .push_back(Hold {
                started: started_tx,
                release: release_rx,
            });
        HeldCall {
            started: Some(started_rx),
            release: Some(release_tx),
        }
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, table: Table, op: GatewayOp) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.table == table && call.op == op)
            .count()
    }

    async fn enter(&self, table: Table, op: GatewayOp, id: Option<&str>) -> Result<(), GatewayError> {
        let hold = {
            let mut tables = self.lock();
            tables.calls.push(GatewayCall {
                table,
                op,
                id: id.map(str::to_string),
            });
            tables
                .holds
                .get_mut(&(table, op))
                .and_then(VecDeque::pop_front)
        };

        if let Some(hold) = hold {
            let _ = hold.started.send(());
            if !hold.release.await.unwrap_or(true) {
                return Err(GatewayError::Rejected { table, op });
            }
        }

        let mut tables = self.lock();
        if tables.offline {
            return Err(GatewayError::Rejected { table, op });
        }
        if let Some(pending) = tables.failures.get_mut(&(table, op))
            && *pending > 0
        {
            *pending -= 1;
            return Err(GatewayError::Rejected { table, op });
        }
        Ok(())
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn created_at(row: &Value) -> Option<DateTime<Utc>> {
    row.get("created_at")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn select(
        &self,
        table: Table,
        filter: Option<&Filter>,
    ) -> Result<Vec<Value>, GatewayError> {
        self.enter(table, GatewayOp::Select, None).await?;
        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| filter.is_none_or(|filter| filter.matches(row)))
            .collect();
        rows.sort_by_key(created_at);
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value, GatewayError> {
        let supplied_id = row_id(&row).map(str::to_string);
        self.enter(table, GatewayOp::Insert, supplied_id.as_deref())
            .await?;

        let Value::Object(mut row) = row else {
            return Err(GatewayError::Status {
                status: 400,
                message: "row must be a JSON object".to_string(),
            });
        };

        let id = supplied_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut tables = self.lock();
        let rows = tables.rows.entry(table).or_default();
        if rows.iter().any(|existing| row_id(existing) == Some(id.as_str())) {
            return Err(GatewayError::Status {
                status: 409,
                message: format!("duplicate key value for {table}.id"),
            });
        }

        let now = json!(Utc::now());
        row.insert("id".to_string(), json!(id));
        row.entry("created_at").or_insert_with(|| now.clone());
        if table == Table::Tasks {
            row.entry("updated_at").or_insert(now);
        }
        let stored = Value::Object(row);
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, table: Table, id: &str, fields: Value) -> Result<(), GatewayError> {
        self.enter(table, GatewayOp::Update, Some(id)).await?;

        let mut tables = self.lock();
        let row = tables
            .rows
            .get_mut(&table)
            .and_then(|rows| rows.iter_mut().find(|row| row_id(row) == Some(id)))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| GatewayError::NotFound {
                table,
                id: id.to_string(),
            })?;

        if let Value::Object(fields) = fields {
            for (key, value) in fields {
                row.insert(key, value);
            }
        }
        if table == Table::Tasks {
            row.insert("updated_at".to_string(), json!(Utc::now()));
        }
        Ok(())
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), GatewayError> {
        self.enter(table, GatewayOp::Delete, Some(id)).await?;
        if let Some(rows) = self.lock().rows.get_mut(&table) {
            rows.retain(|row| row_id(row) != Some(id));
        }
        Ok(())
    }
}

struct Account {
    password: String,
    user: AuthUser,
}

pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    session: watch::Sender<Option<AuthSession>>,
    auto_confirm: bool,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session,
            auto_confirm: true,
        }
    }

    /// Sign-ups stay unconfirmed and return no session.
    pub fn requiring_confirmation(mut self) -> Self {
        self.auto_confirm = false;
        self
    }

    pub fn with_account(self, email: &str, password: &str) -> Self {
        self.register(email, password);
        self
    }

    fn register(&self, email: &str, password: &str) -> AuthUser {
        let user = AuthUser {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
        };
        self.accounts
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                },
            );
        user
    }

    fn open_session(&self, user: AuthUser) -> AuthSession {
        let session = AuthSession {
            access_token: Uuid::new_v4().to_string(),
            user,
        };
        self.session.send_replace(Some(session.clone()));
        session
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn current_session(&self) -> Option<AuthSession> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.session.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let user = {
            let accounts = self.accounts.lock().unwrap_or_else(|err| err.into_inner());
            match accounts.get(email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(AuthError::InvalidCredentials),
            }
        };
        Ok(self.open_session(user))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<AuthSession>, AuthError> {
        let exists = self
            .accounts
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .contains_key(email);
        if exists {
            return Err(AuthError::AlreadyRegistered);
        }
        let user = self.register(email, password);
        Ok(self.auto_confirm.then(|| self.open_session(user)))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.session.send_replace(None);
        Ok(())
    }
}
