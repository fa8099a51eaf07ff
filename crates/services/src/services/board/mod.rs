//! The board's entity store.
//!
//! Every mutation is applied locally first, then persisted with exactly one
//! gateway call. A failed call rolls the local change back and leaves one
//! error notification; nothing is retried.

mod children;
mod comments;
pub mod reorder;
pub mod state;
mod subtasks;
pub mod tentative;
#[cfg(test)]
mod tests;

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use db::{
    gateway::{Gateway, GatewayError},
    models::{
        column::Column,
        profile::Profile,
        task::{CreateTask, Priority, Task, UpdateTask},
    },
};
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::broadcast, task::JoinHandle};
use uuid::Uuid;

pub use reorder::{InvalidMove, TaskMove};
use state::{BoardState, Scope, TasksScope};
pub use tentative::Loadable;
use tentative::Change;

use crate::services::{
    config::BoardConfig,
    events::{BoardEvent, ChangeFeed},
    notifications::{Notification, NotificationKind, NotificationQueue},
};

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    InvalidMove(#[from] InvalidMove),
    #[error("{kind} of task {task_id} are not loaded")]
    ChildrenNotLoaded { kind: &'static str, task_id: String },
    #[error("{id} is still being created")]
    PendingCreate { id: String },
    #[error(transparent)]
    Remote(#[from] GatewayError),
}

impl BoardError {
    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Notifications a tentative transition leaves behind.
struct Outcome {
    success: (NotificationKind, &'static str),
    failure: &'static str,
}

impl Outcome {
    fn success(message: &'static str, failure: &'static str) -> Self {
        Self {
            success: (NotificationKind::Success, message),
            failure,
        }
    }

    fn info(message: &'static str, failure: &'static str) -> Self {
        Self {
            success: (NotificationKind::Info, message),
            failure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCount {
    pub column_id: String,
    pub title: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardStats {
    pub total: usize,
    pub per_column: Vec<ColumnCount>,
    /// Tasks in the terminal column.
    pub completed: usize,
}

struct BoardInner {
    gateway: Arc<dyn Gateway>,
    config: BoardConfig,
    state: Mutex<BoardState>,
    notifications: NotificationQueue,
    feed: ChangeFeed,
}

#[derive(Clone)]
pub struct BoardService {
    inner: Arc<BoardInner>,
}

impl BoardService {
    pub fn new(gateway: Arc<dyn Gateway>, config: BoardConfig) -> Self {
        let notifications = NotificationQueue::new(config.notification_ttl());
        let feed = ChangeFeed::new(config.event_capacity);
        Self {
            inner: Arc::new(BoardInner {
                gateway,
                config,
                state: Mutex::new(BoardState::default()),
                notifications,
                feed,
            }),
        }
    }

    fn gateway(&self) -> &dyn Gateway {
        self.inner.gateway.as_ref()
    }

    fn lock_state(&self) -> MutexGuard<'_, BoardState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }

    fn publish(&self, event: BoardEvent) {
        self.inner.feed.publish(event);
    }

    pub fn config(&self) -> &BoardConfig {
        &self.inner.config
    }

    pub fn columns(&self) -> &[Column] {
        &self.inner.config.columns
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.inner.feed.subscribe()
    }

    // Notifications

    pub fn add_notification(
        &self,
        kind: NotificationKind,
        message: impl Into<String>,
    ) -> Notification {
        let notification = self.inner.notifications.push(kind, message);
        self.publish(BoardEvent::NotificationsChanged);
        notification
    }

    pub fn dismiss_notification(&self, id: Uuid) -> bool {
        let removed = self.inner.notifications.dismiss(id);
        if removed {
            self.publish(BoardEvent::NotificationsChanged);
        }
        removed
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.notifications.list()
    }

    /// Periodically drops expired notifications so subscribers see them go.
    pub fn spawn_notification_reaper(&self, every: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if service.inner.notifications.prune_expired() > 0 {
                    service.publish(BoardEvent::NotificationsChanged);
                }
            }
        })
    }

    // Views

    pub fn tasks(&self) -> Vec<Task> {
        self.lock_state().tasks.items().to_vec()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.lock_state().tasks.get(task_id).cloned()
    }

    /// Tasks of one column in board order.
    pub fn tasks_in_column(&self, column_id: &str) -> Vec<Task> {
        self.lock_state()
            .tasks
            .items()
            .iter()
            .filter(|task| task.column_id == column_id)
            .cloned()
            .collect()
    }

    pub fn is_loading(&self) -> bool {
        self.lock_state().is_loading
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.lock_state().profiles.clone()
    }

    pub fn active_task(&self) -> Option<Task> {
        let state = self.lock_state();
        state
            .active_task
            .as_deref()
            .and_then(|id| state.tasks.get(id))
            .cloned()
    }

    pub fn set_active_task(&self, task_id: Option<&str>) -> Result<(), BoardError> {
        {
            let mut state = self.lock_state();
            if let Some(id) = task_id
                && state.tasks.get(id).is_none()
            {
                return Err(BoardError::not_found("task", id));
            }
            state.active_task = task_id.map(str::to_string);
        }
        self.publish(BoardEvent::SelectionChanged);
        Ok(())
    }

    pub fn stats(&self) -> BoardStats {
        let state = self.lock_state();
        let tasks = state.tasks.items();
        let count_in = |column_id: &str| tasks.iter().filter(|t| t.column_id == column_id).count();

        BoardStats {
            total: tasks.len(),
            per_column: self
                .columns()
                .iter()
                .map(|column| ColumnCount {
                    column_id: column.id.clone(),
                    title: column.title.clone(),
                    count: count_in(&column.id),
                })
                .collect(),
            completed: count_in(&self.config().terminal_column),
        }
    }

    /// Case-insensitive match on task content, optionally within one column.
    pub fn search_tasks(&self, query: &str, column_filter: Option<&str>) -> Vec<Task> {
        let needle = query.trim().to_lowercase();
        self.lock_state()
            .tasks
            .items()
            .iter()
            .filter(|task| column_filter.is_none_or(|column| task.column_id == column))
            .filter(|task| needle.is_empty() || task.content.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Drops all board data. Notifications are kept.
    pub fn clear(&self) {
        {
            let mut state = self.lock_state();
            state.tasks.replace_all(Vec::new());
            state.subtasks.clear();
            state.comments.clear();
            state.profiles.clear();
            state.active_task = None;
        }
        tracing::debug!("board state cleared");
        self.publish(BoardEvent::TasksChanged);
        self.publish(BoardEvent::ProfilesChanged);
        self.publish(BoardEvent::SelectionChanged);
    }

    // Loading

    pub async fn fetch_tasks(&self) -> Result<(), BoardError> {
        self.lock_state().is_loading = true;
        self.publish(BoardEvent::LoadingChanged);

        let result = Task::find_all(self.gateway()).await;
        let loaded = {
            let mut state = self.lock_state();
            state.is_loading = false;
            match result {
                Ok(tasks) => {
                    tracing::debug!(count = tasks.len(), "tasks loaded");
                    state.tasks.reload(tasks);
                    state.forget_missing_tasks();
                    Ok(())
                }
                Err(err) => Err(err),
            }
        };
        self.publish(BoardEvent::LoadingChanged);

        match loaded {
            Ok(()) => {
                self.publish(BoardEvent::TasksChanged);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load tasks");
                self.add_notification(NotificationKind::Error, "Failed to load tasks");
                Err(err.into())
            }
        }
    }

    pub async fn fetch_profiles(&self) -> Result<(), BoardError> {
        match Profile::find_all(self.gateway()).await {
            Ok(profiles) => {
                self.lock_state().profiles = profiles;
                self.publish(BoardEvent::ProfilesChanged);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load profiles");
                self.add_notification(NotificationKind::Error, "Failed to load profiles");
                Err(err.into())
            }
        }
    }

    // Tentative transitions

    /// Applies `next` to the scoped collection, persists it with `remote`
    /// and confirms or rolls back depending on the outcome. When `remote`
    /// yields a stored entity it replaces the locally created one.
    async fn run_tentative<S, Fut>(
        &self,
        scope: &S,
        change: Change,
        next: impl FnOnce(&tentative::TrackedList<S::Item>) -> Result<Vec<S::Item>, BoardError>,
        remote: Fut,
        outcome: Outcome,
    ) -> Result<Option<S::Item>, BoardError>
    where
        S: Scope,
        Fut: Future<Output = Result<Option<S::Item>, GatewayError>>,
    {
        let transition = {
            let mut state = self.lock_state();
            let list = scope.list(&mut state)?;
            let next = next(&*list)?;
            list.commit(next, change)
        };
        tracing::debug!(
            scope = scope.name(),
            revision = transition.revision(),
            "applied local change"
        );
        self.publish(scope.event());

        match remote.await {
            Ok(stored) => {
                {
                    let mut state = self.lock_state();
                    if let Some(list) = scope.settling(&mut state) {
                        match stored.clone() {
                            Some(stored) => list.reconcile(transition, stored),
                            None => list.confirm(transition),
                        }
                    }
                }
                if stored.is_some() {
                    self.publish(scope.event());
                }
                let (kind, message) = outcome.success;
                self.add_notification(kind, message);
                Ok(stored)
            }
            Err(err) => {
                tracing::warn!(scope = scope.name(), error = %err, "remote call failed, rolling back");
                {
                    let mut state = self.lock_state();
                    if let Some(list) = scope.settling(&mut state) {
                        list.rollback(transition);
                    }
                }
                self.publish(scope.event());
                self.add_notification(NotificationKind::Error, outcome.failure);
                Err(err.into())
            }
        }
    }

    // Tasks

    pub async fn add_task(&self, data: CreateTask) -> Result<Task, BoardError> {
        let content = validate_content(&data.content)?;
        if self.config().column(&data.column_id).is_none() {
            return Err(BoardError::Validation(format!(
                "column {} is not on the board",
                data.column_id
            )));
        }
        let data = CreateTask { content, ..data };

        let task_id = Uuid::new_v4().to_string();
        let draft = Task::draft(task_id.clone(), &data, Utc::now());
        let stored = self
            .run_tentative(
                &TasksScope,
                Change::Create(task_id.clone()),
                |list| {
                    let mut next = list.items().to_vec();
                    next.push(draft.clone());
                    Ok(next)
                },
                async {
                    Task::create(self.gateway(), &data, &task_id)
                        .await
                        .map(Some)
                },
                Outcome::success("Task created", "Failed to create task"),
            )
            .await?;
        Ok(stored.unwrap_or(draft))
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), BoardError> {
        self.run_tentative(
            &TasksScope,
            Change::Touch(vec![task_id.to_string()]),
            |list| {
                settled_task(list, task_id)?;
                Ok(list
                    .items()
                    .iter()
                    .filter(|task| task.id != task_id)
                    .cloned()
                    .collect())
            },
            async { Task::delete(self.gateway(), task_id).await.map(|()| None) },
            Outcome::info("Task deleted", "Failed to delete task"),
        )
        .await?;

        self.lock_state().forget_missing_tasks();
        Ok(())
    }

    async fn update_task(
        &self,
        task_id: &str,
        data: UpdateTask,
        outcome: Outcome,
    ) -> Result<(), BoardError> {
        let now = Utc::now();
        self.run_tentative(
            &TasksScope,
            Change::Touch(vec![task_id.to_string()]),
            |list| {
                settled_task(list, task_id)?;
                Ok(list
                    .items()
                    .iter()
                    .map(|task| {
                        let mut task = task.clone();
                        if task.id == task_id {
                            task.apply(&data, now);
                        }
                        task
                    })
                    .collect())
            },
            async {
                Task::update(self.gateway(), task_id, &data)
                    .await
                    .map(|()| None)
            },
            outcome,
        )
        .await?;
        Ok(())
    }

    pub async fn update_task_content(&self, task_id: &str, content: &str) -> Result<(), BoardError> {
        let content = validate_content(content)?;
        self.update_task(
            task_id,
            UpdateTask::content(content),
            Outcome::success("Task updated", "Failed to update task"),
        )
        .await
    }

    pub async fn update_task_priority(
        &self,
        task_id: &str,
        priority: Priority,
    ) -> Result<(), BoardError> {
        self.update_task(
            task_id,
            UpdateTask::priority(priority),
            Outcome::success("Priority updated", "Failed to update priority"),
        )
        .await
    }

    pub async fn update_task_assignee(
        &self,
        task_id: &str,
        assignee_id: Option<String>,
    ) -> Result<(), BoardError> {
        self.update_task(
            task_id,
            UpdateTask::assignee(assignee_id),
            Outcome::success("Assignee updated", "Failed to update assignee"),
        )
        .await
    }

    pub async fn update_task_description(
        &self,
        task_id: &str,
        description: Option<String>,
    ) -> Result<(), BoardError> {
        // Blank descriptions are stored as absent.
        let description = description.filter(|text| !text.trim().is_empty());
        self.update_task(
            task_id,
            UpdateTask::description(description),
            Outcome::success("Description updated", "Failed to update description"),
        )
        .await
    }

    pub async fn update_task_due_date(
        &self,
        task_id: &str,
        due_date: Option<DateTime<Utc>>,
    ) -> Result<(), BoardError> {
        self.update_task(
            task_id,
            UpdateTask::due_date(due_date),
            Outcome::success("Due date updated", "Failed to update due date"),
        )
        .await
    }

    /// Moves a task between or within columns.
    ///
    /// Dropping a task where it already is does nothing. Reordering within a
    /// column is local only, since task position is not persisted. Moving to
    /// another column persists the new `column_id`.
    pub async fn move_task(&self, mv: TaskMove) -> Result<(), BoardError> {
        if mv.is_noop() {
            return Ok(());
        }

        if !mv.crosses_columns() {
            {
                let mut state = self.lock_state();
                settled_task(&state.tasks, &mv.task_id)?;
                let next = reorder::reorder(state.tasks.items(), self.columns(), &mv)?;
                let transition = state
                    .tasks
                    .commit(next, Change::Touch(vec![mv.task_id.clone()]));
                state.tasks.confirm(transition);
            }
            tracing::debug!(task_id = %mv.task_id, "reordered within column");
            self.publish(BoardEvent::TasksChanged);
            return Ok(());
        }

        let config = self.config();
        let completes =
            config.is_terminal(&mv.dest_column_id) && !config.is_terminal(&mv.source_column_id);
        let outcome = if completes {
            Outcome::success("Task completed! Great work!", "Failed to move task")
        } else {
            Outcome::success("Task moved", "Failed to move task")
        };
        let update = UpdateTask::column(mv.dest_column_id.clone());

        self.run_tentative(
            &TasksScope,
            Change::Touch(vec![mv.task_id.clone()]),
            |list| {
                settled_task(list, &mv.task_id)?;
                Ok(reorder::reorder(list.items(), self.columns(), &mv)?)
            },
            async {
                Task::update(self.gateway(), &mv.task_id, &update)
                    .await
                    .map(|()| None)
            },
            outcome,
        )
        .await?;
        Ok(())
    }
}

/// Rejects blank text; returns it trimmed.
fn validate_content(content: &str) -> Result<String, BoardError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(BoardError::Validation("content must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

/// The task exists and its insert has been confirmed.
fn settled_task<'a>(
    list: &'a tentative::TrackedList<Task>,
    task_id: &str,
) -> Result<&'a Task, BoardError> {
    let task = list
        .get(task_id)
        .ok_or_else(|| BoardError::not_found("task", task_id))?;
    if list.is_pending(task_id) {
        return Err(BoardError::PendingCreate {
            id: task_id.to_string(),
        });
    }
    Ok(task)
}
