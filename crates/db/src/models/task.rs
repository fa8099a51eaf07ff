use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub use crate::types::Priority;
use crate::gateway::{Gateway, GatewayError, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub column_id: String,
    pub content: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub column_id: String,
    pub content: String,
    pub priority: Option<Priority>,
    pub assignee_id: Option<String>,
}

impl CreateTask {
    pub fn new(column_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            column_id: column_id.into(),
            content: content.into(),
            priority: None,
            assignee_id: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Partial field set for a task update. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl UpdateTask {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..Default::default()
        }
    }

    pub fn column(column_id: impl Into<String>) -> Self {
        Self {
            column_id: Some(column_id.into()),
            ..Default::default()
        }
    }

    pub fn assignee(assignee_id: Option<String>) -> Self {
        Self {
            assignee_id: Some(assignee_id),
            ..Default::default()
        }
    }

    pub fn description(description: Option<String>) -> Self {
        Self {
            description: Some(description),
            ..Default::default()
        }
    }

    pub fn due_date(due_date: Option<DateTime<Utc>>) -> Self {
        Self {
            due_date: Some(due_date),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Task {
    /// Builds the local row shown before the remote insert is confirmed.
    pub fn draft(id: String, data: &CreateTask, now: DateTime<Utc>) -> Self {
        Self {
            id,
            column_id: data.column_id.clone(),
            content: data.content.clone(),
            priority: data.priority.unwrap_or_default(),
            assignee_id: data.assignee_id.clone(),
            description: None,
            due_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies an update locally, mirroring what the remote row will hold.
    pub fn apply(&mut self, data: &UpdateTask, now: DateTime<Utc>) {
        if let Some(column_id) = &data.column_id {
            self.column_id = column_id.clone();
        }
        if let Some(content) = &data.content {
            self.content = content.clone();
        }
        if let Some(priority) = data.priority {
            self.priority = priority;
        }
        if let Some(assignee_id) = &data.assignee_id {
            self.assignee_id = assignee_id.clone();
        }
        if let Some(description) = &data.description {
            self.description = description.clone();
        }
        if let Some(due_date) = data.due_date {
            self.due_date = due_date;
        }
        self.updated_at = now;
    }

    pub async fn find_all<G: Gateway + ?Sized>(gateway: &G) -> Result<Vec<Self>, GatewayError> {
        let rows = gateway.select(Table::Tasks, None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(GatewayError::from))
            .collect()
    }

    /// Inserts a task under a caller-supplied id so the local draft and the
    /// stored row share an identifier from the start.
    pub async fn create<G: Gateway + ?Sized>(
        gateway: &G,
        data: &CreateTask,
        task_id: &str,
    ) -> Result<Self, GatewayError> {
        let mut row = Map::new();
        row.insert("id".to_string(), json!(task_id));
        row.insert("column_id".to_string(), json!(data.column_id));
        row.insert("content".to_string(), json!(data.content));
        row.insert(
            "priority".to_string(),
            json!(data.priority.unwrap_or_default()),
        );
        if let Some(assignee_id) = &data.assignee_id {
            row.insert("assignee_id".to_string(), json!(assignee_id));
        }

        let stored = gateway.insert(Table::Tasks, Value::Object(row)).await?;
        Ok(serde_json::from_value(stored)?)
    }

    pub async fn update<G: Gateway + ?Sized>(
        gateway: &G,
        id: &str,
        data: &UpdateTask,
    ) -> Result<(), GatewayError> {
        let fields = serde_json::to_value(data)?;
        gateway.update(Table::Tasks, id, fields).await
    }

    pub async fn delete<G: Gateway + ?Sized>(gateway: &G, id: &str) -> Result<(), GatewayError> {
        gateway.delete(Table::Tasks, id).await
    }
}
