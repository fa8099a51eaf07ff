use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::gateway::{Filter, Gateway, GatewayError, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub task_id: String,
    pub content: String,
    #[serde(default)]
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubtask {
    pub task_id: String,
    pub content: String,
}

impl Subtask {
    pub fn draft(id: String, data: &CreateSubtask, now: DateTime<Utc>) -> Self {
        Self {
            id,
            task_id: data.task_id.clone(),
            content: data.content.clone(),
            is_completed: false,
            created_at: now,
        }
    }

    /// Subtasks of one task, oldest first.
    pub async fn find_by_task_id<G: Gateway + ?Sized>(
        gateway: &G,
        task_id: &str,
    ) -> Result<Vec<Self>, GatewayError> {
        let rows = gateway
            .select(Table::Subtasks, Some(&Filter::eq("task_id", task_id)))
            .await?;
        let mut subtasks = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Self>, _>>()?;
        subtasks.sort_by_key(|subtask| subtask.created_at);
        Ok(subtasks)
    }

    /// Inserts without an id; the remote assigns it.
    pub async fn create<G: Gateway + ?Sized>(
        gateway: &G,
        data: &CreateSubtask,
    ) -> Result<Self, GatewayError> {
        let row = json!({
            "task_id": data.task_id,
            "content": data.content,
            "is_completed": false,
        });
        let stored = gateway.insert(Table::Subtasks, row).await?;
        Ok(serde_json::from_value(stored)?)
    }

    pub async fn set_completed<G: Gateway + ?Sized>(
        gateway: &G,
        id: &str,
        is_completed: bool,
    ) -> Result<(), GatewayError> {
        gateway
            .update(Table::Subtasks, id, json!({ "is_completed": is_completed }))
            .await
    }

    pub async fn delete<G: Gateway + ?Sized>(gateway: &G, id: &str) -> Result<(), GatewayError> {
        gateway.delete(Table::Subtasks, id).await
    }
}
