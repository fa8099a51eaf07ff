use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::gateway::{Filter, Gateway, GatewayError, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateComment {
    pub task_id: String,
    pub user_id: String,
    pub content: String,
}

impl Comment {
    pub fn draft(id: String, data: &CreateComment, now: DateTime<Utc>) -> Self {
        Self {
            id,
            task_id: data.task_id.clone(),
            user_id: data.user_id.clone(),
            content: data.content.clone(),
            created_at: now,
        }
    }

    pub async fn find_by_task_id<G: Gateway + ?Sized>(
        gateway: &G,
        task_id: &str,
    ) -> Result<Vec<Self>, GatewayError> {
        let rows = gateway
            .select(Table::Comments, Some(&Filter::eq("task_id", task_id)))
            .await?;
        let mut comments = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Self>, _>>()?;
        comments.sort_by_key(|comment| comment.created_at);
        Ok(comments)
    }

    pub async fn create<G: Gateway + ?Sized>(
        gateway: &G,
        data: &CreateComment,
    ) -> Result<Self, GatewayError> {
        let row = json!({
            "task_id": data.task_id,
            "user_id": data.user_id,
            "content": data.content,
        });
        let stored = gateway.insert(Table::Comments, row).await?;
        Ok(serde_json::from_value(stored)?)
    }

    pub async fn delete<G: Gateway + ?Sized>(gateway: &G, id: &str) -> Result<(), GatewayError> {
        gateway.delete(Table::Comments, id).await
    }
}
