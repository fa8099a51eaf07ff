use chrono::Utc;
use db::models::subtask::{CreateSubtask, Subtask};

use super::{
    BoardError, BoardService, Loadable, Outcome,
    children::{local_id, owner_of},
    state::{ChildSlot, SubtasksScope},
    validate_content,
};

impl BoardService {
    /// Subtasks of a task as currently known locally.
    pub fn subtasks(&self, task_id: &str) -> Loadable<Vec<Subtask>> {
        self.lock_state()
            .subtasks
            .get(task_id)
            .map(ChildSlot::items)
            .unwrap_or_default()
    }

    pub async fn fetch_subtasks(&self, task_id: &str) -> Result<Vec<Subtask>, BoardError> {
        self.fetch_children(
            SubtasksScope(task_id.to_string()),
            Subtask::find_by_task_id(self.gateway(), task_id),
            "Failed to load subtasks",
        )
        .await
    }

    pub async fn add_subtask(&self, task_id: &str, content: &str) -> Result<Subtask, BoardError> {
        let data = CreateSubtask {
            task_id: task_id.to_string(),
            content: validate_content(content)?,
        };
        let draft = Subtask::draft(local_id(), &data, Utc::now());
        self.add_child(
            SubtasksScope(task_id.to_string()),
            draft,
            Subtask::create(self.gateway(), &data),
            Outcome::success("Subtask added", "Failed to add subtask"),
        )
        .await
    }

    pub async fn toggle_subtask(
        &self,
        subtask_id: &str,
        is_completed: bool,
    ) -> Result<(), BoardError> {
        let task_id = self.subtask_owner(subtask_id)?;
        self.edit_child(
            SubtasksScope(task_id),
            subtask_id,
            |subtask| subtask.is_completed = is_completed,
            Subtask::set_completed(self.gateway(), subtask_id, is_completed),
            Outcome::success("Subtask updated", "Failed to update subtask"),
        )
        .await
    }

    pub async fn delete_subtask(&self, subtask_id: &str) -> Result<(), BoardError> {
        let task_id = self.subtask_owner(subtask_id)?;
        self.remove_child(
            SubtasksScope(task_id),
            subtask_id,
            Subtask::delete(self.gateway(), subtask_id),
            Outcome::info("Subtask deleted", "Failed to delete subtask"),
        )
        .await
    }

    fn subtask_owner(&self, subtask_id: &str) -> Result<String, BoardError> {
        owner_of(&self.lock_state().subtasks, subtask_id)
            .ok_or_else(|| BoardError::not_found("subtask", subtask_id))
    }
}
