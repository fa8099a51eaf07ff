use chrono::Utc;
use db::models::comment::{Comment, CreateComment};

use super::{
    BoardError, BoardService, Loadable, Outcome,
    children::{local_id, owner_of},
    state::{ChildSlot, CommentsScope},
    validate_content,
};

impl BoardService {
    pub fn comments(&self, task_id: &str) -> Loadable<Vec<Comment>> {
        self.lock_state()
            .comments
            .get(task_id)
            .map(ChildSlot::items)
            .unwrap_or_default()
    }

    pub async fn fetch_comments(&self, task_id: &str) -> Result<Vec<Comment>, BoardError> {
        self.fetch_children(
            CommentsScope(task_id.to_string()),
            Comment::find_by_task_id(self.gateway(), task_id),
            "Failed to load comments",
        )
        .await
    }

    /// Posts a comment as `user_id`, normally the signed-in user.
    pub async fn add_comment(
        &self,
        task_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<Comment, BoardError> {
        let data = CreateComment {
            task_id: task_id.to_string(),
            user_id: user_id.to_string(),
            content: validate_content(content)?,
        };
        let draft = Comment::draft(local_id(), &data, Utc::now());
        self.add_child(
            CommentsScope(task_id.to_string()),
            draft,
            Comment::create(self.gateway(), &data),
            Outcome::success("Comment added", "Failed to add comment"),
        )
        .await
    }

    pub async fn delete_comment(&self, comment_id: &str) -> Result<(), BoardError> {
        let task_id = owner_of(&self.lock_state().comments, comment_id)
            .ok_or_else(|| BoardError::not_found("comment", comment_id))?;
        self.remove_child(
            CommentsScope(task_id),
            comment_id,
            Comment::delete(self.gateway(), comment_id),
            Outcome::info("Comment deleted", "Failed to delete comment"),
        )
        .await
    }
}
