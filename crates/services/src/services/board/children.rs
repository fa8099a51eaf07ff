use std::{collections::HashMap, future::Future};

use db::gateway::GatewayError;
use uuid::Uuid;

use super::{
    BoardError, BoardService, Outcome,
    state::{ChildScope, ChildSlot},
    tentative::{Change, Entity, TrackedList},
};
use crate::services::notifications::NotificationKind;

/// Id of a child row whose insert has not been confirmed yet.
pub(super) fn local_id() -> String {
    format!("temp-{}", Uuid::new_v4())
}

/// Finds the task whose loaded collection holds `child_id`.
pub(super) fn owner_of<T: Entity>(
    slots: &HashMap<String, ChildSlot<T>>,
    child_id: &str,
) -> Option<String> {
    slots
        .iter()
        .find_map(|(task_id, slot)| slot.get(child_id).map(|_| task_id.clone()))
}

fn settled_child<'a, T: Entity>(
    list: &'a TrackedList<T>,
    kind: &'static str,
    child_id: &str,
) -> Result<&'a T, BoardError> {
    let child = list
        .get(child_id)
        .ok_or_else(|| BoardError::not_found(kind, child_id))?;
    if list.is_pending(child_id) {
        return Err(BoardError::PendingCreate {
            id: child_id.to_string(),
        });
    }
    Ok(child)
}

impl BoardService {
    /// Loads one task's child collection, passing through `Loading`.
    /// A failed fetch leaves the collection as it was.
    pub(super) async fn fetch_children<S, Fut>(
        &self,
        scope: S,
        fetch: Fut,
        failure: &'static str,
    ) -> Result<Vec<S::Item>, BoardError>
    where
        S: ChildScope,
        Fut: Future<Output = Result<Vec<S::Item>, GatewayError>>,
    {
        let task_id = scope.task_id().to_string();
        {
            let mut state = self.lock_state();
            state.task_ready(&task_id)?;
            scope
                .slots(&mut state)
                .entry(task_id.clone())
                .or_default()
                .begin_fetch();
        }
        self.publish(scope.event());

        let result = fetch.await;
        {
            let mut state = self.lock_state();
            // Gone if the task was deleted or the board cleared meanwhile.
            if let Some(slot) = scope.slots(&mut state).get_mut(&task_id) {
                slot.finish_fetch(result.as_ref().ok().cloned());
            }
        }
        self.publish(scope.event());

        match result {
            Ok(items) => {
                tracing::debug!(scope = scope.name(), %task_id, count = items.len(), "children loaded");
                Ok(items)
            }
            Err(err) => {
                tracing::warn!(scope = scope.name(), %task_id, error = %err, "failed to load children");
                self.add_notification(NotificationKind::Error, failure);
                Err(err.into())
            }
        }
    }

    pub(super) async fn add_child<S, Fut>(
        &self,
        scope: S,
        draft: S::Item,
        remote: Fut,
        outcome: Outcome,
    ) -> Result<S::Item, BoardError>
    where
        S: ChildScope,
        Fut: Future<Output = Result<S::Item, GatewayError>>,
    {
        let stored = self
            .run_tentative(
                &scope,
                Change::Create(draft.id().to_string()),
                |list| {
                    let mut next = list.items().to_vec();
                    next.push(draft.clone());
                    Ok(next)
                },
                async { remote.await.map(Some) },
                outcome,
            )
            .await?;
        Ok(stored.unwrap_or(draft))
    }

    pub(super) async fn edit_child<S, Fut>(
        &self,
        scope: S,
        child_id: &str,
        edit: impl FnOnce(&mut S::Item),
        remote: Fut,
        outcome: Outcome,
    ) -> Result<(), BoardError>
    where
        S: ChildScope,
        Fut: Future<Output = Result<(), GatewayError>>,
    {
        let kind = scope.entity();
        self.run_tentative(
            &scope,
            Change::Touch(vec![child_id.to_string()]),
            |list| {
                settled_child(list, kind, child_id)?;
                let mut next = list.items().to_vec();
                if let Some(child) = next.iter_mut().find(|child| child.id() == child_id) {
                    edit(child);
                }
                Ok(next)
            },
            async { remote.await.map(|()| None) },
            outcome,
        )
        .await?;
        Ok(())
    }

    pub(super) async fn remove_child<S, Fut>(
        &self,
        scope: S,
        child_id: &str,
        remote: Fut,
        outcome: Outcome,
    ) -> Result<(), BoardError>
    where
        S: ChildScope,
        Fut: Future<Output = Result<(), GatewayError>>,
    {
        let kind = scope.entity();
        self.run_tentative(
            &scope,
            Change::Touch(vec![child_id.to_string()]),
            |list| {
                settled_child(list, kind, child_id)?;
                Ok(list
                    .items()
                    .iter()
                    .filter(|child| child.id() != child_id)
                    .cloned()
                    .collect())
            },
            async { remote.await.map(|()| None) },
            outcome,
        )
        .await?;
        Ok(())
    }
}
