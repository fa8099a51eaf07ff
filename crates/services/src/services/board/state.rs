use std::collections::HashMap;

use db::models::{comment::Comment, profile::Profile, subtask::Subtask, task::Task};

use super::{
    BoardError,
    tentative::{Entity, Loadable, TrackedList},
};
use crate::services::events::BoardEvent;

/// Everything the board holds locally.
#[derive(Debug, Default)]
pub struct BoardState {
    pub tasks: TrackedList<Task>,
    pub subtasks: HashMap<String, ChildSlot<Subtask>>,
    pub comments: HashMap<String, ChildSlot<Comment>>,
    pub profiles: Vec<Profile>,
    pub active_task: Option<String>,
    pub is_loading: bool,
}

impl BoardState {
    /// Drops child collections and selection of tasks that no longer exist.
    pub fn forget_missing_tasks(&mut self) {
        let tasks = &self.tasks;
        self.subtasks.retain(|task_id, _| tasks.get(task_id).is_some());
        self.comments.retain(|task_id, _| tasks.get(task_id).is_some());
        if let Some(active) = &self.active_task
            && tasks.get(active).is_none()
        {
            self.active_task = None;
        }
    }

    pub(super) fn task_ready(&self, task_id: &str) -> Result<(), BoardError> {
        if self.tasks.get(task_id).is_none() {
            return Err(BoardError::not_found("task", task_id));
        }
        if self.tasks.is_pending(task_id) {
            return Err(BoardError::PendingCreate {
                id: task_id.to_string(),
            });
        }
        Ok(())
    }
}

/// One task's child collection. The list stays in place while a fetch is in
/// flight, so transitions that settle meanwhile still land on it.
#[derive(Debug)]
pub struct ChildSlot<T> {
    list: Option<TrackedList<T>>,
    fetching: usize,
}

impl<T> Default for ChildSlot<T> {
    fn default() -> Self {
        Self {
            list: None,
            fetching: 0,
        }
    }
}

impl<T: Entity> ChildSlot<T> {
    pub fn items(&self) -> Loadable<Vec<T>> {
        let state = match &self.list {
            _ if self.fetching > 0 => Loadable::Loading,
            Some(list) => Loadable::Loaded(list),
            None => Loadable::NotLoaded,
        };
        state.map(|list| list.items().to_vec())
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.list.as_ref()?.get(id)
    }

    /// The list, unless it is missing or being fetched.
    fn ready(&mut self) -> Option<&mut TrackedList<T>> {
        match self.fetching {
            0 => self.list.as_mut(),
            _ => None,
        }
    }

    pub(super) fn begin_fetch(&mut self) {
        self.fetching += 1;
    }

    /// Ends one fetch. `items` is `None` when it failed, which keeps the
    /// list as it is.
    pub(super) fn finish_fetch(&mut self, items: Option<Vec<T>>) {
        self.fetching = self.fetching.saturating_sub(1);
        if let Some(items) = items {
            match &mut self.list {
                Some(list) => list.reload(items),
                None => self.list = Some(TrackedList::new(items)),
            }
        }
    }
}

/// Selects the tracked collection a transition works on.
pub trait Scope: Send + Sync {
    type Item: Entity;

    /// The collection new changes are committed to.
    fn list<'a>(
        &self,
        state: &'a mut BoardState,
    ) -> Result<&'a mut TrackedList<Self::Item>, BoardError>;

    /// The collection an in-flight transition confirms or rolls back on.
    /// Unlike `list` this is reachable while a fetch is running.
    fn settling<'a>(&self, state: &'a mut BoardState) -> Option<&'a mut TrackedList<Self::Item>>;

    fn event(&self) -> BoardEvent;

    fn name(&self) -> &'static str;
}

pub struct TasksScope;

impl Scope for TasksScope {
    type Item = Task;

    fn list<'a>(&self, state: &'a mut BoardState) -> Result<&'a mut TrackedList<Task>, BoardError> {
        Ok(&mut state.tasks)
    }

    fn settling<'a>(&self, state: &'a mut BoardState) -> Option<&'a mut TrackedList<Task>> {
        Some(&mut state.tasks)
    }

    fn event(&self) -> BoardEvent {
        BoardEvent::TasksChanged
    }

    fn name(&self) -> &'static str {
        "tasks"
    }
}

/// A task-owned collection that is loaded on demand.
pub trait ChildScope: Scope {
    fn task_id(&self) -> &str;

    /// Singular name of the child entity.
    fn entity(&self) -> &'static str;

    fn slots<'a>(
        &self,
        state: &'a mut BoardState,
    ) -> &'a mut HashMap<String, ChildSlot<Self::Item>>;
}

fn loaded_child<'a, S: ChildScope>(
    scope: &S,
    state: &'a mut BoardState,
) -> Result<&'a mut TrackedList<S::Item>, BoardError> {
    state.task_ready(scope.task_id())?;
    scope
        .slots(state)
        .get_mut(scope.task_id())
        .and_then(ChildSlot::ready)
        .ok_or_else(|| BoardError::ChildrenNotLoaded {
            kind: scope.name(),
            task_id: scope.task_id().to_string(),
        })
}

fn settling_child<'a, S: ChildScope>(
    scope: &S,
    state: &'a mut BoardState,
) -> Option<&'a mut TrackedList<S::Item>> {
    scope
        .slots(state)
        .get_mut(scope.task_id())
        .and_then(|slot| slot.list.as_mut())
}

pub struct SubtasksScope(pub String);

impl Scope for SubtasksScope {
    type Item = Subtask;

    fn list<'a>(
        &self,
        state: &'a mut BoardState,
    ) -> Result<&'a mut TrackedList<Subtask>, BoardError> {
        loaded_child(self, state)
    }

    fn settling<'a>(&self, state: &'a mut BoardState) -> Option<&'a mut TrackedList<Subtask>> {
        settling_child(self, state)
    }

    fn event(&self) -> BoardEvent {
        BoardEvent::SubtasksChanged {
            task_id: self.0.clone(),
        }
    }

    fn name(&self) -> &'static str {
        "subtasks"
    }
}

impl ChildScope for SubtasksScope {
    fn task_id(&self) -> &str {
        &self.0
    }

    fn entity(&self) -> &'static str {
        "subtask"
    }

    fn slots<'a>(
        &self,
        state: &'a mut BoardState,
    ) -> &'a mut HashMap<String, ChildSlot<Subtask>> {
        &mut state.subtasks
    }
}

pub struct CommentsScope(pub String);

impl Scope for CommentsScope {
    type Item = Comment;

    fn list<'a>(
        &self,
        state: &'a mut BoardState,
    ) -> Result<&'a mut TrackedList<Comment>, BoardError> {
        loaded_child(self, state)
    }

    fn settling<'a>(&self, state: &'a mut BoardState) -> Option<&'a mut TrackedList<Comment>> {
        settling_child(self, state)
    }

    fn event(&self) -> BoardEvent {
        BoardEvent::CommentsChanged {
            task_id: self.0.clone(),
        }
    }

    fn name(&self) -> &'static str {
        "comments"
    }
}

impl ChildScope for CommentsScope {
    fn task_id(&self) -> &str {
        &self.0
    }

    fn entity(&self) -> &'static str {
        "comment"
    }

    fn slots<'a>(
        &self,
        state: &'a mut BoardState,
    ) -> &'a mut HashMap<String, ChildSlot<Comment>> {
        &mut state.comments
    }
}
