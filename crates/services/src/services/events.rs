use serde::Serialize;
use strum_macros::Display;
use tokio::sync::broadcast;

/// What changed in the board state. Subscribers re-read the affected view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Display)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BoardEvent {
    TasksChanged,
    SubtasksChanged { task_id: String },
    CommentsChanged { task_id: String },
    ProfilesChanged,
    NotificationsChanged,
    LoadingChanged,
    SelectionChanged,
}

/// Broadcast of `BoardEvent`s. Slow subscribers lag and skip events rather
/// than stalling the store.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<BoardEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: BoardEvent) {
        tracing::trace!(%event, "board event");
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.sender.subscribe()
    }
}
