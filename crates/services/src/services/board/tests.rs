use std::sync::Arc;

use chrono::{TimeZone, Utc};
use db::{
    gateway::{GatewayOp, Table},
    memory::MemoryGateway,
    models::{comment::Comment, subtask::Subtask},
};

use super::*;

fn task(id: &str, column_id: &str, content: &str, minute: u32) -> Task {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap();
    Task {
        id: id.to_string(),
        column_id: column_id.to_string(),
        content: content.to_string(),
        priority: Priority::Medium,
        assignee_id: None,
        description: None,
        due_date: None,
        created_at: at,
        updated_at: at,
    }
}

fn subtask(id: &str, task_id: &str, content: &str, minute: u32) -> Subtask {
    Subtask {
        id: id.to_string(),
        task_id: task_id.to_string(),
        content: content.to_string(),
        is_completed: false,
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap(),
    }
}

fn comment(id: &str, task_id: &str, content: &str, minute: u32) -> Comment {
    Comment {
        id: id.to_string(),
        task_id: task_id.to_string(),
        user_id: "user-1".to_string(),
        content: content.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 11, minute, 0).unwrap(),
    }
}

fn seeded_gateway() -> Arc<MemoryGateway> {
    let gateway = Arc::new(MemoryGateway::new());
    gateway
        .seed(
            Table::Tasks,
            &[
                task("t-1", "col-1", "Draft agenda", 0),
                task("t-2", "col-1", "Book room", 1),
                task("t-3", "col-2", "Review budget", 2),
                task("t-4", "col-3", "Send invites", 3),
            ],
        )
        .unwrap();
    gateway
        .seed(
            Table::Subtasks,
            &[
                subtask("s-1", "t-1", "List topics", 0),
                subtask("s-2", "t-1", "Ask for input", 1),
            ],
        )
        .unwrap();
    gateway
        .seed(
            Table::Comments,
            &[
                comment("c-1", "t-1", "First pass done", 0),
                comment("c-2", "t-1", "Looks good", 1),
                comment("c-3", "t-1", "Ship it", 2),
            ],
        )
        .unwrap();
    gateway
}

async fn loaded_board() -> (BoardService, Arc<MemoryGateway>) {
    let gateway = seeded_gateway();
    let board = BoardService::new(gateway.clone(), BoardConfig::default());
    board.fetch_tasks().await.unwrap();
    (board, gateway)
}

fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|task| task.id.as_str()).collect()
}

fn errors(board: &BoardService) -> Vec<String> {
    board
        .notifications()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Error)
        .map(|n| n.message)
        .collect()
}

fn last_message(board: &BoardService) -> Option<(NotificationKind, String)> {
    board
        .notifications()
        .pop()
        .map(|notification| (notification.kind, notification.message))
}

#[tokio::test]
async fn fetch_tasks_loads_rows_oldest_first() {
    let (board, _) = loaded_board().await;

    assert_eq!(ids(&board.tasks()), ["t-1", "t-2", "t-3", "t-4"]);
    assert!(!board.is_loading());
    assert_eq!(ids(&board.tasks_in_column("col-1")), ["t-1", "t-2"]);
}

#[tokio::test]
async fn failed_fetch_resets_loading_and_notifies() {
    let gateway = seeded_gateway();
    gateway.fail_next(Table::Tasks, GatewayOp::Select);
    let board = BoardService::new(gateway, BoardConfig::default());

    let result = board.fetch_tasks().await;

    assert!(matches!(result, Err(BoardError::Remote(_))));
    assert!(!board.is_loading());
    assert!(board.tasks().is_empty());
    assert_eq!(errors(&board), ["Failed to load tasks"]);
}

#[tokio::test]
async fn offline_board_keeps_what_it_has() {
    let (board, gateway) = loaded_board().await;
    board.fetch_subtasks("t-1").await.unwrap();
    let tasks = board.tasks();
    let subtasks = board.subtasks("t-1");
    gateway.set_offline(true);

    assert!(board.fetch_tasks().await.is_err());
    assert!(board.fetch_subtasks("t-1").await.is_err());
    assert!(board.toggle_subtask("s-1", true).await.is_err());

    assert_eq!(board.tasks(), tasks);
    assert_eq!(board.subtasks("t-1"), subtasks);
    assert_eq!(
        errors(&board),
        [
            "Failed to load tasks",
            "Failed to load subtasks",
            "Failed to update subtask"
        ]
    );

    gateway.set_offline(false);
    board.toggle_subtask("s-1", true).await.unwrap();
}

#[tokio::test]
async fn add_task_keeps_its_id_and_stored_row() {
    let (board, gateway) = loaded_board().await;

    let created = board
        .add_task(CreateTask::new("col-1", "  Write report ").with_priority(Priority::High))
        .await
        .unwrap();

    assert_eq!(created.content, "Write report");
    assert_eq!(created.priority, Priority::High);
    assert_eq!(board.task(&created.id), Some(created.clone()));
    assert_eq!(
        gateway.row(Table::Tasks, &created.id).unwrap()["content"],
        "Write report"
    );
    assert_eq!(
        last_message(&board),
        Some((NotificationKind::Success, "Task created".to_string()))
    );

    // Confirmed creates are ordinary tasks afterwards.
    board
        .update_task_content(&created.id, "Write final report")
        .await
        .unwrap();
    assert_eq!(board.task(&created.id).unwrap().content, "Write final report");
}

#[tokio::test]
async fn failed_add_task_restores_previous_tasks() {
    let (board, gateway) = loaded_board().await;
    gateway.fail_next(Table::Tasks, GatewayOp::Insert);
    let before = board.tasks();

    let result = board
        .add_task(CreateTask::new("col-1", "Write report").with_priority(Priority::High))
        .await;

    assert!(matches!(result, Err(BoardError::Remote(_))));
    assert_eq!(board.tasks(), before);
    assert_eq!(errors(&board), ["Failed to create task"]);
    assert_eq!(board.notifications().len(), 1);
}

#[tokio::test]
async fn blank_content_is_rejected_before_any_remote_call() {
    let (board, gateway) = loaded_board().await;

    let result = board.add_task(CreateTask::new("col-1", "   ")).await;
    assert!(matches!(result, Err(BoardError::Validation(_))));

    let result = board.update_task_content("t-1", "").await;
    assert!(matches!(result, Err(BoardError::Validation(_))));

    assert_eq!(gateway.call_count(Table::Tasks, GatewayOp::Insert), 0);
    assert_eq!(gateway.call_count(Table::Tasks, GatewayOp::Update), 0);
    assert!(board.notifications().is_empty());
}

#[tokio::test]
async fn add_task_rejects_columns_not_on_the_board() {
    let (board, gateway) = loaded_board().await;

    let result = board.add_task(CreateTask::new("col-9", "Misplaced")).await;

    assert!(matches!(result, Err(BoardError::Validation(_))));
    assert_eq!(gateway.call_count(Table::Tasks, GatewayOp::Insert), 0);
}

#[tokio::test]
async fn updates_apply_locally_and_remotely() {
    let (board, gateway) = loaded_board().await;
    let due = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();

    board
        .update_task_priority("t-2", Priority::Low)
        .await
        .unwrap();
    board
        .update_task_assignee("t-2", Some("user-7".to_string()))
        .await
        .unwrap();
    board
        .update_task_description("t-2", Some("   ".to_string()))
        .await
        .unwrap();
    board.update_task_due_date("t-2", Some(due)).await.unwrap();

    let local = board.task("t-2").unwrap();
    assert_eq!(local.priority, Priority::Low);
    assert_eq!(local.assignee_id.as_deref(), Some("user-7"));
    assert_eq!(local.description, None);
    assert_eq!(local.due_date, Some(due));

    let row = gateway.row(Table::Tasks, "t-2").unwrap();
    assert_eq!(row["priority"], "low");
    assert_eq!(row["assignee_id"], "user-7");
    assert!(row["description"].is_null());
    assert_eq!(
        last_message(&board),
        Some((NotificationKind::Success, "Due date updated".to_string()))
    );
}

#[tokio::test]
async fn failed_update_rolls_back_to_the_snapshot() {
    let (board, gateway) = loaded_board().await;
    gateway.fail_next(Table::Tasks, GatewayOp::Update);
    let before = board.tasks();

    let result = board.update_task_priority("t-1", Priority::High).await;

    assert!(matches!(result, Err(BoardError::Remote(_))));
    assert_eq!(board.tasks(), before);
    assert_eq!(errors(&board), ["Failed to update priority"]);
}

#[tokio::test]
async fn failed_delete_keeps_the_task_its_children_and_selection() {
    let (board, gateway) = loaded_board().await;
    board.fetch_subtasks("t-1").await.unwrap();
    board.fetch_comments("t-1").await.unwrap();
    board.set_active_task(Some("t-1")).unwrap();
    let before = board.tasks();
    let subtasks = board.subtasks("t-1");
    let comments = board.comments("t-1");
    gateway.fail_next(Table::Tasks, GatewayOp::Delete);

    let result = board.delete_task("t-1").await;

    assert!(matches!(result, Err(BoardError::Remote(_))));
    assert_eq!(board.tasks(), before);
    assert!(subtasks.is_loaded());
    assert_eq!(board.subtasks("t-1"), subtasks);
    assert_eq!(board.comments("t-1"), comments);
    assert_eq!(board.active_task().map(|t| t.id), Some("t-1".to_string()));
    assert_eq!(errors(&board), ["Failed to delete task"]);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let (board, gateway) = loaded_board().await;

    let result = board.update_task_priority("missing", Priority::High).await;
    assert!(matches!(
        result,
        Err(BoardError::NotFound { entity: "task", .. })
    ));
    let result = board.delete_task("missing").await;
    assert!(matches!(result, Err(BoardError::NotFound { .. })));
    assert!(gateway.calls().iter().all(|call| call.op == GatewayOp::Select));
}

#[tokio::test]
async fn slow_failure_keeps_newer_changes_to_other_tasks() {
    let (board, gateway) = loaded_board().await;
    let mut held = gateway.hold_next(Table::Tasks, GatewayOp::Update);

    let pending = tokio::spawn({
        let board = board.clone();
        async move { board.update_task_content("t-1", "Renamed agenda").await }
    });
    held.started().await;
    assert_eq!(board.task("t-1").unwrap().content, "Renamed agenda");

    board
        .update_task_priority("t-3", Priority::High)
        .await
        .unwrap();
    held.fail();

    assert!(matches!(pending.await.unwrap(), Err(BoardError::Remote(_))));
    assert_eq!(board.task("t-1").unwrap().content, "Draft agenda");
    assert_eq!(board.task("t-3").unwrap().priority, Priority::High);
    assert_eq!(errors(&board), ["Failed to update task"]);
}

#[tokio::test]
async fn pending_create_cannot_be_touched_until_confirmed() {
    let (board, gateway) = loaded_board().await;
    let mut held = gateway.hold_next(Table::Tasks, GatewayOp::Insert);

    let pending = tokio::spawn({
        let board = board.clone();
        async move { board.add_task(CreateTask::new("col-2", "Order food")).await }
    });
    held.started().await;
    let draft = board.tasks().pop().unwrap();
    assert_eq!(draft.content, "Order food");

    let result = board.update_task_content(&draft.id, "Order lunch").await;
    assert!(matches!(result, Err(BoardError::PendingCreate { .. })));
    let result = board.fetch_subtasks(&draft.id).await;
    assert!(matches!(result, Err(BoardError::PendingCreate { .. })));
    let result = board
        .move_task(TaskMove {
            task_id: draft.id.clone(),
            source_column_id: "col-2".to_string(),
            dest_column_id: "col-2".to_string(),
            source_index: 1,
            dest_index: 0,
        })
        .await;
    assert!(matches!(result, Err(BoardError::PendingCreate { .. })));

    held.succeed();
    let created = pending.await.unwrap().unwrap();
    assert_eq!(created.id, draft.id);
    board
        .update_task_content(&created.id, "Order lunch")
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_create_after_other_changes_removes_only_the_draft() {
    let (board, gateway) = loaded_board().await;
    let mut held = gateway.hold_next(Table::Tasks, GatewayOp::Insert);

    let pending = tokio::spawn({
        let board = board.clone();
        async move { board.add_task(CreateTask::new("col-1", "Order food")).await }
    });
    held.started().await;
    board.delete_task("t-2").await.unwrap();
    held.fail();

    assert!(pending.await.unwrap().is_err());
    assert_eq!(ids(&board.tasks()), ["t-1", "t-3", "t-4"]);
}

#[tokio::test]
async fn dropping_a_task_where_it_is_does_nothing() {
    let (board, gateway) = loaded_board().await;
    let calls = gateway.calls().len();
    let before = board.tasks();

    board
        .move_task(TaskMove {
            task_id: "t-1".to_string(),
            source_column_id: "col-1".to_string(),
            dest_column_id: "col-1".to_string(),
            source_index: 0,
            dest_index: 0,
        })
        .await
        .unwrap();

    assert_eq!(board.tasks(), before);
    assert_eq!(gateway.calls().len(), calls);
    assert!(board.notifications().is_empty());
}

#[tokio::test]
async fn reorder_within_a_column_stays_local() {
    let (board, gateway) = loaded_board().await;

    board
        .move_task(TaskMove {
            task_id: "t-2".to_string(),
            source_column_id: "col-1".to_string(),
            dest_column_id: "col-1".to_string(),
            source_index: 1,
            dest_index: 0,
        })
        .await
        .unwrap();

    assert_eq!(ids(&board.tasks_in_column("col-1")), ["t-2", "t-1"]);
    assert_eq!(gateway.call_count(Table::Tasks, GatewayOp::Update), 0);
    assert!(board.notifications().is_empty());
}

#[tokio::test]
async fn moving_into_the_done_column_celebrates() {
    let (board, gateway) = loaded_board().await;

    board
        .move_task(TaskMove {
            task_id: "t-3".to_string(),
            source_column_id: "col-2".to_string(),
            dest_column_id: "col-3".to_string(),
            source_index: 0,
            dest_index: 0,
        })
        .await
        .unwrap();

    assert_eq!(ids(&board.tasks_in_column("col-3")), ["t-3", "t-4"]);
    assert!(board.tasks_in_column("col-2").is_empty());
    assert_eq!(gateway.row(Table::Tasks, "t-3").unwrap()["column_id"], "col-3");
    assert_eq!(
        last_message(&board),
        Some((
            NotificationKind::Success,
            "Task completed! Great work!".to_string()
        ))
    );

    board
        .move_task(TaskMove {
            task_id: "t-3".to_string(),
            source_column_id: "col-3".to_string(),
            dest_column_id: "col-1".to_string(),
            source_index: 0,
            dest_index: 2,
        })
        .await
        .unwrap();
    assert_eq!(ids(&board.tasks_in_column("col-1")), ["t-1", "t-2", "t-3"]);
    assert_eq!(
        last_message(&board),
        Some((NotificationKind::Success, "Task moved".to_string()))
    );
}

#[tokio::test]
async fn failed_move_puts_the_task_back() {
    let (board, gateway) = loaded_board().await;
    gateway.fail_next(Table::Tasks, GatewayOp::Update);
    let before = board.tasks();

    let result = board
        .move_task(TaskMove {
            task_id: "t-1".to_string(),
            source_column_id: "col-1".to_string(),
            dest_column_id: "col-2".to_string(),
            source_index: 0,
            dest_index: 1,
        })
        .await;

    assert!(matches!(result, Err(BoardError::Remote(_))));
    assert_eq!(board.tasks(), before);
    assert_eq!(errors(&board), ["Failed to move task"]);
}

#[tokio::test]
async fn moves_that_do_not_match_the_board_are_rejected() {
    let (board, gateway) = loaded_board().await;

    let result = board
        .move_task(TaskMove {
            task_id: "t-1".to_string(),
            source_column_id: "col-1".to_string(),
            dest_column_id: "col-2".to_string(),
            source_index: 1,
            dest_index: 0,
        })
        .await;

    assert!(matches!(
        result,
        Err(BoardError::InvalidMove(InvalidMove::TaskNotAtIndex { .. }))
    ));
    assert_eq!(gateway.call_count(Table::Tasks, GatewayOp::Update), 0);
}

#[tokio::test]
async fn deleting_a_task_drops_its_children_and_selection() {
    let (board, gateway) = loaded_board().await;
    board.fetch_subtasks("t-1").await.unwrap();
    board.set_active_task(Some("t-1")).unwrap();

    board.delete_task("t-1").await.unwrap();

    assert!(board.task("t-1").is_none());
    assert!(gateway.row(Table::Tasks, "t-1").is_none());
    assert_eq!(board.subtasks("t-1"), Loadable::NotLoaded);
    assert_eq!(board.active_task(), None);
    assert_eq!(
        last_message(&board),
        Some((NotificationKind::Info, "Task deleted".to_string()))
    );
}

#[tokio::test]
async fn fetch_subtasks_passes_through_loading() {
    let (board, gateway) = loaded_board().await;
    assert_eq!(board.subtasks("t-1"), Loadable::NotLoaded);
    let mut held = gateway.hold_next(Table::Subtasks, GatewayOp::Select);

    let pending = tokio::spawn({
        let board = board.clone();
        async move { board.fetch_subtasks("t-1").await }
    });
    held.started().await;
    assert_eq!(board.subtasks("t-1"), Loadable::Loading);
    held.succeed();

    let fetched = pending.await.unwrap().unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(board.subtasks("t-1"), Loadable::Loaded(fetched));
}

#[tokio::test]
async fn failed_child_fetch_restores_previous_state() {
    let (board, gateway) = loaded_board().await;
    gateway.fail_next(Table::Comments, GatewayOp::Select);

    let result = board.fetch_comments("t-1").await;

    assert!(matches!(result, Err(BoardError::Remote(_))));
    assert_eq!(board.comments("t-1"), Loadable::NotLoaded);
    assert_eq!(errors(&board), ["Failed to load comments"]);

    board.fetch_comments("t-1").await.unwrap();
    gateway.fail_next(Table::Comments, GatewayOp::Select);
    assert!(board.fetch_comments("t-1").await.is_err());
    assert!(board.comments("t-1").is_loaded());
}

#[tokio::test]
async fn children_must_be_loaded_before_adding() {
    let (board, gateway) = loaded_board().await;

    let result = board.add_subtask("t-1", "Print handouts").await;

    assert!(matches!(
        result,
        Err(BoardError::ChildrenNotLoaded { kind: "subtasks", .. })
    ));
    assert_eq!(gateway.call_count(Table::Subtasks, GatewayOp::Insert), 0);
}

#[tokio::test]
async fn added_subtask_takes_the_stored_id() {
    let (board, gateway) = loaded_board().await;
    board.fetch_subtasks("t-1").await.unwrap();

    let created = board.add_subtask("t-1", "Print handouts").await.unwrap();

    assert!(!created.id.starts_with("temp-"));
    assert!(gateway.row(Table::Subtasks, &created.id).is_some());
    let Loadable::Loaded(subtasks) = board.subtasks("t-1") else {
        panic!("subtasks should stay loaded");
    };
    assert_eq!(subtasks.len(), 3);
    assert_eq!(subtasks[2], created);
    assert!(subtasks.iter().all(|s| !s.id.starts_with("temp-")));
}

#[tokio::test]
async fn toggle_shows_before_the_remote_call_returns() {
    let (board, gateway) = loaded_board().await;
    board.fetch_subtasks("t-1").await.unwrap();
    let mut held = gateway.hold_next(Table::Subtasks, GatewayOp::Update);

    let pending = tokio::spawn({
        let board = board.clone();
        async move { board.toggle_subtask("s-1", true).await }
    });
    held.started().await;
    let completed = |board: &BoardService| {
        board
            .subtasks("t-1")
            .loaded()
            .and_then(|subtasks| subtasks.iter().find(|s| s.id == "s-1").cloned())
            .map(|s| s.is_completed)
    };
    assert_eq!(completed(&board), Some(true));

    held.fail();
    assert!(pending.await.unwrap().is_err());
    assert_eq!(completed(&board), Some(false));
    assert_eq!(errors(&board), ["Failed to update subtask"]);
}

#[tokio::test]
async fn subtasks_of_unloaded_tasks_are_not_found() {
    let (board, _) = loaded_board().await;

    let result = board.toggle_subtask("s-1", true).await;

    assert!(matches!(
        result,
        Err(BoardError::NotFound { entity: "subtask", .. })
    ));
}

#[tokio::test]
async fn pending_child_cannot_be_toggled() {
    let (board, gateway) = loaded_board().await;
    board.fetch_subtasks("t-1").await.unwrap();
    let mut held = gateway.hold_next(Table::Subtasks, GatewayOp::Insert);

    let pending = tokio::spawn({
        let board = board.clone();
        async move { board.add_subtask("t-1", "Print handouts").await }
    });
    held.started().await;
    let draft = board.subtasks("t-1").loaded().unwrap().last().cloned().unwrap();
    assert!(draft.id.starts_with("temp-"));

    let result = board.toggle_subtask(&draft.id, true).await;
    assert!(matches!(result, Err(BoardError::PendingCreate { .. })));

    held.succeed();
    let created = pending.await.unwrap().unwrap();
    board.toggle_subtask(&created.id, true).await.unwrap();
    board.delete_subtask(&created.id).await.unwrap();
    assert_eq!(board.subtasks("t-1").loaded().map(Vec::len), Some(2));
}

#[tokio::test]
async fn failed_comment_delete_restores_its_position() {
    let (board, gateway) = loaded_board().await;
    board.fetch_comments("t-1").await.unwrap();
    let before = board.comments("t-1");
    gateway.fail_next(Table::Comments, GatewayOp::Delete);

    let result = board.delete_comment("c-2").await;

    assert!(matches!(result, Err(BoardError::Remote(_))));
    assert_eq!(board.comments("t-1"), before);
    assert_eq!(errors(&board), ["Failed to delete comment"]);
}

#[tokio::test]
async fn failed_subtask_add_removes_the_draft() {
    let (board, gateway) = loaded_board().await;
    board.fetch_subtasks("t-1").await.unwrap();
    let before = board.subtasks("t-1");
    gateway.fail_next(Table::Subtasks, GatewayOp::Insert);

    let result = board.add_subtask("t-1", "Print handouts").await;

    assert!(matches!(result, Err(BoardError::Remote(_))));
    assert_eq!(board.subtasks("t-1"), before);
    assert_eq!(errors(&board), ["Failed to add subtask"]);
}

#[tokio::test]
async fn failed_subtask_delete_restores_it() {
    let (board, gateway) = loaded_board().await;
    board.fetch_subtasks("t-1").await.unwrap();
    let before = board.subtasks("t-1");
    gateway.fail_next(Table::Subtasks, GatewayOp::Delete);

    let result = board.delete_subtask("s-1").await;

    assert!(matches!(result, Err(BoardError::Remote(_))));
    assert_eq!(board.subtasks("t-1"), before);
    assert!(gateway.row(Table::Subtasks, "s-1").is_some());
    assert_eq!(errors(&board), ["Failed to delete subtask"]);
}

#[tokio::test]
async fn failed_comment_add_removes_the_draft() {
    let (board, gateway) = loaded_board().await;
    board.fetch_comments("t-1").await.unwrap();
    let before = board.comments("t-1");
    gateway.fail_next(Table::Comments, GatewayOp::Insert);

    let result = board.add_comment("t-1", "user-1", "Agenda sent out").await;

    assert!(matches!(result, Err(BoardError::Remote(_))));
    assert_eq!(board.comments("t-1"), before);
    assert_eq!(gateway.rows(Table::Comments).len(), 3);
    assert_eq!(errors(&board), ["Failed to add comment"]);
}

#[tokio::test]
async fn failed_toggle_during_failed_refetch_is_rolled_back() {
    let (board, gateway) = loaded_board().await;
    board.fetch_subtasks("t-1").await.unwrap();
    let before = board.subtasks("t-1");
    let mut update = gateway.hold_next(Table::Subtasks, GatewayOp::Update);
    let mut select = gateway.hold_next(Table::Subtasks, GatewayOp::Select);

    let toggle = tokio::spawn({
        let board = board.clone();
        async move { board.toggle_subtask("s-1", true).await }
    });
    update.started().await;
    let refetch = tokio::spawn({
        let board = board.clone();
        async move { board.fetch_subtasks("t-1").await }
    });
    select.started().await;
    assert_eq!(board.subtasks("t-1"), Loadable::Loading);

    update.fail();
    assert!(toggle.await.unwrap().is_err());
    select.fail();
    assert!(refetch.await.unwrap().is_err());

    assert_eq!(board.subtasks("t-1"), before);
    let stored = gateway.row(Table::Subtasks, "s-1").unwrap();
    assert_eq!(stored["is_completed"], false);
    assert_eq!(
        errors(&board),
        ["Failed to update subtask", "Failed to load subtasks"]
    );
}

#[tokio::test]
async fn child_changes_wait_for_a_running_fetch() {
    let (board, gateway) = loaded_board().await;
    board.fetch_subtasks("t-1").await.unwrap();
    let mut select = gateway.hold_next(Table::Subtasks, GatewayOp::Select);

    let refetch = tokio::spawn({
        let board = board.clone();
        async move { board.fetch_subtasks("t-1").await }
    });
    select.started().await;
    let result = board.toggle_subtask("s-1", true).await;
    assert!(matches!(
        result,
        Err(BoardError::ChildrenNotLoaded { kind: "subtasks", .. })
    ));

    select.fail();
    assert!(refetch.await.unwrap().is_err());
    board.toggle_subtask("s-1", true).await.unwrap();
    let subtasks = board.subtasks("t-1").loaded().cloned().unwrap();
    assert!(subtasks.iter().any(|s| s.id == "s-1" && s.is_completed));
}

#[tokio::test]
async fn refetch_during_add_keeps_the_created_subtask() {
    let (board, gateway) = loaded_board().await;
    board.fetch_subtasks("t-1").await.unwrap();
    let mut held = gateway.hold_next(Table::Subtasks, GatewayOp::Insert);

    let pending = tokio::spawn({
        let board = board.clone();
        async move { board.add_subtask("t-1", "Print handouts").await }
    });
    held.started().await;
    let fetched = board.fetch_subtasks("t-1").await.unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(board.subtasks("t-1").loaded().map(Vec::len), Some(3));

    held.succeed();
    let created = pending.await.unwrap().unwrap();

    let subtasks = board.subtasks("t-1").loaded().cloned().unwrap();
    let ids: Vec<_> = subtasks.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["s-1", "s-2", created.id.as_str()]);
}

#[tokio::test]
async fn comments_are_added_and_deleted() {
    let (board, gateway) = loaded_board().await;
    board.fetch_comments("t-1").await.unwrap();

    let created = board
        .add_comment("t-1", "user-2", "Agenda sent out")
        .await
        .unwrap();
    assert_eq!(created.user_id, "user-2");
    assert!(gateway.row(Table::Comments, &created.id).is_some());

    board.delete_comment("c-1").await.unwrap();
    let Loadable::Loaded(comments) = board.comments("t-1") else {
        panic!("comments should stay loaded");
    };
    let ids: Vec<_> = comments.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["c-2", "c-3", created.id.as_str()]);
    assert_eq!(
        last_message(&board),
        Some((NotificationKind::Info, "Comment deleted".to_string()))
    );
}

#[tokio::test]
async fn stats_and_search_follow_the_board() {
    let (board, _) = loaded_board().await;

    let stats = board.stats();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.completed, 1);
    let counts: Vec<_> = stats.per_column.iter().map(|c| c.count).collect();
    assert_eq!(counts, [2, 1, 1]);

    assert_eq!(ids(&board.search_tasks("BOOK", None)), ["t-2"]);
    assert_eq!(ids(&board.search_tasks("e", Some("col-2"))), ["t-3"]);
    assert_eq!(board.search_tasks("", None).len(), 4);
}

#[tokio::test]
async fn active_task_must_exist() {
    let (board, _) = loaded_board().await;

    assert!(matches!(
        board.set_active_task(Some("missing")),
        Err(BoardError::NotFound { .. })
    ));
    board.set_active_task(Some("t-3")).unwrap();
    assert_eq!(board.active_task().map(|t| t.id), Some("t-3".to_string()));
    board.set_active_task(None).unwrap();
    assert_eq!(board.active_task(), None);
}

#[tokio::test]
async fn clear_drops_board_data_but_keeps_notifications() {
    let (board, _) = loaded_board().await;
    board.fetch_comments("t-1").await.unwrap();
    board.set_active_task(Some("t-1")).unwrap();
    board.add_notification(NotificationKind::Info, "Signed in");

    board.clear();

    assert!(board.tasks().is_empty());
    assert_eq!(board.comments("t-1"), Loadable::NotLoaded);
    assert!(board.profiles().is_empty());
    assert_eq!(board.active_task(), None);
    assert_eq!(board.notifications().len(), 1);
}

#[tokio::test]
async fn changes_are_published_to_subscribers() {
    let (board, _) = loaded_board().await;
    let mut events = board.subscribe();

    board.update_task_priority("t-1", Priority::High).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        [BoardEvent::TasksChanged, BoardEvent::NotificationsChanged]
    );
}

#[tokio::test]
async fn reaper_drops_expired_notifications() {
    let gateway = Arc::new(MemoryGateway::new());
    let config = BoardConfig {
        notification_ttl_ms: 20,
        ..BoardConfig::default()
    };
    let board = BoardService::new(gateway, config);
    let mut events = board.subscribe();

    let saved = board.add_notification(NotificationKind::Success, "Saved");
    assert_eq!(events.recv().await.unwrap(), BoardEvent::NotificationsChanged);
    let reaper = board.spawn_notification_reaper(Duration::from_millis(5));

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, BoardEvent::NotificationsChanged);
    assert!(board.notifications().is_empty());
    assert!(!board.dismiss_notification(saved.id));
    reaper.abort();
}

#[tokio::test]
async fn dismissed_notifications_are_gone() {
    let board = BoardService::new(Arc::new(MemoryGateway::new()), BoardConfig::default());
    let first = board.add_notification(NotificationKind::Info, "One");
    board.add_notification(NotificationKind::Error, "Two");

    assert!(board.dismiss_notification(first.id));
    assert!(!board.dismiss_notification(first.id));
    let messages: Vec<_> = board.notifications().into_iter().map(|n| n.message).collect();
    assert_eq!(messages, ["Two"]);
}

#[tokio::test]
async fn profiles_load_from_the_gateway() {
    let gateway = seeded_gateway();
    gateway
        .seed(
            Table::Profiles,
            &[serde_json::json!({
                "id": "user-1",
                "email": "ada@example.com",
                "role": "admin",
                "created_at": "2024-03-01T08:00:00Z"
            })],
        )
        .unwrap();
    let board = BoardService::new(gateway.clone(), BoardConfig::default());

    board.fetch_profiles().await.unwrap();
    assert_eq!(board.profiles().len(), 1);
    assert!(board.profiles()[0].is_admin());

    gateway.fail_next(Table::Profiles, GatewayOp::Select);
    assert!(board.fetch_profiles().await.is_err());
    assert_eq!(errors(&board), ["Failed to load profiles"]);
}
