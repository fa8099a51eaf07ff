use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use db::{
    AuthUser,
    models::task::{CreateTask, Priority, Task},
};
use serde_json::json;
use services::services::board::{BoardService, Loadable, TaskMove};

#[derive(Subcommand)]
pub enum Command {
    /// Register a new account
    SignUp,
    /// Show all columns and their tasks
    Board {
        #[arg(long)]
        json: bool,
    },
    /// Add a task
    Add {
        content: String,
        #[arg(long, default_value = "col-1")]
        column: String,
        #[arg(long)]
        priority: Option<Priority>,
    },
    /// Change a task's text
    Edit { task_id: String, content: String },
    /// Change a task's priority
    Prioritize { task_id: String, priority: Priority },
    /// Assign a task, or unassign it when no user is given
    Assign {
        task_id: String,
        user_id: Option<String>,
    },
    /// Set or clear a task's description
    Describe {
        task_id: String,
        description: Option<String>,
    },
    /// Set or clear a task's due date (RFC 3339)
    Due {
        task_id: String,
        due_date: Option<DateTime<Utc>>,
    },
    /// Move a task to a column, at the end unless an index is given
    Move {
        task_id: String,
        column: String,
        #[arg(long)]
        index: Option<usize>,
    },
    /// Delete a task
    Delete { task_id: String },
    /// List a task's subtasks
    Subtasks { task_id: String },
    /// Add a subtask
    AddSubtask { task_id: String, content: String },
    /// Mark a subtask done, or not done with --undo
    Toggle {
        task_id: String,
        subtask_id: String,
        #[arg(long)]
        undo: bool,
    },
    /// Delete a subtask
    DeleteSubtask { task_id: String, subtask_id: String },
    /// List a task's comments
    Comments { task_id: String },
    /// Comment on a task as the signed-in user
    Comment { task_id: String, content: String },
    /// Delete a comment
    DeleteComment { task_id: String, comment_id: String },
    /// Find tasks by text
    Search {
        query: String,
        #[arg(long)]
        column: Option<String>,
    },
    /// List user profiles
    Profiles,
}

pub async fn run(command: Command, board: &BoardService, user: &AuthUser) -> anyhow::Result<()> {
    match command {
        Command::SignUp => println!("Signed in as {}", user.email),
        Command::Board { json } => print_board(board, json)?,
        Command::Add {
            content,
            column,
            priority,
        } => {
            let mut data = CreateTask::new(column, content);
            data.priority = priority;
            let task = board.add_task(data).await?;
            println!("{}", task.id);
        }
        Command::Edit { task_id, content } => board.update_task_content(&task_id, &content).await?,
        Command::Prioritize { task_id, priority } => {
            board.update_task_priority(&task_id, priority).await?
        }
        Command::Assign { task_id, user_id } => board.update_task_assignee(&task_id, user_id).await?,
        Command::Describe {
            task_id,
            description,
        } => board.update_task_description(&task_id, description).await?,
        Command::Due { task_id, due_date } => board.update_task_due_date(&task_id, due_date).await?,
        Command::Move {
            task_id,
            column,
            index,
        } => {
            let task = board
                .task(&task_id)
                .with_context(|| format!("task {task_id} not found"))?;
            let source_index = board
                .tasks_in_column(&task.column_id)
                .iter()
                .position(|t| t.id == task_id)
                .unwrap_or_default();
            let dest_index = index.unwrap_or_else(|| board.tasks_in_column(&column).len());
            board
                .move_task(TaskMove {
                    task_id,
                    source_column_id: task.column_id,
                    dest_column_id: column,
                    source_index,
                    dest_index,
                })
                .await?;
        }
        Command::Delete { task_id } => board.delete_task(&task_id).await?,
        Command::Subtasks { task_id } => {
            for subtask in board.fetch_subtasks(&task_id).await? {
                let mark = if subtask.is_completed { "x" } else { " " };
                println!("[{mark}] {} ({})", subtask.content, subtask.id);
            }
        }
        Command::AddSubtask { task_id, content } => {
            board.fetch_subtasks(&task_id).await?;
            let subtask = board.add_subtask(&task_id, &content).await?;
            println!("{}", subtask.id);
        }
        Command::Toggle {
            task_id,
            subtask_id,
            undo,
        } => {
            board.fetch_subtasks(&task_id).await?;
            board.toggle_subtask(&subtask_id, !undo).await?;
        }
        Command::DeleteSubtask {
            task_id,
            subtask_id,
        } => {
            board.fetch_subtasks(&task_id).await?;
            board.delete_subtask(&subtask_id).await?;
        }
        Command::Comments { task_id } => {
            for comment in board.fetch_comments(&task_id).await? {
                println!(
                    "{} {}: {}",
                    comment.created_at.format("%Y-%m-%d %H:%M"),
                    author(board, &comment.user_id),
                    comment.content
                );
            }
        }
        Command::Comment { task_id, content } => {
            board.fetch_comments(&task_id).await?;
            let comment = board.add_comment(&task_id, &user.id, &content).await?;
            println!("{}", comment.id);
        }
        Command::DeleteComment {
            task_id,
            comment_id,
        } => {
            board.fetch_comments(&task_id).await?;
            board.delete_comment(&comment_id).await?;
        }
        Command::Search { query, column } => {
            for task in board.search_tasks(&query, column.as_deref()) {
                print_task(&task, None);
            }
        }
        Command::Profiles => {
            for profile in board.profiles() {
                let role = if profile.is_admin() { " (admin)" } else { "" };
                println!("{}{role} {}", profile.email, profile.id);
            }
        }
    }
    Ok(())
}

fn author(board: &BoardService, user_id: &str) -> String {
    board
        .profiles()
        .into_iter()
        .find(|profile| profile.id == user_id)
        .map(|profile| profile.email)
        .unwrap_or_else(|| user_id.to_string())
}

fn print_task(task: &Task, index: Option<usize>) {
    let position = index.map(|i| format!("{i}. ")).unwrap_or_default();
    let due = task
        .due_date
        .map(|due| format!(" due {}", due.format("%Y-%m-%d")))
        .unwrap_or_default();
    println!(
        "  {position}[{}] {}{due} ({})",
        task.priority, task.content, task.id
    );
}

fn print_board(board: &BoardService, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        let columns: Vec<_> = board
            .columns()
            .iter()
            .map(|column| {
                json!({
                    "id": column.id,
                    "title": column.title,
                    "tasks": board.tasks_in_column(&column.id),
                })
            })
            .collect();
        let out = json!({ "columns": columns, "stats": board.stats() });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if board.is_loading() {
        bail!("board is still loading");
    }
    for column in board.columns() {
        let tasks = board.tasks_in_column(&column.id);
        println!("{} ({})", column.title, tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            print_task(task, Some(index));
            if let Loadable::Loaded(subtasks) = board.subtasks(&task.id) {
                let done = subtasks.iter().filter(|s| s.is_completed).count();
                println!("     {done}/{} subtasks", subtasks.len());
            }
        }
    }
    let stats = board.stats();
    println!("{} tasks, {} completed", stats.total, stats.completed);
    Ok(())
}

pub fn print_notifications(board: &BoardService) {
    for notification in board.notifications() {
        eprintln!("[{}] {}", notification.kind, notification.message);
    }
}
