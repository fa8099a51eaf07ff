use db::models::{column::Column, task::Task};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A drag-and-drop gesture: the task at `source_index` within its column is
/// dropped at `dest_index` of the destination column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMove {
    pub task_id: String,
    pub source_column_id: String,
    pub dest_column_id: String,
    pub source_index: usize,
    pub dest_index: usize,
}

impl TaskMove {
    pub fn is_noop(&self) -> bool {
        self.source_column_id == self.dest_column_id && self.source_index == self.dest_index
    }

    pub fn crosses_columns(&self) -> bool {
        self.source_column_id != self.dest_column_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidMove {
    #[error("column {0} is not on the board")]
    UnknownColumn(String),
    #[error("index {index} is out of range for column {column_id} ({len} tasks)")]
    IndexOutOfRange {
        column_id: String,
        index: usize,
        len: usize,
    },
    #[error("task {task_id} is not at index {index} of column {column_id}")]
    TaskNotAtIndex {
        task_id: String,
        column_id: String,
        index: usize,
    },
}

/// Returns the task list after applying `mv`.
///
/// Tasks are partitioned by column (relative order kept), the moved task is
/// taken out of its source partition and inserted into the destination one
/// at `dest_index`, clamped to the partition length. Partitions are then
/// concatenated in column order. Tasks in columns not on the board keep their
/// relative order at the end.
pub fn reorder(tasks: &[Task], columns: &[Column], mv: &TaskMove) -> Result<Vec<Task>, InvalidMove> {
    let column_index = |id: &str| {
        columns
            .iter()
            .position(|column| column.id == id)
            .ok_or_else(|| InvalidMove::UnknownColumn(id.to_string()))
    };
    let source = column_index(&mv.source_column_id)?;
    let dest = column_index(&mv.dest_column_id)?;

    let mut partitions: Vec<Vec<Task>> = vec![Vec::new(); columns.len()];
    let mut stray = Vec::new();
    for task in tasks {
        match columns.iter().position(|column| column.id == task.column_id) {
            Some(index) => partitions[index].push(task.clone()),
            None => stray.push(task.clone()),
        }
    }

    let source_len = partitions[source].len();
    if mv.source_index >= source_len {
        return Err(InvalidMove::IndexOutOfRange {
            column_id: mv.source_column_id.clone(),
            index: mv.source_index,
            len: source_len,
        });
    }
    if partitions[source][mv.source_index].id != mv.task_id {
        return Err(InvalidMove::TaskNotAtIndex {
            task_id: mv.task_id.clone(),
            column_id: mv.source_column_id.clone(),
            index: mv.source_index,
        });
    }

    let mut moved = partitions[source].remove(mv.source_index);
    moved.column_id = mv.dest_column_id.clone();
    let target = &mut partitions[dest];
    let index = mv.dest_index.min(target.len());
    target.insert(index, moved);

    let mut ordered: Vec<Task> = partitions.into_iter().flatten().collect();
    ordered.extend(stray);
    Ok(ordered)
}
