//! Board view helpers: filtering, sorting, and column grouping.
//!
//! Pure functions over the loaded task collection, applied per paint. The
//! collection itself is never reordered or mutated.

use indexmap::IndexMap;

use crate::model::{Task, TaskStatus, User};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Current filter controls of the board view.
#[derive(Debug, Clone, Default)]
pub struct BoardFilter {
    /// Case-insensitive title substring; empty matches everything
    pub title_contains: String,
    /// Creator uid; `None` matches everything
    pub creator: Option<String>,
    pub sort: SortOrder,
}

/// Apply the filter, then sort by creation time. Ties keep collection order.
pub fn filter_tasks<'a>(tasks: &'a IndexMap<String, Task>, filter: &BoardFilter) -> Vec<&'a Task> {
    let needle = filter.title_contains.to_lowercase();
    let mut out: Vec<&Task> = tasks
        .values()
        .filter(|task| task.title.to_lowercase().contains(&needle))
        .filter(|task| match &filter.creator {
            Some(uid) => task.created_by_id == *uid,
            None => true,
        })
        .collect();
    match filter.sort {
        SortOrder::NewestFirst => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::OldestFirst => out.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
    }
    out
}

/// Split an already filtered-and-sorted task list into the three columns,
/// preserving order within each. Every column is present even when empty.
pub fn group_by_status<'a>(tasks: &[&'a Task]) -> Vec<(TaskStatus, Vec<&'a Task>)> {
    TaskStatus::ALL
        .iter()
        .map(|status| {
            let column: Vec<&Task> = tasks
                .iter()
                .filter(|task| task.status == *status)
                .copied()
                .collect();
            (*status, column)
        })
        .collect()
}

/// Distinct task creators in first-seen order, for the creator filter
/// dropdown. The live user record's name wins over the name denormalized
/// into the task; "Unknown" covers both being absent.
pub fn creator_options(
    tasks: &IndexMap<String, Task>,
    users: &IndexMap<String, User>,
) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for task in tasks.values() {
        if task.created_by_id.is_empty() {
            continue;
        }
        if out.iter().any(|(uid, _)| *uid == task.created_by_id) {
            continue;
        }
        let name = match users.get(&task.created_by_id) {
            Some(user) => user.display_name.clone(),
            None if !task.created_by_username.is_empty() => task.created_by_username.clone(),
            None => "Unknown".to_string(),
        };
        out.push((task.created_by_id.clone(), name));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
