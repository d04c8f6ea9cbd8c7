//! Pure read-model computations over the synchronized collections.
//!
//! Nothing here touches the store or mutates state; hosts call these when
//! painting the dashboard, summary, and profile views.

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;

use crate::model::{Task, TaskStatus, User};

/// Aggregates for the analytics dashboard of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStats {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    /// Percentage of tasks in Done, rounded to the nearest integer. Zero
    /// for an empty board.
    pub completion_rate_percent: u32,
    /// Human-readable mean time from creation to completion, or "N/A" when
    /// no task carries a completion timestamp
    pub avg_completion_time: String,
    /// Per-assignee open work, heaviest first
    pub workload: Vec<UserWorkload>,
}

/// One assignee's row in the workload table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserWorkload {
    pub uid: String,
    pub display_name: String,
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
}

/// Compute dashboard aggregates from the loaded task and user collections.
///
/// Workload rows exist only for users with at least one assigned task and
/// are sorted by descending total; ties keep user-collection order.
pub fn compute_project_stats(
    tasks: &IndexMap<String, Task>,
    users: &IndexMap<String, User>,
) -> ProjectStats {
    let total_tasks = tasks.len();
    let completed_tasks = tasks
        .values()
        .filter(|t| t.status == TaskStatus::Done)
        .count();

    let completion_rate_percent = if total_tasks == 0 {
        0
    } else {
        (completed_tasks as f64 / total_tasks as f64 * 100.0).round() as u32
    };

    let durations: Vec<i64> = tasks
        .values()
        .filter(|t| t.status == TaskStatus::Done)
        .filter_map(|t| {
            t.completed_at
                .map(|done| done.timestamp_millis() - t.created_at.timestamp_millis())
        })
        .collect();
    let avg_completion_time = if durations.is_empty() {
        "N/A".to_string()
    } else {
        let avg_ms = durations.iter().sum::<i64>() as f64 / durations.len() as f64;
        format_duration(avg_ms)
    };

    let mut workload: Vec<UserWorkload> = users
        .values()
        .map(|user| {
            let assigned: Vec<&Task> = tasks
                .values()
                .filter(|t| t.assignee_id == user.uid)
                .collect();
            UserWorkload {
                uid: user.uid.clone(),
                display_name: user.display_name.clone(),
                total: assigned.len(),
                todo: assigned
                    .iter()
                    .filter(|t| t.status == TaskStatus::ToDo)
                    .count(),
                in_progress: assigned
                    .iter()
                    .filter(|t| t.status == TaskStatus::InProgress)
                    .count(),
            }
        })
        .filter(|row| row.total > 0)
        .collect();
    // Stable, so equal totals keep user-collection order
    workload.sort_by(|a, b| b.total.cmp(&a.total));

    ProjectStats {
        total_tasks,
        completed_tasks,
        completion_rate_percent,
        avg_completion_time,
        workload,
    }
}

/// Render a duration in the largest unit whose value is at least 1.
pub fn format_duration(ms: f64) -> String {
    let seconds = ms / 1000.0;
    let minutes = seconds / 60.0;
    let hours = minutes / 60.0;
    let days = hours / 24.0;

    if days >= 1.0 {
        format!("{:.1} days", days)
    } else if hours >= 1.0 {
        format!("{:.1} hours", hours)
    } else if minutes >= 1.0 {
        format!("{:.1} minutes", minutes)
    } else {
        format!("{:.0} seconds", seconds)
    }
}

/// Standing of a project deadline relative to a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineStatus {
    NoDeadline,
    Overdue,
    DueToday,
    /// Whole calendar days remaining (at least 1)
    DaysLeft(i64),
}

/// Classify a deadline against `today`. Comparison is by calendar date, so
/// a deadline later today is `DueToday` regardless of time of day.
pub fn deadline_status(deadline: Option<DateTime<Utc>>, today: NaiveDate) -> DeadlineStatus {
    let Some(deadline) = deadline else {
        return DeadlineStatus::NoDeadline;
    };
    let days = (deadline.date_naive() - today).num_days();
    if days < 0 {
        DeadlineStatus::Overdue
    } else if days == 0 {
        DeadlineStatus::DueToday
    } else {
        DeadlineStatus::DaysLeft(days)
    }
}

/// Newest tasks first, capped at `limit`. Ties keep collection order.
pub fn recent_tasks(tasks: &IndexMap<String, Task>, limit: usize) -> Vec<&Task> {
    let mut out: Vec<&Task> = tasks.values().collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    out.truncate(limit);
    out
}

/// Per-status counts of the tasks a user created, for the profile view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
}

pub fn profile_task_counts(tasks: &IndexMap<String, Task>, uid: &str) -> TaskCounts {
    let mut counts = TaskCounts::default();
    for task in tasks.values().filter(|t| t.created_by_id == uid) {
        match task.status {
            TaskStatus::ToDo => counts.todo += 1,
            TaskStatus::InProgress => counts.in_progress += 1,
            TaskStatus::Done => counts.done += 1,
        }
    }
    counts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use crate::model::TaskPriority;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            title: format!("Task {}", id),
            description: String::new(),
            status,
            assignee_id: String::new(),
            created_by_id: "u1".into(),
            created_by_username: "Ada".into(),
            created_at: at(1_700_000_000_000),
            completed_at: None,
            priority: TaskPriority::Medium,
            due_date: String::new(),
            tags: Vec::new(),
        }
    }

    fn user(uid: &str, name: &str) -> User {
        User {
            uid: uid.to_string(),
            display_name: name.to_string(),
            photo_url: None,
        }
    }

    fn map<T>(items: Vec<(String, T)>) -> IndexMap<String, T> {
        items.into_iter().collect()
    }

    #[test]
    fn empty_board_yields_zeroes_and_na() {
        let stats = compute_project_stats(&IndexMap::new(), &IndexMap::new());
        assert_eq!(stats.total_tasks, 0);
        assert_eq!(stats.completed_tasks, 0);
        assert_eq!(stats.completion_rate_percent, 0);
        assert_eq!(stats.avg_completion_time, "N/A");
        assert_eq!(stats.workload, vec![]);
    }

    #[test]
    fn single_done_task_one_hour_apart() {
        let mut t = task("t1", TaskStatus::Done);
        t.created_at = at(1_700_000_000_000);
        t.completed_at = Some(at(1_700_000_000_000 + 3_600_000));
        let tasks = map(vec![("t1".to_string(), t)]);

        let stats = compute_project_stats(&tasks, &IndexMap::new());
        assert_eq!(stats.total_tasks, 1);
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.completion_rate_percent, 100);
        assert_eq!(stats.avg_completion_time, "1.0 hours");
    }

    #[test]
    fn done_without_completed_at_is_excluded_from_average() {
        let tasks = map(vec![
            ("t1".to_string(), task("t1", TaskStatus::Done)),
            ("t2".to_string(), task("t2", TaskStatus::ToDo)),
        ]);
        let stats = compute_project_stats(&tasks, &IndexMap::new());
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.completion_rate_percent, 50);
        assert_eq!(stats.avg_completion_time, "N/A");
    }

    #[test]
    fn workload_counts_open_statuses_and_sorts_by_total() {
        let mut t1 = task("t1", TaskStatus::ToDo);
        t1.assignee_id = "u2".into();
        let mut t2 = task("t2", TaskStatus::InProgress);
        t2.assignee_id = "u2".into();
        let mut t3 = task("t3", TaskStatus::Done);
        t3.assignee_id = "u1".into();
        let tasks = map(vec![
            ("t1".to_string(), t1),
            ("t2".to_string(), t2),
            ("t3".to_string(), t3),
        ]);
        let users = map(vec![
            ("u1".to_string(), user("u1", "Ada")),
            ("u2".to_string(), user("u2", "Grace")),
            ("u3".to_string(), user("u3", "Idle")),
        ]);

        let stats = compute_project_stats(&tasks, &users);
        assert_eq!(stats.workload.len(), 2); // u3 has nothing assigned
        assert_eq!(stats.workload[0].display_name, "Grace");
        assert_eq!(stats.workload[0].total, 2);
        assert_eq!(stats.workload[0].todo, 1);
        assert_eq!(stats.workload[0].in_progress, 1);
        assert_eq!(stats.workload[1].display_name, "Ada");
        assert_eq!(stats.workload[1].total, 1);
        assert_eq!(stats.workload[1].todo, 0);
    }

    #[test]
    fn duration_picks_largest_unit_at_least_one() {
        assert_eq!(format_duration(30_000.0), "30 seconds");
        assert_eq!(format_duration(90_000.0), "1.5 minutes");
        assert_eq!(format_duration(3_600_000.0), "1.0 hours");
        assert_eq!(format_duration(5_400_000.0), "1.5 hours");
        assert_eq!(format_duration(129_600_000.0), "1.5 days");
    }

    #[test]
    fn deadline_classification() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(deadline_status(None, today), DeadlineStatus::NoDeadline);

        let yesterday = Utc.with_ymd_and_hms(2024, 3, 9, 23, 0, 0).unwrap();
        assert_eq!(
            deadline_status(Some(yesterday), today),
            DeadlineStatus::Overdue
        );

        // Later the same calendar day still counts as today
        let tonight = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 0).unwrap();
        assert_eq!(
            deadline_status(Some(tonight), today),
            DeadlineStatus::DueToday
        );

        let next_week = Utc.with_ymd_and_hms(2024, 3, 17, 8, 0, 0).unwrap();
        assert_eq!(
            deadline_status(Some(next_week), today),
            DeadlineStatus::DaysLeft(7)
        );
    }

    #[test]
    fn recent_tasks_newest_first_capped() {
        let mut t1 = task("t1", TaskStatus::ToDo);
        t1.created_at = at(1_000);
        let mut t2 = task("t2", TaskStatus::ToDo);
        t2.created_at = at(3_000);
        let mut t3 = task("t3", TaskStatus::ToDo);
        t3.created_at = at(2_000);
        let tasks = map(vec![
            ("t1".to_string(), t1),
            ("t2".to_string(), t2),
            ("t3".to_string(), t3),
        ]);

        let recent = recent_tasks(&tasks, 2);
        let ids: Vec<&str> = recent.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t3"]);
    }

    #[test]
    fn profile_counts_only_created_by_user() {
        let mut t1 = task("t1", TaskStatus::ToDo);
        t1.created_by_id = "u1".into();
        let mut t2 = task("t2", TaskStatus::Done);
        t2.created_by_id = "u1".into();
        let mut t3 = task("t3", TaskStatus::Done);
        t3.created_by_id = "u2".into();
        let tasks = map(vec![
            ("t1".to_string(), t1),
            ("t2".to_string(), t2),
            ("t3".to_string(), t3),
        ]);

        let counts = profile_task_counts(&tasks, "u1");
        assert_eq!(
            counts,
            TaskCounts {
                todo: 1,
                in_progress: 0,
                done: 1
            }
        );
    }
}
