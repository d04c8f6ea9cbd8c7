use indexmap::IndexMap;

use crate::model::{Project, Task, User};

/// The single in-memory store of synchronized state.
///
/// One instance per application session, owned by the application root.
/// Only the subscription coordinator and the mutation gateway write to it;
/// everything else reads. Collections are keyed by id in snapshot arrival
/// order (the order is not semantically significant).
#[derive(Debug, Default)]
pub struct SyncState {
    pub current_user: Option<User>,
    pub all_users: IndexMap<String, User>,
    pub all_projects: IndexMap<String, Project>,
    /// Only meaningful while `current_project_id` is set and `tasks_loaded`
    /// is true
    pub all_tasks: IndexMap<String, Task>,
    pub current_project_id: Option<String>,

    // Readiness flags: first snapshot received (or subscription failed)
    pub users_loaded: bool,
    pub projects_loaded: bool,
    pub tasks_loaded: bool,

    // UI-transient selectors
    pub dragged_task_id: Option<String>,
    pub task_to_delete_id: Option<String>,
    pub project_to_access_id: Option<String>,
    /// Single-in-flight submission guard, mirrored by the gateway
    pub is_submitting: bool,
}

impl SyncState {
    pub fn new() -> SyncState {
        SyncState::default()
    }

    /// Switch the current project. Stale tasks and their readiness flag are
    /// cleared synchronously, before any snapshot for the new project can
    /// possibly arrive.
    pub fn set_current_project(&mut self, project_id: Option<String>) {
        if self.current_project_id != project_id {
            self.all_tasks.clear();
            self.tasks_loaded = false;
        }
        self.current_project_id = project_id;
    }

    /// Logout wipe: everything back to the signed-out baseline.
    pub fn clear_session(&mut self) {
        *self = SyncState::default();
    }

    /// Project-list view is paintable
    pub fn project_list_ready(&self) -> bool {
        self.users_loaded && self.projects_loaded
    }

    /// Board view is paintable
    pub fn board_ready(&self) -> bool {
        self.current_project_id.is_some()
            && self.users_loaded
            && self.projects_loaded
            && self.tasks_loaded
    }

    pub fn current_project(&self) -> Option<&Project> {
        self.current_project_id
            .as_deref()
            .and_then(|id| self.all_projects.get(id))
    }
}
