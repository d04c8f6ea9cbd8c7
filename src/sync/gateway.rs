//! Validated write intents.
//!
//! Every user-initiated mutation funnels through here: local preconditions
//! are checked first (and never reach the store on failure), then the write
//! is handed to the store and tracked until it settles. Remote outcomes are
//! reported through the notification sink only — the write path never
//! mutates the synchronized collections, so a failed write leaves state
//! untouched and the UI converges from the next confirmed snapshot.
//!
//! A single in-flight slot guards all mutation entry points: while a write
//! is pending, further submissions are ignored without a remote call.
//! `SyncState::is_submitting` mirrors the slot.

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde_json::{Map, Value, json};

use crate::model::{Project, Task, TaskPriority, TaskStatus, User};
use crate::remote::store::{
    DocumentStore, PendingWrite, WriteOp, PROJECTS_PATH, USERS_PATH, tasks_path,
};
use crate::remote::{AuthProvider, BlobStore, Notification, NotificationSink};
use crate::state::SyncState;

/// Local, pre-flight validation failure. Surfaced synchronously as an
/// inline form error; no remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title must be at least 3 characters")]
    TitleTooShort,
    #[error("project name must be at least 3 characters")]
    NameTooShort,
    #[error("access code must be at least 4 characters")]
    AccessCodeTooShort,
    #[error("access code does not match")]
    AccessCodeMismatch,
    #[error("username must be at least 3 characters")]
    UsernameTooShort,
    #[error("only the project creator can delete it")]
    NotProjectCreator,
    #[error("not a member of this project")]
    NotProjectMember,
    #[error("not signed in")]
    NotSignedIn,
    #[error("no project is open")]
    NoCurrentProject,
    #[error("unknown project: {0}")]
    UnknownProject(String),
}

/// What happened to an accepted-for-validation submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Write issued; outcome will arrive via the notification sink
    Accepted,
    /// Nothing to do: guard active, no-op change, or unknown target
    Ignored,
}

/// Outcome of a join attempt with a matching access code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Membership write issued; caller may navigate into the project
    Joined,
    /// Idempotent: already a member, no write needed
    AlreadyMember,
    /// Another mutation is in flight
    Busy,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayConfig {
    /// Clear `completedAt` when a task leaves Done. Off by default: the
    /// timestamp records the first completion ever.
    pub clear_completed_on_regression: bool,
}

/// Fields accepted when creating a task
#[derive(Debug, Clone)]
pub struct NewTaskInput {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub assignee_id: String,
    pub priority: TaskPriority,
    pub due_date: String,
    pub tags: Vec<String>,
}

impl Default for NewTaskInput {
    fn default() -> Self {
        NewTaskInput {
            title: String::new(),
            description: String::new(),
            status: TaskStatus::ToDo,
            assignee_id: String::new(),
            priority: TaskPriority::Medium,
            due_date: String::new(),
            tags: Vec::new(),
        }
    }
}

/// Partial-field task edit. `None` leaves a field untouched and skips its
/// validation.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<String>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Fields accepted when creating a project
#[derive(Debug, Clone, Default)]
pub struct NewProjectInput {
    pub name: String,
    pub description: String,
    pub access_code: String,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteAction {
    CreateTask,
    UpdateTask,
    MoveTask,
    DeleteTask,
    CreateProject,
    JoinProject,
    DeleteProject,
    SaveProfile,
    SaveAvatar,
}

impl WriteAction {
    fn success_message(self) -> Option<(&'static str, &'static str)> {
        match self {
            WriteAction::CreateTask => Some(("Success", "Task created.")),
            WriteAction::UpdateTask => Some(("Success", "Task updated.")),
            // Drag-drop feedback is the card landing in its column
            WriteAction::MoveTask => None,
            WriteAction::DeleteTask => Some(("Success", "Task deleted.")),
            WriteAction::CreateProject => Some(("Success", "Project created successfully.")),
            // Navigation into the board is the feedback
            WriteAction::JoinProject => None,
            WriteAction::DeleteProject => Some(("Success", "Project deleted.")),
            WriteAction::SaveProfile => Some(("Success", "Username updated!")),
            WriteAction::SaveAvatar => Some(("Success", "Profile photo updated!")),
        }
    }

    fn failure_message(self) -> (&'static str, &'static str) {
        match self {
            WriteAction::CreateTask | WriteAction::UpdateTask => {
                ("Error", "Could not save the task.")
            }
            WriteAction::MoveTask => ("Error", "Could not update the status."),
            WriteAction::DeleteTask => ("Error", "Could not delete the task."),
            WriteAction::CreateProject => ("Error", "Could not create the project."),
            WriteAction::JoinProject => ("Error", "Could not join the project."),
            WriteAction::DeleteProject => ("Error", "Could not delete the project."),
            WriteAction::SaveProfile => ("Error", "Could not update username."),
            WriteAction::SaveAvatar => ("Upload Error", "Could not update profile photo."),
        }
    }

    fn label(self) -> &'static str {
        match self {
            WriteAction::CreateTask => "create-task",
            WriteAction::UpdateTask => "update-task",
            WriteAction::MoveTask => "move-task",
            WriteAction::DeleteTask => "delete-task",
            WriteAction::CreateProject => "create-project",
            WriteAction::JoinProject => "join-project",
            WriteAction::DeleteProject => "delete-project",
            WriteAction::SaveProfile => "save-profile",
            WriteAction::SaveAvatar => "save-avatar",
        }
    }
}

struct InFlight {
    pending: PendingWrite,
    action: WriteAction,
}

/// Serializes all user-initiated writes against the remote store.
#[derive(Default)]
pub struct MutationGateway {
    config: GatewayConfig,
    in_flight: Option<InFlight>,
}

impl MutationGateway {
    pub fn new(config: GatewayConfig) -> MutationGateway {
        MutationGateway {
            config,
            in_flight: None,
        }
    }

    /// A mutation is pending settlement
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    // -----------------------------------------------------------------------
    // Task mutations
    // -----------------------------------------------------------------------

    /// Create a task in the current project. Title must be at least 3
    /// characters; status defaults to ToDo; creator fields are stamped from
    /// the session.
    pub fn create_task(
        &mut self,
        store: &dyn DocumentStore,
        state: &mut SyncState,
        input: NewTaskInput,
    ) -> Result<Submission, ValidationError> {
        let user = current_user(state)?;
        let project_id = current_project_id(state)?;
        if input.title.chars().count() < 3 {
            return Err(ValidationError::TitleTooShort);
        }

        let task = Task {
            id: String::new(),
            title: input.title,
            description: input.description,
            status: input.status,
            assignee_id: input.assignee_id,
            created_by_id: user.uid.clone(),
            created_by_username: display_name_or_placeholder(&user),
            created_at: Utc::now(),
            completed_at: None,
            priority: input.priority,
            due_date: input.due_date,
            tags: input.tags,
        };
        let op = WriteOp::Insert {
            fields: task.to_fields(),
        };
        Ok(self.begin(store, state, WriteAction::CreateTask, &tasks_path(&project_id), op))
    }

    /// Partial-field edit. Fields absent from the patch are not validated
    /// and not written.
    pub fn update_task(
        &mut self,
        store: &dyn DocumentStore,
        state: &mut SyncState,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Submission, ValidationError> {
        current_user(state)?;
        let project_id = current_project_id(state)?;
        if let Some(title) = &patch.title
            && title.chars().count() < 3
        {
            return Err(ValidationError::TitleTooShort);
        }

        let mut fields = Map::new();
        if let Some(title) = patch.title {
            fields.insert("title".into(), json!(title));
        }
        if let Some(description) = patch.description {
            fields.insert("description".into(), json!(description));
        }
        if let Some(status) = patch.status {
            fields.insert("status".into(), json!(status.as_str()));
        }
        if let Some(assignee_id) = patch.assignee_id {
            fields.insert("assigneeId".into(), json!(assignee_id));
        }
        if let Some(priority) = patch.priority {
            fields.insert("priority".into(), json!(priority.as_str()));
        }
        if let Some(due_date) = patch.due_date {
            fields.insert("dueDate".into(), json!(due_date));
        }
        if let Some(tags) = patch.tags {
            fields.insert("tags".into(), json!(tags));
        }
        if fields.is_empty() {
            return Ok(Submission::Ignored);
        }

        let op = WriteOp::Merge {
            id: task_id.to_string(),
            fields,
        };
        Ok(self.begin(store, state, WriteAction::UpdateTask, &tasks_path(&project_id), op))
    }

    /// Status move (drag-drop). Idempotent: no write when the status is
    /// unchanged. Entering Done bundles `completedAt` into the same single
    /// write, so there is never an observable Done-without-timestamp state.
    pub fn move_task_status(
        &mut self,
        store: &dyn DocumentStore,
        state: &mut SyncState,
        task_id: &str,
        new_status: TaskStatus,
    ) -> Result<Submission, ValidationError> {
        current_user(state)?;
        let project_id = current_project_id(state)?;
        let Some(task) = state.all_tasks.get(task_id) else {
            warn!("move ignored: unknown task {}", task_id);
            return Ok(Submission::Ignored);
        };
        if task.status == new_status {
            return Ok(Submission::Ignored);
        }

        let mut fields = Map::new();
        fields.insert("status".into(), json!(new_status.as_str()));
        if new_status == TaskStatus::Done {
            fields.insert("completedAt".into(), json!(Utc::now().timestamp_millis()));
        } else if task.status == TaskStatus::Done && self.config.clear_completed_on_regression {
            fields.insert("completedAt".into(), Value::Null);
        }

        let op = WriteOp::Merge {
            id: task_id.to_string(),
            fields,
        };
        Ok(self.begin(store, state, WriteAction::MoveTask, &tasks_path(&project_id), op))
    }

    pub fn delete_task(
        &mut self,
        store: &dyn DocumentStore,
        state: &mut SyncState,
        task_id: &str,
    ) -> Result<Submission, ValidationError> {
        current_user(state)?;
        let project_id = current_project_id(state)?;
        let op = WriteOp::Delete {
            id: task_id.to_string(),
        };
        let submission = self.begin(store, state, WriteAction::DeleteTask, &tasks_path(&project_id), op);
        if submission == Submission::Accepted {
            state.task_to_delete_id = None;
        }
        Ok(submission)
    }

    // -----------------------------------------------------------------------
    // Project mutations
    // -----------------------------------------------------------------------

    /// Create a project. Name must be at least 3 characters, access code at
    /// least 4. The creator is the sole initial member.
    pub fn create_project(
        &mut self,
        store: &dyn DocumentStore,
        state: &mut SyncState,
        input: NewProjectInput,
    ) -> Result<Submission, ValidationError> {
        let user = current_user(state)?;
        if input.name.chars().count() < 3 {
            return Err(ValidationError::NameTooShort);
        }
        if input.access_code.chars().count() < 4 {
            return Err(ValidationError::AccessCodeTooShort);
        }

        let project = Project {
            id: String::new(),
            name: input.name,
            description: input.description,
            access_code: input.access_code,
            created_by_id: user.uid.clone(),
            created_by_username: display_name_or_placeholder(&user),
            created_at: Utc::now(),
            deadline: input.deadline,
            members: vec![user.uid.clone()],
        };
        let op = WriteOp::Insert {
            fields: project.to_fields(),
        };
        Ok(self.begin(store, state, WriteAction::CreateProject, PROJECTS_PATH, op))
    }

    /// Redeem an access code. A mismatch is a local validation error and
    /// issues no remote call; a match unions the user into the member set
    /// (idempotent) and tells the caller it may navigate into the project.
    pub fn join_project(
        &mut self,
        store: &dyn DocumentStore,
        state: &mut SyncState,
        project_id: &str,
        access_code: &str,
    ) -> Result<JoinOutcome, ValidationError> {
        let user = current_user(state)?;
        let project = state
            .all_projects
            .get(project_id)
            .ok_or_else(|| ValidationError::UnknownProject(project_id.to_string()))?;
        if project.access_code != access_code {
            return Err(ValidationError::AccessCodeMismatch);
        }

        if project.is_member(&user.uid) {
            state.project_to_access_id = None;
            return Ok(JoinOutcome::AlreadyMember);
        }

        let mut members = project.members.clone();
        members.push(user.uid.clone());
        let mut fields = Map::new();
        fields.insert("members".into(), json!(members));
        let op = WriteOp::Merge {
            id: project_id.to_string(),
            fields,
        };
        match self.begin(store, state, WriteAction::JoinProject, PROJECTS_PATH, op) {
            Submission::Accepted => {
                state.project_to_access_id = None;
                Ok(JoinOutcome::Joined)
            }
            Submission::Ignored => Ok(JoinOutcome::Busy),
        }
    }

    /// Delete a project. Creator-only; the task subcollection cascade is
    /// the store's responsibility.
    pub fn delete_project(
        &mut self,
        store: &dyn DocumentStore,
        state: &mut SyncState,
        project_id: &str,
    ) -> Result<Submission, ValidationError> {
        let user = current_user(state)?;
        let project = state
            .all_projects
            .get(project_id)
            .ok_or_else(|| ValidationError::UnknownProject(project_id.to_string()))?;
        if project.created_by_id != user.uid {
            return Err(ValidationError::NotProjectCreator);
        }
        let op = WriteOp::Delete {
            id: project_id.to_string(),
        };
        Ok(self.begin(store, state, WriteAction::DeleteProject, PROJECTS_PATH, op))
    }

    // -----------------------------------------------------------------------
    // Profile mutations
    // -----------------------------------------------------------------------

    /// Save a new display name to the auth profile and the public user
    /// document. The session mirror is updated immediately; the users
    /// collection converges from its next snapshot.
    pub fn save_display_name(
        &mut self,
        store: &dyn DocumentStore,
        auth: &dyn AuthProvider,
        state: &mut SyncState,
        name: &str,
        notifier: &dyn NotificationSink,
    ) -> Result<Submission, ValidationError> {
        let user = current_user(state)?;
        let name = name.trim();
        if name.chars().count() < 3 {
            return Err(ValidationError::UsernameTooShort);
        }
        if self.in_flight.is_some() {
            debug!("save-profile ignored: mutation in flight");
            return Ok(Submission::Ignored);
        }

        if let Err(e) = auth.update_profile(Some(name), None) {
            error!("auth profile update failed: {}", e);
            notifier.notify(Notification::error("Error", e.friendly_message()));
            return Ok(Submission::Ignored);
        }
        if let Some(current) = &mut state.current_user {
            current.display_name = name.to_string();
        }

        let mut fields = Map::new();
        fields.insert("displayName".into(), json!(name));
        let op = WriteOp::Merge {
            id: user.uid.clone(),
            fields,
        };
        Ok(self.begin(store, state, WriteAction::SaveProfile, USERS_PATH, op))
    }

    /// Upload a profile photo, then write the URL through to the auth
    /// profile and the public user document.
    #[allow(clippy::too_many_arguments)]
    pub fn upload_avatar(
        &mut self,
        store: &dyn DocumentStore,
        blob: &dyn BlobStore,
        auth: &dyn AuthProvider,
        state: &mut SyncState,
        filename: &str,
        bytes: &[u8],
        notifier: &dyn NotificationSink,
    ) -> Result<Submission, ValidationError> {
        let user = current_user(state)?;
        if self.in_flight.is_some() {
            debug!("save-avatar ignored: mutation in flight");
            return Ok(Submission::Ignored);
        }

        let path = format!("profile-images/{}/{}", user.uid, filename);
        let url = match blob.upload(&path, bytes) {
            Ok(url) => url,
            Err(e) => {
                error!("avatar upload failed: {}", e);
                notifier.notify(Notification::error(
                    "Upload Error",
                    "Could not upload the image. Please try again.",
                ));
                return Ok(Submission::Ignored);
            }
        };

        if let Err(e) = auth.update_profile(None, Some(&url)) {
            error!("auth profile update failed: {}", e);
            notifier.notify(Notification::error("Error", e.friendly_message()));
            return Ok(Submission::Ignored);
        }
        if let Some(current) = &mut state.current_user {
            current.photo_url = Some(url.clone());
        }

        let mut fields = Map::new();
        fields.insert("photoURL".into(), json!(url));
        let op = WriteOp::Merge {
            id: user.uid.clone(),
            fields,
        };
        Ok(self.begin(store, state, WriteAction::SaveAvatar, USERS_PATH, op))
    }

    // -----------------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------------

    /// Poll the in-flight write. On settlement the guard clears and exactly
    /// one success or failure notification is emitted. Returns true when a
    /// write settled this tick.
    pub fn pump_writes(&mut self, state: &mut SyncState, notifier: &dyn NotificationSink) -> bool {
        let Some(in_flight) = &self.in_flight else {
            return false;
        };
        let Some(result) = in_flight.pending.poll() else {
            return false;
        };
        let action = in_flight.action;
        self.in_flight = None;
        state.is_submitting = false;

        match result {
            Ok(()) => {
                debug!("{} settled ok", action.label());
                if let Some((title, description)) = action.success_message() {
                    notifier.notify(Notification::info(title, description));
                }
            }
            Err(e) => {
                error!("{} failed: {}", action.label(), e);
                let (title, description) = action.failure_message();
                notifier.notify(Notification::error(title, description));
            }
        }
        true
    }

    /// Issue a write unless one is already in flight.
    fn begin(
        &mut self,
        store: &dyn DocumentStore,
        state: &mut SyncState,
        action: WriteAction,
        path: &str,
        op: WriteOp,
    ) -> Submission {
        if self.in_flight.is_some() {
            debug!("{} ignored: mutation in flight", action.label());
            return Submission::Ignored;
        }
        let pending = store.write(path, op);
        self.in_flight = Some(InFlight { pending, action });
        state.is_submitting = true;
        Submission::Accepted
    }
}

fn current_user(state: &SyncState) -> Result<User, ValidationError> {
    state
        .current_user
        .clone()
        .ok_or(ValidationError::NotSignedIn)
}

fn current_project_id(state: &SyncState) -> Result<String, ValidationError> {
    state
        .current_project_id
        .clone()
        .ok_or(ValidationError::NoCurrentProject)
}

fn display_name_or_placeholder(user: &User) -> String {
    if user.display_name.is_empty() {
        User::placeholder_name(&user.uid)
    } else {
        user.display_name.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
