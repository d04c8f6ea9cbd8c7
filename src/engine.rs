//! The application-facing facade.
//!
//! Owns the synchronized state, the subscription coordinator, the mutation
//! gateway, and the handles to the external services. The host drives it
//! with a single-threaded loop: call an entry point in response to user
//! input, then call [`Engine::pump`] each tick and repaint when it reports
//! a change. No entry point blocks; everything asynchronous settles through
//! `pump`.

use std::sync::mpsc;

use log::{error, info};

use crate::remote::store::{DocumentStore, PendingWrite, USERS_PATH, WriteOp};
use crate::remote::{AuthError, AuthProvider, BlobStore, Notification, NotificationSink, SessionEvent};
use crate::state::SyncState;
use crate::sync::coordinator::{Scope, SubscriptionCoordinator};
use crate::sync::gateway::{
    GatewayConfig, JoinOutcome, MutationGateway, NewProjectInput, NewTaskInput, Submission,
    TaskPatch, ValidationError,
};
use crate::model::{TaskStatus, User};

pub struct Engine {
    store: Box<dyn DocumentStore>,
    auth: Box<dyn AuthProvider>,
    blob: Box<dyn BlobStore>,
    notifier: Box<dyn NotificationSink>,
    session_rx: mpsc::Receiver<SessionEvent>,
    state: SyncState,
    coordinator: SubscriptionCoordinator,
    gateway: MutationGateway,
    /// Public user document written during sign-up; settles outside the
    /// gateway because there is no session yet
    signup_write: Option<PendingWrite>,
}

impl Engine {
    pub fn new(
        store: Box<dyn DocumentStore>,
        auth: Box<dyn AuthProvider>,
        blob: Box<dyn BlobStore>,
        notifier: Box<dyn NotificationSink>,
    ) -> Engine {
        Engine::with_config(store, auth, blob, notifier, GatewayConfig::default())
    }

    pub fn with_config(
        store: Box<dyn DocumentStore>,
        auth: Box<dyn AuthProvider>,
        blob: Box<dyn BlobStore>,
        notifier: Box<dyn NotificationSink>,
        config: GatewayConfig,
    ) -> Engine {
        let session_rx = auth.session_events();
        Engine {
            store,
            auth,
            blob,
            notifier,
            session_rx,
            state: SyncState::new(),
            coordinator: SubscriptionCoordinator::new(),
            gateway: MutationGateway::new(config),
            signup_write: None,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Mutable access for the UI-transient selectors (drag source, pending
    /// delete, access-code target). Collections belong to the coordinator.
    pub fn state_mut(&mut self) -> &mut SyncState {
        &mut self.state
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Sign in. The session event that follows attaches the global
    /// subscriptions; the error, if any, is returned for inline display.
    pub fn sign_in(&mut self, email: &str, password: &str) -> Result<(), AuthError> {
        match self.auth.sign_in(email, password) {
            Ok(user) => {
                info!("signed in as {}", user.uid);
                self.notifier
                    .notify(Notification::info("Success", "Signed in successfully!"));
                Ok(())
            }
            Err(e) => {
                error!("sign in failed: {}", e);
                Err(e)
            }
        }
    }

    /// Create an account: auth record, auth profile display name, and the
    /// public user document, then sign back out so the user logs in
    /// explicitly.
    pub fn sign_up(&mut self, username: &str, email: &str, password: &str) -> Result<(), AuthError> {
        let user = match self.auth.sign_up(email, password) {
            Ok(user) => user,
            Err(e) => {
                error!("sign up failed: {}", e);
                return Err(e);
            }
        };
        self.auth.update_profile(Some(username), None)?;

        let doc = User {
            uid: user.uid.clone(),
            display_name: username.to_string(),
            photo_url: None,
        };
        let op = WriteOp::Set {
            id: user.uid.clone(),
            fields: doc.to_fields(),
        };
        self.signup_write = Some(self.store.write(USERS_PATH, op));

        self.notifier.notify(Notification::info(
            "Success",
            "Account created! Please log in.",
        ));
        self.auth.sign_out();
        Ok(())
    }

    pub fn sign_out(&mut self) {
        self.auth.sign_out();
    }

    pub fn send_password_reset(&mut self, email: &str) {
        match self.auth.send_password_reset(email) {
            Ok(()) => self.notifier.notify(Notification::info(
                "Email Sent",
                "Password reset email sent to your inbox.",
            )),
            Err(e) => {
                error!("password reset failed: {}", e);
                self.notifier
                    .notify(Notification::error("Error", "Could not send reset email."));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Project navigation
    // -----------------------------------------------------------------------

    /// Open a project the user is already a member of.
    pub fn open_project(&mut self, project_id: &str) -> Result<(), ValidationError> {
        let user = self
            .state
            .current_user
            .clone()
            .ok_or(ValidationError::NotSignedIn)?;
        let project = self
            .state
            .all_projects
            .get(project_id)
            .ok_or_else(|| ValidationError::UnknownProject(project_id.to_string()))?;
        if !project.is_member(&user.uid) {
            return Err(ValidationError::NotProjectMember);
        }
        self.enter_project(project_id);
        Ok(())
    }

    /// Redeem an access code and, on success, open the project. A code
    /// mismatch never touches the store.
    pub fn join_and_open_project(
        &mut self,
        project_id: &str,
        access_code: &str,
    ) -> Result<JoinOutcome, ValidationError> {
        let outcome = self.gateway.join_project(
            self.store.as_ref(),
            &mut self.state,
            project_id,
            access_code,
        )?;
        match outcome {
            JoinOutcome::Joined | JoinOutcome::AlreadyMember => self.enter_project(project_id),
            JoinOutcome::Busy => {}
        }
        Ok(outcome)
    }

    /// Back to the project list. The tasks subscription dies with the view.
    pub fn close_project(&mut self) {
        self.coordinator.detach(Scope::Tasks, &mut self.state);
        self.state.set_current_project(None);
    }

    fn enter_project(&mut self, project_id: &str) {
        self.state.set_current_project(Some(project_id.to_string()));
        self.coordinator.attach_tasks(
            project_id,
            self.store.as_ref(),
            &mut self.state,
            self.notifier.as_ref(),
        );
    }

    // -----------------------------------------------------------------------
    // Mutations (delegated to the gateway)
    // -----------------------------------------------------------------------

    pub fn create_task(&mut self, input: NewTaskInput) -> Result<Submission, ValidationError> {
        self.gateway
            .create_task(self.store.as_ref(), &mut self.state, input)
    }

    pub fn update_task(
        &mut self,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Submission, ValidationError> {
        self.gateway
            .update_task(self.store.as_ref(), &mut self.state, task_id, patch)
    }

    pub fn move_task_status(
        &mut self,
        task_id: &str,
        new_status: TaskStatus,
    ) -> Result<Submission, ValidationError> {
        self.gateway
            .move_task_status(self.store.as_ref(), &mut self.state, task_id, new_status)
    }

    pub fn delete_task(&mut self, task_id: &str) -> Result<Submission, ValidationError> {
        self.gateway
            .delete_task(self.store.as_ref(), &mut self.state, task_id)
    }

    pub fn create_project(&mut self, input: NewProjectInput) -> Result<Submission, ValidationError> {
        self.gateway
            .create_project(self.store.as_ref(), &mut self.state, input)
    }

    pub fn delete_project(&mut self, project_id: &str) -> Result<Submission, ValidationError> {
        let submission =
            self.gateway
                .delete_project(self.store.as_ref(), &mut self.state, project_id)?;
        // Deleting the open project sends the user back to the list
        if submission == Submission::Accepted
            && self.state.current_project_id.as_deref() == Some(project_id)
        {
            self.close_project();
        }
        Ok(submission)
    }

    pub fn save_display_name(&mut self, name: &str) -> Result<Submission, ValidationError> {
        self.gateway.save_display_name(
            self.store.as_ref(),
            self.auth.as_ref(),
            &mut self.state,
            name,
            self.notifier.as_ref(),
        )
    }

    pub fn upload_avatar(
        &mut self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Submission, ValidationError> {
        self.gateway.upload_avatar(
            self.store.as_ref(),
            self.blob.as_ref(),
            self.auth.as_ref(),
            &mut self.state,
            filename,
            bytes,
            self.notifier.as_ref(),
        )
    }

    pub fn is_busy(&self) -> bool {
        self.gateway.is_busy()
    }

    // -----------------------------------------------------------------------
    // Readiness
    // -----------------------------------------------------------------------

    pub fn project_list_ready(&self) -> bool {
        self.state.project_list_ready()
    }

    pub fn board_ready(&self) -> bool {
        self.state.board_ready()
    }

    // -----------------------------------------------------------------------
    // Pump
    // -----------------------------------------------------------------------

    /// Drain session events, snapshots, and write settlements. Returns true
    /// when state changed and the host should repaint.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;

        while let Ok(event) = self.session_rx.try_recv() {
            changed = true;
            match event {
                Some(user) => self.on_signed_in(user),
                None => self.on_signed_out(),
            }
        }

        changed |= self
            .coordinator
            .pump(&mut self.state, self.notifier.as_ref());
        changed |= self
            .gateway
            .pump_writes(&mut self.state, self.notifier.as_ref());

        if let Some(result) = self.signup_write.as_ref().and_then(|p| p.poll()) {
            self.signup_write = None;
            if let Err(e) = result {
                error!("sign-up user document write failed: {}", e);
                self.notifier.notify(Notification::error(
                    "Error",
                    "Could not create your user profile.",
                ));
            }
            changed = true;
        }

        changed
    }

    fn on_signed_in(&mut self, user: User) {
        let same_session = self
            .state
            .current_user
            .as_ref()
            .is_some_and(|current| current.uid == user.uid);
        if same_session {
            // Profile refresh, not a new session
            self.state.current_user = Some(user);
            return;
        }

        info!("session started for {}", user.uid);
        self.coordinator.detach_all(&mut self.state);
        self.state.clear_session();
        self.state.current_user = Some(user);
        self.coordinator
            .attach_users(self.store.as_ref(), &mut self.state, self.notifier.as_ref());
        self.coordinator.attach_projects(
            self.store.as_ref(),
            &mut self.state,
            self.notifier.as_ref(),
        );
    }

    fn on_signed_out(&mut self) {
        if self.state.current_user.is_some() {
            info!("session ended");
        }
        self.coordinator.detach_all(&mut self.state);
        self.state.clear_session();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::remote::store::PROJECTS_PATH;
    use crate::remote::{MemoryAuth, MemoryBlob, MemoryStore, RecordingNotifier};

    fn engine_with(store: &MemoryStore, auth: &MemoryAuth, notifier: &RecordingNotifier) -> Engine {
        Engine::new(
            Box::new(store.clone()),
            Box::new(auth.clone()),
            Box::new(MemoryBlob::new()),
            Box::new(notifier.clone()),
        )
    }

    #[test]
    fn sign_up_writes_user_document_and_signs_out() {
        let store = MemoryStore::new();
        let auth = MemoryAuth::new();
        let notifier = RecordingNotifier::new();
        let mut engine = engine_with(&store, &auth, &notifier);

        engine.sign_up("Ada", "ada@example.com", "hunter22").unwrap();
        engine.pump();

        assert!(engine.state().current_user.is_none());
        assert!(auth.current_user().is_none());
        let users = store.docs(USERS_PATH);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].fields["displayName"], json!("Ada"));
        assert_eq!(users[0].fields["uid"], json!(users[0].id));
    }

    #[test]
    fn sign_in_attaches_global_subscriptions() {
        let store = MemoryStore::new();
        let auth = MemoryAuth::new();
        let notifier = RecordingNotifier::new();
        let mut engine = engine_with(&store, &auth, &notifier);
        engine.sign_up("Ada", "ada@example.com", "hunter22").unwrap();
        engine.pump();

        engine.sign_in("ada@example.com", "hunter22").unwrap();
        engine.pump();

        assert!(engine.state().current_user.is_some());
        assert!(engine.state().project_list_ready());
        assert_eq!(engine.state().all_users.len(), 1);
    }

    #[test]
    fn sign_in_failure_surfaces_auth_error() {
        let store = MemoryStore::new();
        let auth = MemoryAuth::new();
        let notifier = RecordingNotifier::new();
        let mut engine = engine_with(&store, &auth, &notifier);

        let err = engine.sign_in("ghost@example.com", "nope").unwrap_err();
        assert_eq!(err.friendly_message(), "Invalid email or password.");
        engine.pump();
        assert!(engine.state().current_user.is_none());
    }

    #[test]
    fn sign_out_clears_state_and_detaches() {
        let store = MemoryStore::new();
        let auth = MemoryAuth::new();
        let notifier = RecordingNotifier::new();
        let mut engine = engine_with(&store, &auth, &notifier);
        engine.sign_up("Ada", "ada@example.com", "hunter22").unwrap();
        engine.pump();
        engine.sign_in("ada@example.com", "hunter22").unwrap();
        engine.pump();

        engine.sign_out();
        engine.pump();

        assert!(engine.state().current_user.is_none());
        assert!(!engine.state().project_list_ready());
        assert_eq!(store.subscriber_count(USERS_PATH), 0);
        assert_eq!(store.subscriber_count(PROJECTS_PATH), 0);
    }

    #[test]
    fn open_project_requires_membership() {
        let store = MemoryStore::new();
        store.seed(
            PROJECTS_PATH,
            "p1",
            [
                ("name".to_string(), json!("Atlas")),
                ("accessCode".to_string(), json!("1234")),
                ("createdById".to_string(), json!("other")),
                ("members".to_string(), json!(["other"])),
            ]
            .into_iter()
            .collect(),
        );
        let auth = MemoryAuth::new();
        let notifier = RecordingNotifier::new();
        let mut engine = engine_with(&store, &auth, &notifier);
        engine.sign_up("Ada", "ada@example.com", "hunter22").unwrap();
        engine.pump();
        engine.sign_in("ada@example.com", "hunter22").unwrap();
        engine.pump();

        let err = engine.open_project("p1").unwrap_err();
        assert_eq!(err, ValidationError::NotProjectMember);
        assert!(engine.state().current_project_id.is_none());
    }

    #[test]
    fn password_reset_notifies_either_way() {
        let store = MemoryStore::new();
        let auth = MemoryAuth::new();
        let notifier = RecordingNotifier::new();
        let mut engine = engine_with(&store, &auth, &notifier);
        engine.sign_up("Ada", "ada@example.com", "hunter22").unwrap();
        engine.pump();
        notifier.take();

        engine.send_password_reset("ada@example.com");
        engine.send_password_reset("ghost@example.com");
        let notifications = notifier.take();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].title, "Email Sent");
        assert_eq!(notifications[1].title, "Error");
    }
}
