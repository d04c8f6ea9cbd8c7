//! Subscription lifecycle and snapshot application.
//!
//! One active subscription per scope: users and projects live for the
//! session, tasks are re-subscribed on every project switch. Each attach
//! bumps a per-scope epoch; snapshot events carry the epoch captured at
//! attach time, and events whose epoch no longer matches are dropped so an
//! in-flight snapshot for a dead scope can never touch state.

use log::{debug, error, warn};

use crate::normalize::{normalize_project, normalize_task, normalize_user};
use crate::remote::store::{
    DocumentStore, Query, SnapshotResult, SortDirection, Subscription, PROJECTS_PATH, USERS_PATH,
    tasks_path,
};
use crate::remote::{Notification, NotificationSink};
use crate::state::SyncState;

/// Subscription scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Users,
    Projects,
    Tasks,
}

impl Scope {
    fn index(self) -> usize {
        match self {
            Scope::Users => 0,
            Scope::Projects => 1,
            Scope::Tasks => 2,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Scope::Users => "users",
            Scope::Projects => "projects",
            Scope::Tasks => "tasks",
        }
    }
}

struct ActiveSub {
    epoch: u64,
    /// Project the tasks scope was attached for; `None` for global scopes
    project_id: Option<String>,
    subscription: Subscription,
}

/// Owns the three subscription slots and applies their snapshots to
/// `SyncState`.
#[derive(Default)]
pub struct SubscriptionCoordinator {
    slots: [Option<ActiveSub>; 3],
    epochs: [u64; 3],
}

impl SubscriptionCoordinator {
    pub fn new() -> SubscriptionCoordinator {
        SubscriptionCoordinator::default()
    }

    /// Attach the global users subscription, replacing any previous one.
    pub fn attach_users(
        &mut self,
        store: &dyn DocumentStore,
        state: &mut SyncState,
        notifier: &dyn NotificationSink,
    ) {
        self.attach(Scope::Users, USERS_PATH, None, None, store, state, notifier);
    }

    /// Attach the global projects subscription, replacing any previous one.
    pub fn attach_projects(
        &mut self,
        store: &dyn DocumentStore,
        state: &mut SyncState,
        notifier: &dyn NotificationSink,
    ) {
        let query = Query::order_by("createdAt", SortDirection::Descending);
        self.attach(
            Scope::Projects,
            PROJECTS_PATH,
            Some(query),
            None,
            store,
            state,
            notifier,
        );
    }

    /// Attach the tasks subscription for `project_id`, replacing any
    /// previous one. Call synchronously after `current_project_id` changes.
    pub fn attach_tasks(
        &mut self,
        project_id: &str,
        store: &dyn DocumentStore,
        state: &mut SyncState,
        notifier: &dyn NotificationSink,
    ) {
        let path = tasks_path(project_id);
        self.attach(
            Scope::Tasks,
            &path,
            None,
            Some(project_id.to_string()),
            store,
            state,
            notifier,
        );
    }

    /// Detach one scope, clearing its collection and readiness flag.
    pub fn detach(&mut self, scope: Scope, state: &mut SyncState) {
        if self.slots[scope.index()].take().is_some() {
            debug!("detached {} subscription", scope.label());
        }
        match scope {
            Scope::Users => {
                state.all_users.clear();
                state.users_loaded = false;
            }
            Scope::Projects => {
                state.all_projects.clear();
                state.projects_loaded = false;
            }
            Scope::Tasks => {
                state.all_tasks.clear();
                state.tasks_loaded = false;
            }
        }
    }

    /// Logout path: all flags false, all collections empty.
    pub fn detach_all(&mut self, state: &mut SyncState) {
        self.detach(Scope::Users, state);
        self.detach(Scope::Projects, state);
        self.detach(Scope::Tasks, state);
    }

    pub fn is_attached(&self, scope: Scope) -> bool {
        self.slots[scope.index()].is_some()
    }

    /// Current epoch for a scope. Bumped on every attach; events stamped
    /// with an older epoch are stale.
    pub fn epoch(&self, scope: Scope) -> u64 {
        self.epochs[scope.index()]
    }

    /// Drain every active subscription and apply the queued snapshots.
    /// Returns true when state changed (re-render and readiness
    /// re-evaluation hint). Snapshots for different scopes may interleave
    /// in any order.
    pub fn pump(&mut self, state: &mut SyncState, notifier: &dyn NotificationSink) -> bool {
        let mut batch: Vec<(Scope, u64, Option<String>, SnapshotResult)> = Vec::new();
        for scope in [Scope::Users, Scope::Projects, Scope::Tasks] {
            if let Some(sub) = &self.slots[scope.index()] {
                for event in sub.subscription.poll() {
                    batch.push((scope, sub.epoch, sub.project_id.clone(), event));
                }
            }
        }

        let mut changed = false;
        for (scope, epoch, project_id, result) in batch {
            changed |=
                self.apply_snapshot(scope, epoch, project_id.as_deref(), result, state, notifier);
        }
        changed
    }

    #[allow(clippy::too_many_arguments)]
    fn attach(
        &mut self,
        scope: Scope,
        path: &str,
        query: Option<Query>,
        project_id: Option<String>,
        store: &dyn DocumentStore,
        state: &mut SyncState,
        notifier: &dyn NotificationSink,
    ) {
        // Replacement semantics: tear down the previous handle first
        self.detach(scope, state);
        self.epochs[scope.index()] += 1;
        let epoch = self.epochs[scope.index()];

        match store.subscribe(path, query) {
            Ok(subscription) => {
                debug!("attached {} subscription (epoch {})", scope.label(), epoch);
                self.slots[scope.index()] = Some(ActiveSub {
                    epoch,
                    project_id,
                    subscription,
                });
            }
            Err(e) => {
                // Gate must not hang: treat as loaded, but empty
                error!("{} subscribe failed: {}", scope.label(), e);
                self.mark_failed(scope, state, notifier);
            }
        }
    }

    /// Apply one snapshot event. Stale events — wrong epoch, or a tasks
    /// snapshot for a project that is no longer current — are dropped.
    fn apply_snapshot(
        &self,
        scope: Scope,
        epoch: u64,
        sub_project: Option<&str>,
        result: SnapshotResult,
        state: &mut SyncState,
        notifier: &dyn NotificationSink,
    ) -> bool {
        if epoch != self.epochs[scope.index()] {
            warn!(
                "dropping stale {} snapshot (epoch {} != {})",
                scope.label(),
                epoch,
                self.epochs[scope.index()]
            );
            return false;
        }
        if scope == Scope::Tasks && sub_project != state.current_project_id.as_deref() {
            warn!("dropping tasks snapshot for inactive project");
            return false;
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("{} subscription error: {}", scope.label(), e);
                self.mark_failed(scope, state, notifier);
                return true;
            }
        };

        // Normalize exactly once, at snapshot arrival
        match scope {
            Scope::Users => {
                state.all_users = snapshot
                    .docs
                    .iter()
                    .map(|doc| (doc.id.clone(), normalize_user(doc)))
                    .collect();
                // The store copy of the signed-in user wins over the auth
                // snapshot taken at login
                if let Some(current) = &mut state.current_user
                    && let Some(fresh) = state.all_users.get(&current.uid)
                {
                    *current = fresh.clone();
                }
                state.users_loaded = true;
            }
            Scope::Projects => {
                state.all_projects = snapshot
                    .docs
                    .iter()
                    .map(|doc| (doc.id.clone(), normalize_project(doc)))
                    .collect();
                state.projects_loaded = true;
            }
            Scope::Tasks => {
                state.all_tasks = snapshot
                    .docs
                    .iter()
                    .map(|doc| (doc.id.clone(), normalize_task(doc)))
                    .collect();
                state.tasks_loaded = true;
            }
        }
        true
    }

    /// Failure semantics: readiness set so the UI does not hang, collection
    /// left empty, one user-visible notification.
    fn mark_failed(&self, scope: Scope, state: &mut SyncState, notifier: &dyn NotificationSink) {
        match scope {
            Scope::Users => {
                state.all_users.clear();
                state.users_loaded = true;
                notifier.notify(Notification::error("Error", "Could not load users."));
            }
            Scope::Projects => {
                state.all_projects.clear();
                state.projects_loaded = true;
                notifier.notify(Notification::error("Error", "Could not load projects."));
            }
            Scope::Tasks => {
                state.all_tasks.clear();
                state.tasks_loaded = true;
                notifier.notify(Notification::error(
                    "Database error",
                    "Could not load tasks for this project.",
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::remote::store::StoreError;
    use crate::remote::{MemoryStore, RecordingNotifier, Severity, Snapshot};

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(
            USERS_PATH,
            "u1",
            [("displayName".to_string(), json!("Ada"))].into_iter().collect(),
        );
        store.seed(
            PROJECTS_PATH,
            "p1",
            [
                ("name".to_string(), json!("Atlas")),
                ("accessCode".to_string(), json!("1234")),
                ("createdById".to_string(), json!("u1")),
            ]
            .into_iter()
            .collect(),
        );
        store.seed(
            &tasks_path("p1"),
            "t1",
            [("title".to_string(), json!("First task"))].into_iter().collect(),
        );
        store
    }

    #[test]
    fn initial_snapshots_set_readiness_in_any_order() {
        let store = seeded_store();
        let notifier = RecordingNotifier::new();
        let mut state = SyncState::new();
        let mut coordinator = SubscriptionCoordinator::new();

        coordinator.attach_users(&store, &mut state, &notifier);
        coordinator.attach_projects(&store, &mut state, &notifier);
        assert!(!state.project_list_ready());

        assert!(coordinator.pump(&mut state, &notifier));
        assert!(state.project_list_ready());
        assert_eq!(state.all_users.len(), 1);
        assert_eq!(state.all_projects.len(), 1);
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn attach_is_idempotent_by_replacement() {
        let store = seeded_store();
        let notifier = RecordingNotifier::new();
        let mut state = SyncState::new();
        let mut coordinator = SubscriptionCoordinator::new();

        coordinator.attach_users(&store, &mut state, &notifier);
        let first_epoch = coordinator.epoch(Scope::Users);
        coordinator.attach_users(&store, &mut state, &notifier);
        assert_eq!(coordinator.epoch(Scope::Users), first_epoch + 1);
        assert_eq!(store.subscriber_count(USERS_PATH), 1);
    }

    #[test]
    fn project_switch_resubscribes_tasks() {
        let store = seeded_store();
        store.seed(
            &tasks_path("p2"),
            "t9",
            [("title".to_string(), json!("Other project task"))]
                .into_iter()
                .collect(),
        );
        let notifier = RecordingNotifier::new();
        let mut state = SyncState::new();
        let mut coordinator = SubscriptionCoordinator::new();

        state.set_current_project(Some("p1".into()));
        coordinator.attach_tasks("p1", &store, &mut state, &notifier);
        coordinator.pump(&mut state, &notifier);
        assert_eq!(state.all_tasks.len(), 1);
        assert!(state.all_tasks.contains_key("t1"));

        // Switch: tasks must be empty and unready before the new snapshot
        state.set_current_project(Some("p2".into()));
        coordinator.attach_tasks("p2", &store, &mut state, &notifier);
        assert!(state.all_tasks.is_empty());
        assert!(!state.tasks_loaded);

        coordinator.pump(&mut state, &notifier);
        assert_eq!(state.all_tasks.len(), 1);
        assert!(state.all_tasks.contains_key("t9"));
    }

    #[test]
    fn stale_epoch_snapshot_is_dropped() {
        let store = seeded_store();
        let notifier = RecordingNotifier::new();
        let mut state = SyncState::new();
        let mut coordinator = SubscriptionCoordinator::new();

        state.set_current_project(Some("p1".into()));
        coordinator.attach_tasks("p1", &store, &mut state, &notifier);
        let old_epoch = coordinator.epoch(Scope::Tasks);

        // Logout detaches everything; a snapshot stamped with the old epoch
        // must not mutate state
        coordinator.detach_all(&mut state);
        state.clear_session();

        let stale = Ok(Snapshot {
            docs: store.docs(&tasks_path("p1")),
        });
        let changed =
            coordinator.apply_snapshot(Scope::Tasks, old_epoch, Some("p1"), stale, &mut state, &notifier);
        assert!(!changed);
        assert!(state.all_tasks.is_empty());
        assert!(!state.tasks_loaded);
    }

    #[test]
    fn tasks_snapshot_for_inactive_project_is_dropped() {
        let store = seeded_store();
        let notifier = RecordingNotifier::new();
        let mut state = SyncState::new();
        let mut coordinator = SubscriptionCoordinator::new();

        state.set_current_project(Some("p1".into()));
        coordinator.attach_tasks("p1", &store, &mut state, &notifier);
        let epoch = coordinator.epoch(Scope::Tasks);

        // Project changed underneath the queued event
        state.set_current_project(Some("p2".into()));
        let stale = Ok(Snapshot {
            docs: store.docs(&tasks_path("p1")),
        });
        let changed =
            coordinator.apply_snapshot(Scope::Tasks, epoch, Some("p1"), stale, &mut state, &notifier);
        assert!(!changed);
        assert!(state.all_tasks.is_empty());
    }

    #[test]
    fn subscribe_failure_is_loaded_but_empty() {
        let store = seeded_store();
        store.fail_subscribe(PROJECTS_PATH);
        let notifier = RecordingNotifier::new();
        let mut state = SyncState::new();
        let mut coordinator = SubscriptionCoordinator::new();

        coordinator.attach_projects(&store, &mut state, &notifier);
        assert!(state.projects_loaded);
        assert!(state.all_projects.is_empty());
        assert!(!coordinator.is_attached(Scope::Projects));

        let notifications = notifier.take();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].severity, Severity::Error);
    }

    #[test]
    fn error_event_unblocks_gate_and_notifies_once() {
        let store = seeded_store();
        let notifier = RecordingNotifier::new();
        let mut state = SyncState::new();
        let mut coordinator = SubscriptionCoordinator::new();

        state.set_current_project(Some("p1".into()));
        coordinator.attach_tasks("p1", &store, &mut state, &notifier);
        coordinator.pump(&mut state, &notifier);
        assert_eq!(state.all_tasks.len(), 1);

        store.emit_error(&tasks_path("p1"), StoreError::ConnectionLost);
        coordinator.pump(&mut state, &notifier);
        assert!(state.tasks_loaded);
        assert!(state.all_tasks.is_empty());
        assert_eq!(notifier.count(), 1);
    }

    #[test]
    fn users_snapshot_refreshes_current_user() {
        let store = seeded_store();
        let notifier = RecordingNotifier::new();
        let mut state = SyncState::new();
        let mut coordinator = SubscriptionCoordinator::new();

        state.current_user = Some(crate::model::User {
            uid: "u1".into(),
            display_name: "Stale Name".into(),
            photo_url: None,
        });
        coordinator.attach_users(&store, &mut state, &notifier);
        coordinator.pump(&mut state, &notifier);
        assert_eq!(
            state.current_user.as_ref().unwrap().display_name,
            "Ada"
        );
    }

    #[test]
    fn detach_all_leaves_flags_false_and_collections_empty() {
        let store = seeded_store();
        let notifier = RecordingNotifier::new();
        let mut state = SyncState::new();
        let mut coordinator = SubscriptionCoordinator::new();

        coordinator.attach_users(&store, &mut state, &notifier);
        coordinator.attach_projects(&store, &mut state, &notifier);
        state.set_current_project(Some("p1".into()));
        coordinator.attach_tasks("p1", &store, &mut state, &notifier);
        coordinator.pump(&mut state, &notifier);

        coordinator.detach_all(&mut state);
        assert!(!state.users_loaded && !state.projects_loaded && !state.tasks_loaded);
        assert!(state.all_users.is_empty());
        assert!(state.all_projects.is_empty());
        assert!(state.all_tasks.is_empty());
        assert_eq!(store.subscriber_count(USERS_PATH), 0);
    }
}
