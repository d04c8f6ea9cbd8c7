//! In-memory implementations of the external services.
//!
//! `MemoryStore` reproduces the observable behavior the engine depends on:
//! full-collection snapshots broadcast to every live subscriber on each
//! committed write, an initial snapshot on subscribe, and asynchronous write
//! settlement. Writes can be held to simulate in-flight mutations, and
//! failures can be injected per path. Used throughout the test suites and
//! suitable for demo hosts.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use super::auth::{AuthError, AuthProvider, SessionEvent};
use super::blob::BlobStore;
use super::notify::{Notification, NotificationSink};
use super::store::{
    DocumentStore, PendingWrite, Query, RawDoc, Snapshot, SnapshotResult, StoreError,
    Subscription, WriteOp,
};
use crate::model::User;

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<SnapshotResult>,
}

struct HeldWrite {
    path: String,
    op: WriteOp,
    done: mpsc::Sender<Result<(), StoreError>>,
}

#[derive(Default)]
struct StoreInner {
    collections: HashMap<String, Vec<RawDoc>>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    held: Vec<HeldWrite>,
    hold_writes: bool,
    fail_subscribe_paths: Vec<String>,
    next_write_error: Option<StoreError>,
    next_doc_id: u64,
    next_sub_id: u64,
    write_count: usize,
}

/// Cloneable handle to a shared in-memory document store
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Queue subsequent writes instead of applying them, until
    /// `release_writes` is called. Lets tests observe the in-flight window.
    pub fn hold_writes(&self, hold: bool) {
        self.lock().hold_writes = hold;
    }

    /// Apply and settle every held write, broadcasting fresh snapshots.
    pub fn release_writes(&self) {
        let held: Vec<HeldWrite> = {
            let mut inner = self.lock();
            std::mem::take(&mut inner.held)
        };
        for write in held {
            let result = {
                let mut inner = self.lock();
                inner.apply(&write.path, write.op)
            };
            match result {
                Ok(()) => {
                    let _ = write.done.send(Ok(()));
                    self.broadcast(&write.path);
                }
                Err(e) => {
                    let _ = write.done.send(Err(e));
                }
            }
        }
    }

    /// Make future subscribes to `path` fail with `Unavailable`.
    pub fn fail_subscribe(&self, path: &str) {
        self.lock().fail_subscribe_paths.push(path.to_string());
    }

    /// Make the next write fail with the given error (not applied).
    pub fn fail_next_write(&self, error: StoreError) {
        self.lock().next_write_error = Some(error);
    }

    /// Push an error event to every live subscriber of `path`.
    pub fn emit_error(&self, path: &str, error: StoreError) {
        let mut inner = self.lock();
        if let Some(subs) = inner.subscribers.get_mut(path) {
            subs.retain(|s| s.tx.send(Err(error.clone())).is_ok());
        }
    }

    /// Seed a document directly, bypassing write accounting. Broadcasts a
    /// snapshot like any committed change. Useful for legacy-field fixtures.
    pub fn seed(&self, path: &str, id: &str, fields: Map<String, Value>) {
        {
            let mut inner = self.lock();
            let docs = inner.collections.entry(path.to_string()).or_default();
            docs.retain(|d| d.id != id);
            docs.push(RawDoc {
                id: id.to_string(),
                fields,
            });
        }
        self.broadcast(path);
    }

    /// Current documents under `path`
    pub fn docs(&self, path: &str) -> Vec<RawDoc> {
        self.lock().collections.get(path).cloned().unwrap_or_default()
    }

    /// Total number of write calls issued against this store
    pub fn write_count(&self) -> usize {
        self.lock().write_count
    }

    /// Number of live subscriptions on `path`. Cancellation removes
    /// entries eagerly, so this is exact.
    pub fn subscriber_count(&self, path: &str) -> usize {
        self.lock()
            .subscribers
            .get(path)
            .map_or(0, |subs| subs.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn broadcast(&self, path: &str) {
        let mut inner = self.lock();
        let snapshot = Snapshot {
            docs: inner.collections.get(path).cloned().unwrap_or_default(),
        };
        if let Some(subs) = inner.subscribers.get_mut(path) {
            subs.retain(|s| s.tx.send(Ok(snapshot.clone())).is_ok());
        }
    }
}

impl StoreInner {
    fn apply(&mut self, path: &str, op: WriteOp) -> Result<(), StoreError> {
        let docs = self.collections.entry(path.to_string()).or_default();
        match op {
            WriteOp::Insert { fields } => {
                self.next_doc_id += 1;
                docs.push(RawDoc {
                    id: format!("doc{}", self.next_doc_id),
                    fields,
                });
                Ok(())
            }
            WriteOp::Set { id, fields } => {
                docs.retain(|d| d.id != id);
                docs.push(RawDoc { id, fields });
                Ok(())
            }
            WriteOp::Merge { id, fields } => {
                let doc = docs
                    .iter_mut()
                    .find(|d| d.id == id)
                    .ok_or_else(|| StoreError::WriteRejected(format!("no document {}", id)))?;
                for (key, value) in fields {
                    doc.fields.insert(key, value);
                }
                Ok(())
            }
            WriteOp::Delete { id } => {
                docs.retain(|d| d.id != id);
                Ok(())
            }
        }
    }
}

impl DocumentStore for MemoryStore {
    fn subscribe(&self, path: &str, _query: Option<Query>) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::channel();
        let sub_id = {
            let mut inner = self.lock();
            if inner.fail_subscribe_paths.iter().any(|p| p == path) {
                return Err(StoreError::Unavailable(path.to_string()));
            }
            inner.next_sub_id += 1;
            let sub_id = inner.next_sub_id;
            // Initial snapshot arrives like any other event
            let snapshot = Snapshot {
                docs: inner.collections.get(path).cloned().unwrap_or_default(),
            };
            let _ = tx.send(Ok(snapshot));
            inner
                .subscribers
                .entry(path.to_string())
                .or_default()
                .push(Subscriber { id: sub_id, tx });
            sub_id
        };

        let store = self.inner.clone();
        let cancel_path = path.to_string();
        let canceler = Box::new(move || {
            let mut inner = store.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(subs) = inner.subscribers.get_mut(&cancel_path) {
                subs.retain(|s| s.id != sub_id);
            }
        });
        Ok(Subscription::new(rx, Some(canceler)))
    }

    fn write(&self, path: &str, op: WriteOp) -> PendingWrite {
        let mut inner = self.lock();
        inner.write_count += 1;

        if let Some(error) = inner.next_write_error.take() {
            return PendingWrite::settled(Err(error));
        }

        if inner.hold_writes {
            let (done, rx) = mpsc::channel();
            inner.held.push(HeldWrite {
                path: path.to_string(),
                op,
                done,
            });
            return PendingWrite::new(rx);
        }

        let result = inner.apply(path, op);
        drop(inner);
        if result.is_ok() {
            self.broadcast(path);
        }
        PendingWrite::settled(result)
    }
}

// ---------------------------------------------------------------------------
// MemoryAuth
// ---------------------------------------------------------------------------

struct Account {
    password: String,
    user: User,
}

#[derive(Default)]
struct AuthInner {
    accounts: HashMap<String, Account>,
    current: Option<User>,
    session_txs: Vec<mpsc::Sender<SessionEvent>>,
    next_uid: u64,
}

/// Cloneable handle to a shared in-memory auth provider
#[derive(Clone, Default)]
pub struct MemoryAuth {
    inner: Arc<Mutex<AuthInner>>,
}

impl MemoryAuth {
    pub fn new() -> MemoryAuth {
        MemoryAuth::default()
    }

    /// Currently signed-in user, if any
    pub fn current_user(&self) -> Option<User> {
        self.lock().current.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AuthInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fire_session_event(&self, event: SessionEvent) {
        let mut inner = self.lock();
        inner
            .session_txs
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl AuthProvider for MemoryAuth {
    fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = {
            let inner = self.lock();
            let account = inner
                .accounts
                .get(email)
                .ok_or_else(|| AuthError::new("auth/user-not-found", "no such user"))?;
            if account.password != password {
                return Err(AuthError::new("auth/wrong-password", "bad password"));
            }
            account.user.clone()
        };
        self.lock().current = Some(user.clone());
        self.fire_session_event(Some(user.clone()));
        Ok(user)
    }

    fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        if !email.contains('@') {
            return Err(AuthError::new("auth/invalid-email", "malformed email"));
        }
        if password.len() < 6 {
            return Err(AuthError::new("auth/weak-password", "password too short"));
        }
        let user = {
            let mut inner = self.lock();
            if inner.accounts.contains_key(email) {
                return Err(AuthError::new("auth/email-already-in-use", "duplicate email"));
            }
            inner.next_uid += 1;
            let user = User {
                uid: format!("uid-{:04}", inner.next_uid),
                display_name: String::new(),
                photo_url: None,
            };
            inner.accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                },
            );
            inner.current = Some(user.clone());
            user
        };
        self.fire_session_event(Some(user.clone()));
        Ok(user)
    }

    fn update_profile(
        &self,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<(), AuthError> {
        let mut inner = self.lock();
        let current = inner
            .current
            .as_mut()
            .ok_or_else(|| AuthError::new("auth/no-current-user", "not signed in"))?;
        if let Some(name) = display_name {
            current.display_name = name.to_string();
        }
        if let Some(url) = photo_url {
            current.photo_url = Some(url.to_string());
        }
        let updated = current.clone();
        for account in inner.accounts.values_mut() {
            if account.user.uid == updated.uid {
                account.user = updated.clone();
            }
        }
        Ok(())
    }

    fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let inner = self.lock();
        if inner.accounts.contains_key(email) {
            Ok(())
        } else {
            Err(AuthError::new("auth/user-not-found", "no such user"))
        }
    }

    fn sign_out(&self) {
        self.lock().current = None;
        self.fire_session_event(None);
    }

    fn session_events(&self) -> mpsc::Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.lock();
        // At-least-once at startup: deliver the current session state
        let _ = tx.send(inner.current.clone());
        inner.session_txs.push(tx);
        rx
    }
}

// ---------------------------------------------------------------------------
// MemoryBlob
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BlobInner {
    uploads: Vec<(String, Vec<u8>)>,
    fail_next: bool,
}

/// In-memory blob storage; URLs are `memory://` + the upload path
#[derive(Clone, Default)]
pub struct MemoryBlob {
    inner: Arc<Mutex<BlobInner>>,
}

impl MemoryBlob {
    pub fn new() -> MemoryBlob {
        MemoryBlob::default()
    }

    /// Make the next upload fail with `Unavailable`.
    pub fn fail_next_upload(&self) {
        self.lock().fail_next = true;
    }

    /// Paths of every stored upload, oldest first
    pub fn upload_paths(&self) -> Vec<String> {
        self.lock().uploads.iter().map(|(p, _)| p.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BlobInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlobStore for MemoryBlob {
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let mut inner = self.lock();
        if inner.fail_next {
            inner.fail_next = false;
            return Err(StoreError::Unavailable("blob storage".into()));
        }
        inner.uploads.push((path.to_string(), bytes.to_vec()));
        Ok(format!("memory://{}", path))
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notification sink that records everything it is handed
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    log: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> RecordingNotifier {
        RecordingNotifier::default()
    }

    /// Drain and return all recorded notifications, oldest first
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.log.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn count(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
