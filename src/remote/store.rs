use std::sync::mpsc;

use serde_json::{Map, Value};

/// Collection paths used by the engine. These are a layout convention, not a
/// contract the remote store enforces.
pub const USERS_PATH: &str = "users";
pub const PROJECTS_PATH: &str = "projects";

/// Path of a project's task subcollection
pub fn tasks_path(project_id: &str) -> String {
    format!("{}/{}/tasks", PROJECTS_PATH, project_id)
}

/// Error reported by the remote document store
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("write rejected: {0}")]
    WriteRejected(String),
    #[error("connection to the remote store was lost")]
    ConnectionLost,
}

/// A raw document as delivered by the store: id plus untyped fields.
/// Field names may use legacy aliases; normalization resolves them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDoc {
    pub id: String,
    pub fields: Map<String, Value>,
}

/// A full-collection read. Every change to the collection produces a fresh
/// snapshot superseding any prior one for the same subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub docs: Vec<RawDoc>,
}

pub type SnapshotResult = Result<Snapshot, StoreError>;

/// Requested server-side ordering. Advisory: the engine sorts client-side
/// anyway, so stores may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub order_by: Option<(String, SortDirection)>,
}

impl Query {
    pub fn order_by(field: &str, direction: SortDirection) -> Query {
        Query {
            order_by: Some((field.to_string(), direction)),
        }
    }
}

/// A mutation against one collection
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Add a document; the store assigns the id
    Insert { fields: Map<String, Value> },
    /// Create or fully replace the document at a caller-chosen id
    Set { id: String, fields: Map<String, Value> },
    /// Partial-field merge into an existing document
    Merge { id: String, fields: Map<String, Value> },
    Delete { id: String },
}

/// A live subscription to one collection. Snapshot events arrive on
/// `events`; dropping the subscription cancels it.
pub struct Subscription {
    pub events: mpsc::Receiver<SnapshotResult>,
    canceler: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        events: mpsc::Receiver<SnapshotResult>,
        canceler: Option<Box<dyn FnOnce() + Send>>,
    ) -> Subscription {
        Subscription { events, canceler }
    }

    /// Non-blocking poll for queued snapshot events, oldest first.
    pub fn poll(&self) -> Vec<SnapshotResult> {
        let mut events = Vec::new();
        while let Ok(evt) = self.events.try_recv() {
            events.push(evt);
        }
        events
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.canceler.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Handle for a write in flight. The caller polls it each tick; the write
/// settles exactly once.
#[derive(Debug)]
pub struct PendingWrite {
    rx: mpsc::Receiver<Result<(), StoreError>>,
}

impl PendingWrite {
    pub fn new(rx: mpsc::Receiver<Result<(), StoreError>>) -> PendingWrite {
        PendingWrite { rx }
    }

    /// An already-settled write (for stores that apply synchronously)
    pub fn settled(result: Result<(), StoreError>) -> PendingWrite {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(result);
        PendingWrite { rx }
    }

    /// Non-blocking poll. Returns `Some` exactly once, when the write has
    /// settled. A store that went away without answering settles as
    /// `ConnectionLost`.
    pub fn poll(&self) -> Option<Result<(), StoreError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(StoreError::ConnectionLost)),
        }
    }
}

/// The remote real-time document store. Full-collection snapshots are
/// delivered at least once per change; ordering across distinct collections
/// is not guaranteed.
pub trait DocumentStore {
    fn subscribe(&self, path: &str, query: Option<Query>) -> Result<Subscription, StoreError>;

    fn write(&self, path: &str, op: WriteOp) -> PendingWrite;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_path_nests_under_project() {
        assert_eq!(tasks_path("p1"), "projects/p1/tasks");
    }

    #[test]
    fn query_captures_field_and_direction() {
        let query = Query::order_by("createdAt", SortDirection::Ascending);
        assert_eq!(
            query.order_by,
            Some(("createdAt".to_string(), SortDirection::Ascending))
        );
        assert_eq!(Query::default().order_by, None);
    }

    #[test]
    fn settled_write_polls_once() {
        let pending = PendingWrite::settled(Ok(()));
        assert!(matches!(pending.poll(), Some(Ok(()))));
    }

    #[test]
    fn dropped_store_settles_as_connection_lost() {
        let (tx, rx) = mpsc::channel::<Result<(), StoreError>>();
        drop(tx);
        let pending = PendingWrite::new(rx);
        assert!(matches!(pending.poll(), Some(Err(StoreError::ConnectionLost))));
    }

    #[test]
    fn subscription_drop_runs_canceler() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let canceled = Arc::new(AtomicBool::new(false));
        let flag = canceled.clone();
        let (_tx, rx) = mpsc::channel();
        let sub = Subscription::new(rx, Some(Box::new(move || flag.store(true, Ordering::SeqCst))));
        drop(sub);
        assert!(canceled.load(Ordering::SeqCst));
    }
}
