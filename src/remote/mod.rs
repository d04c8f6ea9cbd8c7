//! Capability traits for the external services the engine consumes, plus
//! in-memory implementations for tests and demo hosts.

pub mod auth;
pub mod blob;
pub mod memory;
pub mod notify;
pub mod store;

pub use auth::{AuthError, AuthProvider, SessionEvent};
pub use blob::BlobStore;
pub use memory::{MemoryAuth, MemoryBlob, MemoryStore, RecordingNotifier};
pub use notify::{Notification, NotificationSink, Severity};
pub use store::{
    DocumentStore, PendingWrite, Query, RawDoc, Snapshot, SnapshotResult, SortDirection,
    StoreError, Subscription, WriteOp,
};
