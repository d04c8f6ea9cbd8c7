//! Client-side synchronization engine for a shared kanban board.
//!
//! The remote document store pushes full-collection snapshots; this crate
//! turns them into one canonical in-memory state, routes every user
//! mutation through validation and a single-in-flight write guard, and
//! exposes pure read models for the board, dashboard, and profile views.
//! State is never mutated optimistically: writes go to the store, and the
//! next confirmed snapshot brings the state up to date.
//!
//! Hosts construct an [`engine::Engine`] over implementations of the
//! service traits in [`remote`], then drive it with a cooperative
//! single-threaded loop around [`engine::Engine::pump`].

pub mod board;
pub mod engine;
pub mod model;
pub mod normalize;
pub mod remote;
pub mod state;
pub mod stats;
pub mod sync;

pub use engine::Engine;
pub use state::SyncState;
