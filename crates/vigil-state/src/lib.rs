//! vigil-state — durable storage for the system snapshot.
//!
//! Backed by [redb](https://docs.rs/redb). The store holds exactly one
//! record: the JSON-encoded [`vigil_core::SystemSnapshot`] under a fixed
//! key, overwritten in place on every persisted update. A restart reads the
//! record back byte-for-byte into memory.
//!
//! The `SnapshotStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks. An in-memory
//! backend is available for tests.

pub mod error;
pub mod store;

pub use error::{StateError, StateResult};
pub use store::SnapshotStore;
