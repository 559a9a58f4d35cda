//! vigil-aggregator — the central monitoring service.
//!
//! The [`Aggregator`] registers observers, merges their emissions into one
//! versioned [`vigil_core::SystemSnapshot`], answers hierarchical state
//! queries, routes webhooks to the owning observer, and persists the
//! snapshot with debouncing and change detection.
//!
//! # Architecture
//!
//! ```text
//! probes ──emit──► mpsc ──► Aggregator::run
//!                             ├── apply update (replace one metric, swap Arc)
//!                             └── debounce timer ──► diff vs last persisted
//!                                                      └── SnapshotStore::save
//! ```
//!
//! Failures inside the update and persistence pipeline are caught, logged,
//! and alerted — they never propagate back into the scheduler. Query and
//! webhook-dispatch failures propagate to the caller, which turns them into
//! protocol-level responses.
//!
//! [`runner::run_probe`] is the periodic driver for pull probes: one
//! sequential loop per probe, fetch bounded by a timeout, never two
//! overlapping cycles of the same probe.

pub mod aggregator;
pub mod runner;

pub use aggregator::{Aggregator, StateView};
pub use runner::run_probe;
