//! vigil-core — the shared model for the vigil monitoring engine.
//!
//! A *metric* is one independently observed unit of state, addressed by a
//! `(subsystem, metric)` pair. Concrete probes implement [`MetricObserver`]
//! on top of a [`MetricEmitter`], which carries their emissions into the
//! aggregator's fan-in channel. The aggregator merges emissions into an
//! immutable-per-version [`SystemSnapshot`].
//!
//! # Architecture
//!
//! ```text
//! external source
//!   └── probe (MetricObserver)
//!         ├── fetch() / on_webhook()
//!         └── MetricEmitter::emit(data) ──► mpsc ──► aggregator
//! ```
//!
//! Alerts flow through the [`AlertSink`] channel, which is fire-and-forget:
//! implementations must swallow their own delivery failures.

pub mod alert;
pub mod error;
pub mod observer;
pub mod types;

pub use alert::{AlertSink, LogAlertSink};
pub use error::{DispatchError, ObserverError, QueryError, RegisterError};
pub use observer::{MetricEmitter, MetricObserver};
pub use types::{epoch_secs, MetricUpdate, MetricValue, SystemSnapshot};
