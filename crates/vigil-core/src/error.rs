//! Error types shared across the monitoring engine.

use thiserror::Error;

/// Errors raised by a concrete probe.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// The probe does not implement this operation (e.g. a push-only probe
    /// has no `fetch`).
    #[error("'{0}' is not supported by this observer")]
    Unsupported(&'static str),

    /// A pushed payload failed validation. The message is surfaced to the
    /// webhook caller unmodified.
    #[error("invalid payload: {0}")]
    Validation(String),

    /// The external data source failed or timed out.
    #[error("upstream error: {0}")]
    Upstream(String),
}

/// Errors raised by state queries and observer lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("subsystem not found: '{0}'")]
    SubsystemNotFound(String),

    #[error("metric not found: '{subsystem}/{metric}'")]
    MetricNotFound { subsystem: String, metric: String },

    #[error("no observers for subsystem: '{0}'")]
    NoObservers(String),

    #[error("observer not found: '{subsystem}/{metric}'")]
    ObserverNotFound { subsystem: String, metric: String },
}

/// Fatal configuration error raised during observer registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("observer for metric '{subsystem}/{metric}' already exists")]
    Duplicate { subsystem: String, metric: String },
}

/// Errors surfaced by webhook dispatch: either the lookup failed or the
/// probe rejected the payload.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Observer(#[from] ObserverError),
}
