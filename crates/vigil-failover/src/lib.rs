//! vigil-failover — node-pool health and automatic failover.
//!
//! A *pool* is a set of redundant backend instances serving one logical
//! role, one of which is active. Each probe cycle collects per-instance
//! errors from the external health check, recomputes every instance's
//! up/down state, and:
//!
//! - swaps the active connection to the highest-priority up instance when
//!   it differs from the current one,
//! - detects per-instance up↔down transitions and stamps `down_since`,
//! - sends at most one batched alert per cycle, and only on transitions
//!   (edge-triggered — a persisting outage does not re-alert every cycle).
//!
//! State bookkeeping is level-triggered, alerting is edge-triggered; the
//! two deliberately follow different rules.
//!
//! The algorithm itself ([`controller`]) is pure and deterministic: priority
//! is the static configuration order of instances, never load or arrival
//! order. [`probe::PoolHealthProbe`] wires it to a [`probe::PoolClient`]
//! collaborator and to the aggregator. [`http`] provides the HTTP
//! instance check used by the daemon's pool client.

pub mod controller;
pub mod http;
pub mod probe;

pub use controller::{
    build_pool_states, preferred_instance, InstanceError, PoolInstanceState, PoolSpec, PoolState,
};
pub use http::{http_check, HttpPoolClient, HttpPoolSpec};
pub use probe::{PoolClient, PoolHealthProbe};
