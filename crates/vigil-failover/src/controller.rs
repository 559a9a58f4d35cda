//! The pool failover algorithm.
//!
//! Pure functions over configuration, the current cycle's error set, and
//! the previous cycle's state. No I/O here: the probe performs the swap and
//! alert side effects based on what these functions return.

use serde::{Deserialize, Serialize};

/// Static configuration of one pool. Instance order is the priority order
/// used for preferred-instance selection; it is a total order fixed by
/// configuration, so failover choice is deterministic for a given error set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolSpec {
    pub pool: String,
    pub instances: Vec<String>,
}

/// One health-check error reported for an instance this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceError {
    pub pool: String,
    pub instance: String,
    pub message: String,
}

/// Per-instance state, recomputed every cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolInstanceState {
    pub instance: String,
    pub is_down: bool,
    /// Unix timestamp of the down-transition; carried forward while the
    /// instance stays down, cleared on recovery.
    pub down_since: Option<u64>,
    pub errors: Vec<String>,
}

/// State of one pool for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolState {
    pub pool: String,
    pub instances: Vec<PoolInstanceState>,
}

impl PoolState {
    /// Whether no instance in the pool is up.
    pub fn fully_down(&self) -> bool {
        self.instances.iter().all(|i| i.is_down)
    }

    /// Look up one instance's state by name.
    pub fn instance(&self, name: &str) -> Option<&PoolInstanceState> {
        self.instances.iter().find(|i| i.instance == name)
    }
}

/// Build this cycle's pool states from the raw error set.
///
/// Every configured instance appears exactly once per pool, in priority
/// order. `down_since` bookkeeping runs every cycle regardless of alerting:
/// carried forward while the up/down status is unchanged, stamped `now` on a
/// down-transition, cleared on an up-transition. An instance with no
/// previous state that starts down is stamped `now`.
pub fn build_pool_states(
    specs: &[PoolSpec],
    errors: &[InstanceError],
    prev: Option<&[PoolState]>,
    now: u64,
) -> Vec<PoolState> {
    specs
        .iter()
        .map(|spec| {
            let prev_pool = prev.and_then(|p| p.iter().find(|s| s.pool == spec.pool));
            let instances = spec
                .instances
                .iter()
                .map(|name| {
                    let errors: Vec<String> = errors
                        .iter()
                        .filter(|e| e.pool == spec.pool && &e.instance == name)
                        .map(|e| e.message.clone())
                        .collect();
                    let is_down = !errors.is_empty();

                    let prev_instance = prev_pool.and_then(|p| p.instance(name));
                    let was_down = prev_instance.is_some_and(|i| i.is_down);
                    let down_since = if is_down == was_down {
                        prev_instance.and_then(|i| i.down_since)
                    } else if is_down {
                        Some(now)
                    } else {
                        None
                    };

                    PoolInstanceState {
                        instance: name.clone(),
                        is_down,
                        down_since,
                        errors,
                    }
                })
                .collect();

            PoolState {
                pool: spec.pool.clone(),
                instances,
            }
        })
        .collect()
}

/// The highest-priority up instance, i.e. the first not-down instance in
/// configuration order. `None` means the pool is fully down.
pub fn preferred_instance(pool: &PoolState) -> Option<&PoolInstanceState> {
    pool.instances.iter().find(|i| !i.is_down)
}

/// Whether the fully-down condition is a fresh transition worth alerting.
///
/// True when the previous cycle had at least one up instance, or when there
/// was no previous cycle at all (a pool that comes up fully down alerts
/// once).
pub fn fully_down_transition(prev: Option<&PoolState>) -> bool {
    prev.is_none_or(|p| p.instances.iter().any(|i| !i.is_down))
}

/// Alert lines for per-instance up↔down transitions since the previous
/// cycle. An instance with no previous state counts as previously up.
pub fn instance_transitions(pool: &PoolState, prev: Option<&PoolState>) -> Vec<String> {
    pool.instances
        .iter()
        .filter_map(|instance| {
            let was_down = prev
                .and_then(|p| p.instance(&instance.instance))
                .is_some_and(|i| i.is_down);
            if instance.is_down == was_down {
                return None;
            }
            Some(if instance.is_down {
                format!(
                    "node '{}/{}' is down: {}",
                    pool.pool,
                    instance.instance,
                    instance.errors.join("; ")
                )
            } else {
                format!("node '{}/{}' is back up", pool.pool, instance.instance)
            })
        })
        .collect()
}

/// Compact one-line summary of current pool health, appended to alerts.
pub fn summary(states: &[PoolState]) -> String {
    let pools: Vec<String> = states
        .iter()
        .map(|pool| {
            let up = pool.instances.iter().filter(|i| !i.is_down).count();
            format!("{}: {}/{} up", pool.pool, up, pool.instances.len())
        })
        .collect();
    format!("current state: {}", pools.join(", "))
}
