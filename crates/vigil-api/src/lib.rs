//! vigil-api — the operator-facing HTTP surface.
//!
//! Thin axum layer over the aggregator's query and webhook-dispatch
//! functions. Authentication and TLS are the embedding service's concern.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/state?subsystem=&metric=` | Whole snapshot, one subsystem, or one metric |
//! | POST | `/api/v1/state?subsystem=&metric=` | Route a webhook payload to the owning observer |

pub mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use vigil_aggregator::Aggregator;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub aggregator: Arc<Aggregator>,
}

/// Build the API router.
pub fn build_router(aggregator: Arc<Aggregator>) -> Router {
    let state = ApiState { aggregator };

    Router::new()
        .route(
            "/api/v1/state",
            get(handlers::get_state).post(handlers::post_state),
        )
        .with_state(state)
}
