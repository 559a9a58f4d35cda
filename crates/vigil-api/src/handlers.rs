//! State query and webhook handlers.
//!
//! Lookup failures map to 404, payload rejections to 400 with the probe's
//! own validation message — the engine never swallows the real cause.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;
use tracing::{debug, warn};

use vigil_aggregator::StateView;
use vigil_core::{DispatchError, ObserverError};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Query string for both state routes.
#[derive(serde::Deserialize)]
pub struct StateQuery {
    pub subsystem: Option<String>,
    pub metric: Option<String>,
}

/// GET /api/v1/state
pub async fn get_state(
    State(state): State<ApiState>,
    Query(query): Query<StateQuery>,
) -> impl IntoResponse {
    if query.subsystem.is_none() && query.metric.is_some() {
        return error_response(
            "metric filter requires a subsystem",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }

    match state
        .aggregator
        .get_state(query.subsystem.as_deref(), query.metric.as_deref())
    {
        Ok(StateView::Full(snapshot)) => ApiResponse::ok(snapshot.subsystems()).into_response(),
        Ok(StateView::Subsystem(metrics)) => ApiResponse::ok(metrics).into_response(),
        Ok(StateView::Metric(value)) => ApiResponse::ok(value).into_response(),
        Err(e) => {
            debug!(error = %e, "state query failed");
            error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response()
        }
    }
}

/// POST /api/v1/state
pub async fn post_state(
    State(state): State<ApiState>,
    Query(query): Query<StateQuery>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let (Some(subsystem), Some(metric)) = (query.subsystem.as_deref(), query.metric.as_deref())
    else {
        return error_response(
            "subsystem and metric are required",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    };

    match state
        .aggregator
        .dispatch_webhook(subsystem, metric, payload)
        .await
    {
        Ok(()) => {
            debug!(%subsystem, %metric, "webhook dispatched");
            ApiResponse::ok("accepted").into_response()
        }
        Err(DispatchError::Query(e)) => {
            debug!(%subsystem, %metric, error = %e, "webhook target not found");
            error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response()
        }
        Err(DispatchError::Observer(e @ ObserverError::Validation(_)))
        | Err(DispatchError::Observer(e @ ObserverError::Unsupported(_))) => {
            warn!(%subsystem, %metric, error = %e, "webhook payload rejected");
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(DispatchError::Observer(e)) => {
            warn!(%subsystem, %metric, error = %e, "webhook processing failed");
            error_response(&e.to_string(), StatusCode::BAD_GATEWAY).into_response()
        }
    }
}
