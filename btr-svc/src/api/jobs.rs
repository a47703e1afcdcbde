//! Job submission and push-delivery endpoints
//!
//! `POST /process` enqueues diff jobs, `POST /worker` receives push-delivered
//! jobs and reports the outcome per the configured [`FailurePolicy`].

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use btr_common::config::FailurePolicy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::queue::{JobMessage, PushEnvelope};
use crate::worker::{Delivery, JobOutcome};
use crate::{ApiError, ApiResult, AppState};

/// One drawing pair to compare
#[derive(Debug, Clone, Deserialize)]
pub struct PairSpec {
    /// Job id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// URI of version A
    pub a: String,
    /// URI of version B
    pub b: String,
}

/// POST /process request body
#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub pairs: Vec<PairSpec>,
}

/// POST /process response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub enqueued: usize,
    pub job_ids: Vec<String>,
}

/// POST /process
///
/// Marks each job started, then publishes it. A job that cannot be published
/// is marked failed and the request fails.
pub async fn process_pairs(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<Json<ProcessResponse>> {
    if request.pairs.is_empty() {
        return Err(ApiError::BadRequest("No pairs provided".to_string()));
    }

    let mut job_ids = Vec::with_capacity(request.pairs.len());
    for pair in request.pairs {
        let job_id = match pair.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };

        // Started before publish so a fast consumer cannot end it first
        state.metrics.mark_start(&job_id);

        let message = JobMessage::new(job_id.clone(), pair.a, pair.b);
        if let Err(e) = state.publisher.publish(message).await {
            state.metrics.mark_end(&job_id, false, None);
            error!(job_id = %job_id, error = %e, "Failed to enqueue job");
            return Err(ApiError::Internal(format!("Failed to enqueue job {}: {}", job_id, e)));
        }

        info!(job_id = %job_id, "Job enqueued");
        job_ids.push(job_id);
    }

    Ok(Json(ProcessResponse {
        enqueued: job_ids.len(),
        job_ids,
    }))
}

fn delivery_status(delivery: Delivery) -> StatusCode {
    match delivery {
        Delivery::Ack => StatusCode::OK,
        Delivery::Redeliver => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn policy_delivery(policy: FailurePolicy) -> Delivery {
    match policy {
        FailurePolicy::Acknowledge => Delivery::Ack,
        FailurePolicy::Redeliver => Delivery::Redeliver,
    }
}

fn failure_response(delivery: Delivery, detail: String) -> Response {
    (
        delivery_status(delivery),
        Json(json!({ "status": "error", "detail": detail })),
    )
        .into_response()
}

/// POST /worker
///
/// Accepts `{"message": {"data": "<base64 JSON job>"}}`. Successful jobs get
/// 200; failures, including bodies that are not an envelope at all, get 200 or
/// 500 depending on the failure policy.
pub async fn push_worker(State(state): State<AppState>, body: Bytes) -> Response {
    let policy = state.failure_policy;

    // Parsed here rather than by an extractor so malformed bodies follow the policy
    let payload = match serde_json::from_slice::<PushEnvelope>(&body)
        .map_err(btr_common::Error::from)
        .and_then(|envelope| envelope.payload())
    {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Undecodable push envelope");
            return failure_response(policy_delivery(policy), e.to_string());
        }
    };

    let message = match JobMessage::from_payload(&payload) {
        Ok(message) => message,
        Err(e) => {
            let job_id = payload
                .get("job_id")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            state.processor.record_undecodable(job_id, &e.to_string());
            return failure_response(policy_delivery(policy), e.to_string());
        }
    };

    let outcome = state.processor.process(&message).await;
    let delivery = outcome.delivery(policy);
    match outcome {
        JobOutcome::Completed { job_id, .. } => {
            (StatusCode::OK, Json(json!({ "status": "ok", "job_id": job_id }))).into_response()
        }
        JobOutcome::Failed { error, .. } => failure_response(delivery, error),
    }
}

/// Build job routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/process", post(process_pairs))
        .route("/worker", post(push_worker))
}
