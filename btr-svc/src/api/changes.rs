//! Stored change report lookup

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use btr_common::blob::results_uri;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::{ApiError, ApiResult, AppState};

/// Query parameters for change lookup
#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    /// Job / drawing id the report was stored under
    pub drawing_id: String,
}

/// GET /changes?drawing_id=ID
///
/// Returns the stored change report for a drawing. Ids that do not map to a
/// valid blob path answer 400; other storage failures answer 500.
pub async fn get_changes(
    State(state): State<AppState>,
    Query(query): Query<ChangesQuery>,
) -> ApiResult<Json<Value>> {
    if query.drawing_id.trim().is_empty() {
        return Err(ApiError::BadRequest("drawing_id must not be empty".to_string()));
    }

    let uri = results_uri(&state.bucket, &query.drawing_id);
    match state.blobs.read(&uri).await {
        Ok(report) => Ok(Json(report)),
        Err(btr_common::Error::NotFound(_)) => Err(ApiError::NotFound(format!(
            "Results not found for drawing_id={}",
            query.drawing_id
        ))),
        Err(e @ btr_common::Error::InvalidInput(_)) => {
            warn!(drawing_id = %query.drawing_id, error = %e, "Rejected results lookup");
            Err(ApiError::Common(e))
        }
        Err(e) => {
            error!(drawing_id = %query.drawing_id, error = %e, "Error reading results");
            Err(ApiError::Common(e))
        }
    }
}

pub fn changes_routes() -> Router<AppState> {
    Router::new().route("/changes", get(get_changes))
}
