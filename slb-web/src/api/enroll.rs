//! Enrollment and archival (JSON and browser variants)

use axum::{
    extract::{Path, State},
    response::Redirect,
    Json,
};
use serde::{Deserialize, Serialize};
use slb_common::{Sample, SampleMetadata, TagId};

use super::parse_uid;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub uid: String,
    pub metadata: SampleMetadata,
}

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub status: String,
    pub uid: TagId,
    pub sample: Sample,
}

/// POST /api/enroll
pub async fn enroll_json(
    State(state): State<AppState>,
    Json(request): Json<EnrollRequest>,
) -> ApiResult<Json<EnrollResponse>> {
    let uid = parse_uid(&request.uid)?;
    let sample = state.consumer.submit_enrollment(&uid, request.metadata).await?;
    Ok(Json(EnrollResponse {
        status: "enrolled".to_string(),
        uid,
        sample,
    }))
}

/// POST /api/archive/:uid
pub async fn archive_json(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Json<Sample>> {
    let uid = parse_uid(&uid)?;
    Ok(Json(state.consumer.archive(&uid).await?))
}

/// GET /archive/:uid - archive from the operator page, then back to it
pub async fn archive_redirect(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Redirect> {
    let uid = parse_uid(&uid)?;
    state.consumer.archive(&uid).await?;
    Ok(Redirect::to("/"))
}
