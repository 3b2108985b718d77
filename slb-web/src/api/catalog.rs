//! Catalog and scan state reads
//!
//! These back the operator page, which polls them every second. Each request
//! reads a fresh snapshot of the Scan State Store, so an open enrollment
//! prompt stays visible until the handshake resolves it.

use axum::{extract::State, Json};
use serde::Serialize;
use slb_common::handshake::ScanView;
use slb_common::{Sample, ScanRecord, TagId};

use crate::error::ApiResult;
use crate::AppState;

/// An active sample plus whether the host reports its tag as present
#[derive(Debug, Serialize)]
pub struct SampleRow {
    #[serde(flatten)]
    pub sample: Sample,
    pub host_scan: bool,
}

#[derive(Debug, Serialize)]
pub struct DataResponse {
    pub data: Vec<SampleRow>,
    /// Known tag currently on the reader
    pub active_uid: Option<TagId>,
}

#[derive(Debug, Serialize)]
pub struct ScanStatusResponse {
    pub new_scan: bool,
    pub pending_uid: Option<TagId>,
}

/// GET /api/data
pub async fn data(State(state): State<AppState>) -> ApiResult<Json<DataResponse>> {
    let view = ScanView::from_records(&state.store.scan_all().await?);
    let samples = state.registry.list_active().await?;

    let data: Vec<SampleRow> = samples
        .into_iter()
        .map(|sample| SampleRow {
            host_scan: view.present.contains(&sample.uid),
            sample,
        })
        .collect();

    let active_uid = data
        .iter()
        .find(|row| row.host_scan)
        .map(|row| row.sample.uid.clone());

    Ok(Json(DataResponse { data, active_uid }))
}

/// GET /api/scan_status
pub async fn scan_status(State(state): State<AppState>) -> ApiResult<Json<ScanStatusResponse>> {
    let view = ScanView::from_records(&state.store.scan_all().await?);
    Ok(Json(ScanStatusResponse {
        new_scan: view.pending.is_some(),
        pending_uid: view.pending,
    }))
}

/// GET /api/scan_records
pub async fn scan_records(State(state): State<AppState>) -> ApiResult<Json<Vec<ScanRecord>>> {
    Ok(Json(state.store.scan_all().await?))
}

/// GET /api/archived
pub async fn archived_samples(State(state): State<AppState>) -> ApiResult<Json<Vec<Sample>>> {
    Ok(Json(state.registry.list_archived().await?))
}
