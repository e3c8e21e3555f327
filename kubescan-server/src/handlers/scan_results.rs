use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use kubescan_core::ScanResult;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// Body sent by scan workers. `report` is kept as raw text so the stored
/// copy matches what the worker produced byte for byte.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultPayload {
    pub image_id: String,
    pub report: Box<RawValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultResponse {
    pub image_id: String,
    pub report: Box<RawValue>,
}

impl TryFrom<ScanResult> for ScanResultResponse {
    type Error = AppError;

    fn try_from(result: ScanResult) -> AppResult<Self> {
        let report = RawValue::from_string(result.report).map_err(|e| {
            tracing::error!(image_id = %result.image_id, error = %e, "stored report is not JSON");
            AppError::internal("Internal Server Error")
        })?;
        Ok(Self {
            image_id: result.image_id,
            report,
        })
    }
}

/// `GET /scan-results`
pub async fn list_scan_results_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ScanResultResponse>>> {
    let results = state.scans().list().await?;
    let body = results
        .into_iter()
        .map(ScanResultResponse::try_from)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(body))
}

/// `PUT /scan-results`
pub async fn put_scan_result_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<ScanResultResponse>> {
    let payload: ScanResultPayload = serde_json::from_slice(&body)?;
    if payload.image_id.is_empty() {
        return Err(AppError::bad_request("imageId must not be empty"));
    }

    let stored = state
        .scans()
        .submit_report(&payload.image_id, payload.report.get())
        .await?;
    Ok(Json(stored.try_into()?))
}

/// `GET /scan-results/{*image_id}`
pub async fn get_scan_result_handler(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> AppResult<Json<ScanResultResponse>> {
    let result = state.scans().get(&image_id).await?;
    Ok(Json(result.try_into()?))
}

/// `DELETE /scan-results/{*image_id}`
pub async fn delete_scan_result_handler(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> AppResult<StatusCode> {
    state.scans().delete(&image_id).await?;
    tracing::info!(image_id = %image_id, "scan result deleted");
    Ok(StatusCode::NO_CONTENT)
}
