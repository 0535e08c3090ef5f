///! HTTP interface: snapshot ingestion, the status query, and the image
///! query. Transport only; all behavior lives in the service layer.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use skystat_common::NewSnapshot;

use crate::error::ServiceError;
use crate::service::{DisplayRecord, RenderOutcome, SnapshotSelector, StatusService};

/// Legacy meta-refresh cadence hint carried on image responses.
const REFRESH: HeaderName = HeaderName::from_static("refresh");

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<StatusService>,
}

pub fn router(state: AppState, enable_cors: bool) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/update", post(ingest))
        .route("/status", get(status))
        .route("/image", get(image))
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Ingestion body. Explicit structure at the boundary: unknown fields are
/// rejected outright, and the pier side arrives as the controller's yes/no
/// indicator.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestRequest {
    pub instrument: String,
    pub project: String,
    /// Defaults to receipt time when the controller does not stamp one.
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
    pub avg_guide_error: f64,
    pub ccd_temperature: f64,
    pub last_image_start: DateTime<Utc>,
    pub exposure_time: f64,
    pub current_task_id: i64,
    pub right_ascension: f64,
    pub declination: f64,
    /// "yes"/"no": is the telescope on the west pier side.
    pub pier_side: String,
    pub filter: i64,
    pub site_longitude: f64,
    pub site_latitude: f64,
    pub focus: i64,
}

impl IngestRequest {
    fn into_fields(self) -> Result<NewSnapshot, ServiceError> {
        let west_pier = parse_yes_no(&self.pier_side)?;
        if !self.exposure_time.is_finite() || self.exposure_time < 0.0 {
            return Err(ServiceError::Validation(
                "exposure_time must be a non-negative number of seconds".to_string(),
            ));
        }
        Ok(NewSnapshot {
            instrument: self.instrument,
            project: self.project,
            update_time: self.update_time.unwrap_or_else(Utc::now),
            avg_guide_error: self.avg_guide_error,
            ccd_temperature: self.ccd_temperature,
            last_image_start: self.last_image_start,
            exposure_time: self.exposure_time,
            current_task_id: self.current_task_id,
            right_ascension: self.right_ascension,
            declination: self.declination,
            west_pier,
            filter_code: self.filter,
            site_longitude: self.site_longitude,
            site_latitude: self.site_latitude,
            focus: self.focus,
        })
    }
}

fn parse_yes_no(value: &str) -> Result<bool, ServiceError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" => Ok(true),
        "no" => Ok(false),
        other => Err(ServiceError::Validation(format!(
            "pier_side must be yes or no, got '{other}'"
        ))),
    }
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    success: bool,
    id: i64,
}

async fn ingest(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IngestResponse>, ServiceError> {
    let request: IngestRequest =
        serde_json::from_slice(&body).map_err(|e| ServiceError::Validation(e.to_string()))?;
    let id = state.service.ingest(request.into_fields()?).await?;
    Ok(Json(IngestResponse { success: true, id }))
}

#[derive(Debug, Deserialize)]
struct SnapshotQuery {
    id: Option<i64>,
}

async fn status(
    State(state): State<AppState>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<DisplayRecord>, ServiceError> {
    let selector = SnapshotSelector::from_query(query.id);
    let resolved = state.service.resolve(selector).await?;
    let record = state.service.format_display(&resolved, selector)?;
    Ok(Json(record))
}

async fn image(State(state): State<AppState>, Query(query): Query<SnapshotQuery>) -> Response {
    let selector = SnapshotSelector::from_query(query.id);
    let response = match state.service.render_image(selector).await {
        Ok(response) => response,
        Err(err) => return err.into_response(),
    };

    let mut headers = HeaderMap::new();
    headers.insert(REFRESH, HeaderValue::from(response.refresh_secs));

    match response.outcome {
        RenderOutcome::Image(bytes) => {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len() as u64));
            (StatusCode::OK, headers, bytes).into_response()
        }
        RenderOutcome::Failed(diagnostic) => {
            // The diagnostic reaches the operator as text, never as image
            // content.
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            (StatusCode::OK, headers, diagnostic.to_string()).into_response()
        }
    }
}
