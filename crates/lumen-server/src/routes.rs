//! HTTP routes: sync job control, formation catalog, export.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use lumen_core::job::SyncMode;
use lumen_export::{CoordinateSystem, ExportFormat, ExportOptions, export_formation};
use lumen_store::ListFormationsOptions;
use lumen_sync::StartSyncOptions;

use crate::context::AppContext;
use crate::errors::ApiError;

/// Build the application router.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sync", post(start_sync))
        .route("/api/sync/jobs", get(recent_jobs))
        .route("/api/sync/jobs/{id}", get(job_status))
        .route("/api/sync/jobs/{id}/cancel", post(cancel_job))
        .route("/api/formations", get(list_formations))
        .route("/api/formations/{id}", get(get_formation))
        .route("/api/formations/{id}/export", get(export))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSyncRequest {
    sync_type: String,
    #[serde(default)]
    created_by: Option<String>,
}

/// `POST /api/sync` — fire-and-forget start; returns the job id to poll.
async fn start_sync(
    State(ctx): State<AppContext>,
    Json(body): Json<StartSyncRequest>,
) -> Result<Response, ApiError> {
    let mode = SyncMode::parse(&body.sync_type)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown syncType: {}", body.sync_type)))?;

    let job_id = ctx.sync.start_sync(&StartSyncOptions {
        mode,
        created_by: body.created_by.unwrap_or_else(|| "system".into()),
    })?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "syncJobId": job_id }))).into_response())
}

/// `GET /api/sync/jobs/{id}` — always a well-formed snapshot.
async fn job_status(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<lumen_core::job::SyncJob>, ApiError> {
    let job = ctx
        .sync
        .get_sync_status(&id)?
        .ok_or_else(|| ApiError::NotFound(id))?;
    Ok(Json(job))
}

#[derive(Deserialize)]
struct RecentJobsQuery {
    limit: Option<u32>,
}

async fn recent_jobs(
    State(ctx): State<AppContext>,
    Query(query): Query<RecentJobsQuery>,
) -> Result<Json<Vec<lumen_core::job::SyncJob>>, ApiError> {
    let jobs = ctx.sync.get_recent_jobs(query.limit.unwrap_or(20).min(100))?;
    Ok(Json(jobs))
}

async fn cancel_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let cancelled = ctx.sync.cancel(&id);
    Json(json!({ "cancelled": cancelled }))
}

#[derive(Deserialize)]
struct ListQuery {
    source: Option<String>,
    category: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_formations(
    State(ctx): State<AppContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let opts = ListFormationsOptions {
        source: query.source.as_deref(),
        category: query.category.as_deref(),
        limit: Some(query.limit.unwrap_or(50).clamp(1, 200)),
        offset: query.offset,
    };
    let formations = ctx.store.list_formations(&opts)?;
    let total = ctx.store.count_formations(query.source.as_deref())?;
    Ok(Json(json!({ "formations": formations, "total": total })))
}

async fn get_formation(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<lumen_core::formation::Formation>, ApiError> {
    let formation = ctx
        .store
        .get_formation(&id)?
        .ok_or_else(|| ApiError::NotFound(id))?;
    Ok(Json(formation))
}

#[derive(Deserialize)]
struct ExportQuery {
    format: Option<String>,
    scale: Option<f64>,
    center: Option<bool>,
    coords: Option<String>,
}

/// `GET /api/formations/{id}/export` — transformed file artifact.
async fn export(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let formation = ctx
        .store
        .get_formation(&id)?
        .ok_or_else(|| ApiError::NotFound(id))?;

    let format_str = query.format.as_deref().unwrap_or("csv");
    let format = ExportFormat::parse(format_str)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown format: {format_str}")))?;

    let coordinate_system = match query.coords.as_deref() {
        None => CoordinateSystem::default(),
        Some(raw) => CoordinateSystem::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown coordinate system: {raw}")))?,
    };
    let options = ExportOptions {
        coordinate_system,
        scale_factor: query.scale.unwrap_or(1.0),
        center_origin: query.center.unwrap_or(false),
        ..Default::default()
    };

    let artifact = export_formation(&formation, format, &options)?;
    Ok((
        [
            (CONTENT_TYPE, artifact.content_type.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", artifact.file_name),
            ),
        ],
        artifact.bytes,
    )
        .into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
