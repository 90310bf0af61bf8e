//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use mail_report_core::domain::{RunOutcome, StoredReport};
use mail_report_core::pipeline::PipelineError;
use mail_report_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        generate_report_handler,
        list_reports_handler,
        get_report_by_date_handler,
        get_report_by_id_handler,
        delete_report_handler,
    ),
    components(
        schemas(GenerateReportRequest, RunReportResponse, ReportResponse, ReferenceResponse)
    ),
    tags(
        (name = "Mail Report API", description = "API endpoints for generating and reading daily email reports.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// Parameters for one report run.
#[derive(Deserialize, ToSchema, Default)]
pub struct GenerateReportRequest {
    /// Calendar date the report is keyed by; defaults to today (UTC).
    pub date: Option<NaiveDate>,
    /// Fetch the trailing N hours instead of the calendar date's mail.
    pub last_n_hours: Option<u32>,
}

/// The outcome payload of a report run.
#[derive(Serialize, ToSchema)]
pub struct RunReportResponse {
    report_id: Uuid,
    date: NaiveDate,
    email_count: usize,
    thread_count: usize,
    reference_count: usize,
    highlights: Vec<String>,
    todos: Vec<String>,
    full_content: String,
}

impl From<RunOutcome> for RunReportResponse {
    fn from(outcome: RunOutcome) -> Self {
        Self {
            report_id: outcome.report_id,
            date: outcome.date,
            email_count: outcome.email_count,
            thread_count: outcome.thread_count,
            reference_count: outcome.reference_count,
            highlights: outcome.summary.highlights,
            todos: outcome.summary.todos,
            full_content: outcome.summary.full_content,
        }
    }
}

/// A stored report, as returned by the read endpoints.
#[derive(Serialize, ToSchema)]
pub struct ReportResponse {
    id: Uuid,
    date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    email_count: usize,
    thread_count: usize,
    highlights: Vec<String>,
    todos: Vec<String>,
    full_content: String,
    references: Vec<ReferenceResponse>,
}

/// A per-message pointer stored alongside a report.
#[derive(Serialize, ToSchema)]
pub struct ReferenceResponse {
    message_id: String,
    thread_id: String,
    subject: Option<String>,
    from_addr: Option<String>,
    snippet: String,
    deep_link: String,
}

impl From<StoredReport> for ReportResponse {
    fn from(report: StoredReport) -> Self {
        Self {
            id: report.id,
            date: report.date,
            created_at: report.created_at,
            updated_at: report.updated_at,
            email_count: report.email_count(),
            thread_count: report.thread_count(),
            highlights: report.summary.highlights,
            todos: report.summary.todos,
            full_content: report.summary.full_content,
            references: report
                .references
                .into_iter()
                .map(|r| ReferenceResponse {
                    message_id: r.message_id,
                    thread_id: r.thread_id,
                    subject: r.subject,
                    from_addr: r.from_addr,
                    snippet: r.snippet,
                    deep_link: r.deep_link,
                })
                .collect(),
        }
    }
}

/// Query parameters for the report listing endpoint.
#[derive(Deserialize, IntoParams)]
pub struct ListReportsQuery {
    /// How many trailing days to include. Defaults to 30.
    pub days: Option<i64>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Generate (or regenerate) the report for a date.
///
/// Runs the whole pipeline: fetch, aggregate, score, summarize, persist.
/// Rerunning for the same date replaces the stored report.
#[utoipa::path(
    post,
    path = "/reports/generate",
    request_body = GenerateReportRequest,
    responses(
        (status = 200, description = "Report generated and persisted", body = RunReportResponse),
        (status = 401, description = "Mail source or provider authentication failed"),
        (status = 502, description = "The mail source could not be reached"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn generate_report_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<GenerateReportRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let date = payload.date.unwrap_or_else(|| Utc::now().date_naive());

    match app_state
        .pipeline
        .generate_for_date(date, payload.last_n_hours)
        .await
    {
        Ok(outcome) => Ok((StatusCode::OK, Json(RunReportResponse::from(outcome)))),
        Err(PipelineError::Auth(msg)) => {
            error!(%date, "report run failed to authenticate: {}", msg);
            Err((StatusCode::UNAUTHORIZED, msg))
        }
        Err(PipelineError::Mail(msg)) => {
            error!(%date, "report run could not fetch mail: {}", msg);
            Err((StatusCode::BAD_GATEWAY, msg))
        }
        Err(e) => {
            error!(%date, "report run failed: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate report".to_string(),
            ))
        }
    }
}

/// List recent reports, newest first.
#[utoipa::path(
    get,
    path = "/reports",
    params(ListReportsQuery),
    responses(
        (status = 200, description = "Reports within the window", body = [ReportResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_reports_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ListReportsQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let days = query.days.unwrap_or(30).max(1);
    let date_from = Utc::now().date_naive() - Duration::days(days);

    match app_state.store.list(Some(date_from), None).await {
        Ok(reports) => {
            let payload: Vec<ReportResponse> =
                reports.into_iter().map(ReportResponse::from).collect();
            Ok((StatusCode::OK, Json(payload)))
        }
        Err(e) => {
            error!("Failed to list reports: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list reports".to_string(),
            ))
        }
    }
}

/// Fetch the report for a calendar date.
#[utoipa::path(
    get,
    path = "/reports/by-date/{date}",
    params(("date" = NaiveDate, Path, description = "The report date (YYYY-MM-DD).")),
    responses(
        (status = 200, description = "The report for the date", body = ReportResponse),
        (status = 404, description = "No report exists for the date"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_report_by_date_handler(
    State(app_state): State<Arc<AppState>>,
    Path(date): Path<NaiveDate>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match app_state.store.get_by_date(date).await {
        Ok(report) => Ok((StatusCode::OK, Json(ReportResponse::from(report)))),
        Err(PortError::NotFound(msg)) => Err((StatusCode::NOT_FOUND, msg)),
        Err(e) => {
            error!(%date, "Failed to fetch report: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch report".to_string(),
            ))
        }
    }
}

/// Fetch a report by its id.
#[utoipa::path(
    get,
    path = "/reports/{id}",
    params(("id" = Uuid, Path, description = "The report id.")),
    responses(
        (status = 200, description = "The report", body = ReportResponse),
        (status = 404, description = "No report with that id"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_report_by_id_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match app_state.store.get_by_id(id).await {
        Ok(report) => Ok((StatusCode::OK, Json(ReportResponse::from(report)))),
        Err(PortError::NotFound(msg)) => Err((StatusCode::NOT_FOUND, msg)),
        Err(e) => {
            error!(%id, "Failed to fetch report: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch report".to_string(),
            ))
        }
    }
}

/// Delete a report and its references.
#[utoipa::path(
    delete,
    path = "/reports/{id}",
    params(("id" = Uuid, Path, description = "The report id.")),
    responses(
        (status = 204, description = "Report deleted"),
        (status = 404, description = "No report with that id"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delete_report_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match app_state.store.delete(id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err((StatusCode::NOT_FOUND, format!("Report {} not found", id))),
        Err(e) => {
            error!(%id, "Failed to delete report: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete report".to_string(),
            ))
        }
    }
}
