use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{
    GenerateReportRequest, ReportExistsQuery, ReportExistsResponse, ReportsQuery, DEFAULT_LIST_LIMIT,
};
use crate::error::{AppError, AppResult};
use crate::handlers::auth::load_profile;
use crate::models::report::{Report, ReportSummary};
use crate::services::report::{self, ReportFilter};
use crate::services::token_refresh;
use crate::AppState;

pub async fn list_reports(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ReportsQuery>,
) -> AppResult<Json<Vec<ReportSummary>>> {
    query.validate()?;
    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        if start > end {
            return Err(AppError::Validation("start_date must not be after end_date".into()));
        }
    }

    let filter = ReportFilter {
        kind: query.kind,
        start_date: query.start_date,
        end_date: query.end_date,
        limit: query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
    };
    let reports = report::list(&state.db, auth_user.id, &filter).await?;
    Ok(Json(reports))
}

pub async fn get_report(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Report>> {
    let report = report::get(&state.db, auth_user.id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Report not found".into()))?;
    Ok(Json(report))
}

pub async fn report_exists(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ReportExistsQuery>,
) -> AppResult<Json<ReportExistsResponse>> {
    let exists = report::report_exists(&state.db, auth_user.id, query.date, query.kind).await?;
    Ok(Json(ReportExistsResponse { exists }))
}

/// An empty body means today's daily report. Anything else must parse.
fn parse_generate_body(raw: &[u8]) -> AppResult<GenerateReportRequest> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(GenerateReportRequest::default());
    }
    serde_json::from_slice(raw).map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))
}

/// On-demand generation. Same pipeline as the queue, without the email.
pub async fn generate_report(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    raw: Bytes,
) -> AppResult<Json<Report>> {
    let body = parse_generate_body(&raw)?;
    let date = body.date.unwrap_or_else(|| Utc::now().date_naive());

    if report::report_exists(&state.db, auth_user.id, date, body.kind).await? {
        return Err(AppError::Conflict(format!(
            "A {} report for {} already exists",
            body.kind.label().to_lowercase(),
            date
        )));
    }

    let profile = load_profile(&state.db, auth_user.id).await?;
    if let Err(e) = token_refresh::refresh_user_tokens(&state.db, &state.oauth, profile.id).await {
        tracing::warn!(user_id = %profile.id, error = %e, "Token refresh before report failed");
    }

    let generated = state.generator.generate(&profile, date, body.kind).await?;
    let stored = report::store(&state.db, profile.id, date, &generated).await?;
    Ok(Json(stored))
}
