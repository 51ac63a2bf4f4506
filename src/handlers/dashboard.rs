use axum::{extract::State, Extension, Json};
use chrono::Utc;

use crate::auth::middleware::AuthUser;
use crate::dto::DashboardResponse;
use crate::error::AppResult;
use crate::handlers::auth::load_profile;
use crate::models::report::ReportKind;
use crate::services::{mood, report, token_validator};
use crate::AppState;

pub async fn get_dashboard(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<DashboardResponse>> {
    let profile = load_profile(&state.db, auth_user.id).await?;
    let integrations = token_validator::validate_user_tokens(&state.db, auth_user.id).await?;
    let latest_daily_report = report::latest(&state.db, auth_user.id, ReportKind::Daily).await?;
    let latest_weekly_report = report::latest(&state.db, auth_user.id, ReportKind::Weekly).await?;
    let today_mood = mood::get_for_date(&state.db, auth_user.id, Utc::now().date_naive()).await?;

    Ok(Json(DashboardResponse {
        profile,
        integrations,
        latest_daily_report,
        latest_weekly_report,
        today_mood,
    }))
}
