//! Scheduled triggers. Routes sit behind `require_cron_secret`.

use axum::{extract::State, Json};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::models::report::ReportKind;
use crate::services::{reconnection, scheduler};
use crate::AppState;

pub async fn daily_reports(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let report_date = scheduler::daily_report_date(Utc::now().date_naive());
    let summary = scheduler::schedule_reports(&state.db, ReportKind::Daily, report_date).await?;
    Ok(Json(json!({ "success": true, "summary": summary })))
}

pub async fn weekly_reports(State(state): State<AppState>) -> AppResult<Json<Value>> {
    weekly_reports_on(&state, Utc::now().date_naive()).await
}

async fn weekly_reports_on(state: &AppState, today: NaiveDate) -> AppResult<Json<Value>> {
    let report_date = match scheduler::plan_weekly_run(today) {
        Ok(date) => date,
        Err(e) => {
            tracing::info!(today = %today, "Weekly report trigger ignored");
            return Ok(Json(json!({ "success": false, "message": e.to_string() })));
        }
    };
    let summary = scheduler::schedule_reports(&state.db, ReportKind::Weekly, report_date).await?;
    Ok(Json(json!({ "success": true, "summary": summary })))
}

pub async fn reconnection_notifications(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let summary = reconnection::notify_pending(&state.db, &state.renderer, &state.mailer).await?;
    Ok(Json(json!({ "success": true, "summary": summary })))
}
