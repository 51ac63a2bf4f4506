//! Which users get a report, and for which date.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::report::ReportKind;
use crate::services::queue;

const INACTIVITY_DAYS: i64 = 30;

#[derive(Debug, Clone, FromRow)]
pub struct ReportCandidate {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub last_report_at: Option<DateTime<Utc>>,
    /// At least one token that is usable now or after a refresh.
    pub has_integrations: bool,
}

impl ReportCandidate {
    /// Dormant: no activity and no report in the last 30 days.
    fn is_dormant(&self, now: DateTime<Utc>) -> bool {
        let cutoff = now - Duration::days(INACTIVITY_DAYS);
        let last_active = self.last_active_at.unwrap_or(self.created_at);
        last_active < cutoff && self.last_report_at.map(|r| r < cutoff).unwrap_or(true)
    }
}

pub fn select_report_recipients(candidates: &[ReportCandidate], now: DateTime<Utc>) -> Vec<Uuid> {
    candidates
        .iter()
        .filter(|c| c.has_integrations && !c.is_dormant(now))
        .map(|c| c.user_id)
        .collect()
}

/// Daily reports cover the previous day.
pub fn daily_report_date(today: NaiveDate) -> NaiveDate {
    today - Duration::days(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("weekly reports only run on Sundays (today is {0})")]
pub struct NotSunday(pub Weekday);

/// Weekly reports run on Sunday and cover the seven days ending yesterday.
pub fn plan_weekly_run(today: NaiveDate) -> Result<NaiveDate, NotSunday> {
    match today.weekday() {
        Weekday::Sun => Ok(today - Duration::days(1)),
        other => Err(NotSunday(other)),
    }
}

pub async fn load_candidates(db: &PgPool) -> Result<Vec<ReportCandidate>, sqlx::Error> {
    sqlx::query_as::<_, ReportCandidate>(
        r#"
        SELECT
            p.id AS user_id,
            p.created_at,
            p.last_active_at,
            (SELECT MAX(r.created_at) FROM reports r WHERE r.user_id = p.id) AS last_report_at,
            EXISTS(
                SELECT 1 FROM integration_tokens t
                WHERE t.user_id = p.id
                  AND t.needs_reconnection = false
                  AND (
                      t.expires_at IS NULL
                      OR t.expires_at >= EXTRACT(EPOCH FROM NOW())::BIGINT
                      OR COALESCE(t.refresh_token, '') <> ''
                  )
            ) AS has_integrations
        FROM profiles p
        "#,
    )
    .fetch_all(db)
    .await
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleSummary {
    pub kind: ReportKind,
    pub report_date: NaiveDate,
    pub candidates: usize,
    pub enqueued: usize,
    pub skipped: usize,
}

/// Enqueue one job per selected user. Existing jobs for the same date are kept.
pub async fn schedule_reports(
    db: &PgPool,
    kind: ReportKind,
    report_date: NaiveDate,
) -> Result<ScheduleSummary, sqlx::Error> {
    let candidates = load_candidates(db).await?;
    let selected = select_report_recipients(&candidates, Utc::now());

    let mut enqueued = 0;
    for user_id in &selected {
        if queue::enqueue(db, *user_id, kind, report_date).await? {
            enqueued += 1;
        }
    }

    let summary = ScheduleSummary {
        kind,
        report_date,
        candidates: candidates.len(),
        enqueued,
        skipped: candidates.len() - enqueued,
    };
    tracing::info!(
        kind = kind.label(),
        report_date = %report_date,
        candidates = summary.candidates,
        enqueued = summary.enqueued,
        "Report jobs scheduled"
    );
    Ok(summary)
}
