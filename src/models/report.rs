use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "report_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Daily,
    Weekly,
}

impl Default for ReportKind {
    fn default() -> Self {
        Self::Daily
    }
}

impl ReportKind {
    /// Inclusive date range a report for `date` covers.
    pub fn period(self, date: NaiveDate) -> ReportPeriod {
        match self {
            ReportKind::Daily => ReportPeriod {
                start: date,
                end: date,
            },
            ReportKind::Weekly => ReportPeriod {
                start: date - Duration::days(6),
                end: date,
            },
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReportKind::Daily => "Daily",
            ReportKind::Weekly => "Weekly",
        }
    }

    pub fn email_type(self) -> &'static str {
        match self {
            ReportKind::Daily => "daily_report",
            ReportKind::Weekly => "weekly_report",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Midnight UTC at the start of the period.
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
    }

    /// Midnight UTC of the day after the period ends (exclusive bound).
    pub fn end_utc_exclusive(&self) -> DateTime<Utc> {
        (self.end + Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc()
    }
}

/// Stored report. Immutable once inserted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Report {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "report_date")]
    pub date: NaiveDate,
    pub kind: ReportKind,
    pub score: i32,
    pub html: String,
    #[serde(rename = "json")]
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Listing row without the rendered body.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReportSummary {
    pub id: Uuid,
    #[sqlx(rename = "report_date")]
    pub date: NaiveDate,
    pub kind: ReportKind,
    pub score: i32,
    pub created_at: DateTime<Utc>,
}
