//! Request/response types for the HTTP API.
//!
//! Conventions:
//! - `*Request` / `*Query` are deserialized from JSON bodies or query strings
//! - `*Response` are serialized to clients
//! - Field-level rules use `validator` derives and are checked in the handler

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::integration_token::Provider;
use crate::models::mood::{Mood, MoodEntry};
use crate::models::profile::Profile;
use crate::models::report::{ReportKind, ReportSummary};
use crate::services::token_validator::TokenStatus;

pub const DEFAULT_LIST_LIMIT: i64 = 30;

// ============================================================================
// Common
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// Auth & profile
// ============================================================================

/// POST /api/auth/register
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 254, message = "Email too long"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    /// IANA timezone identifier. Default: "UTC"
    pub timezone: Option<String>,

    #[validate(length(max = 100, message = "City too long"))]
    pub city: Option<String>,
}

/// POST /api/auth/login
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

/// POST /api/auth/refresh
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// PUT /api/me
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    pub timezone: Option<String>,
    #[validate(length(max = 100, message = "City too long"))]
    pub city: Option<String>,
    pub email_reports_enabled: Option<bool>,
}

// ============================================================================
// Integrations & tokens
// ============================================================================

/// GET /api/integrations/:provider/connect
#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub authorize_url: String,
}

/// GET /api/integrations/:provider/callback
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// DELETE /api/integrations/:provider
#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub provider: Provider,
    pub deleted: bool,
}

// ============================================================================
// Reports
// ============================================================================

/// GET /api/reports
#[derive(Debug, Deserialize, Validate)]
pub struct ReportsQuery {
    pub kind: Option<ReportKind>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 100, message = "limit must be 1-100"))]
    pub limit: Option<i64>,
}

/// GET /api/reports/exists
#[derive(Debug, Deserialize)]
pub struct ReportExistsQuery {
    pub date: NaiveDate,
    #[serde(default)]
    pub kind: ReportKind,
}

#[derive(Debug, Serialize)]
pub struct ReportExistsResponse {
    pub exists: bool,
}

/// POST /api/reports/generate
#[derive(Debug, Default, Deserialize)]
pub struct GenerateReportRequest {
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub kind: ReportKind,
}

// ============================================================================
// Mood
// ============================================================================

/// GET /api/mood
#[derive(Debug, Deserialize)]
pub struct MoodQuery {
    pub date: Option<NaiveDate>,
}

/// PUT /api/mood
#[derive(Debug, Deserialize, Validate)]
pub struct UpsertMoodRequest {
    pub date: Option<NaiveDate>,
    pub mood: Mood,
    #[validate(range(min = 0.0, max = 1.0, message = "confidence_score must be between 0 and 1"))]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 factors"))]
    pub factors: Vec<String>,
}

// ============================================================================
// Email logs
// ============================================================================

/// GET /api/email-logs
#[derive(Debug, Deserialize, Validate)]
pub struct EmailLogsQuery {
    #[validate(range(min = 1, max = 100, message = "limit must be 1-100"))]
    pub limit: Option<i64>,
}

// ============================================================================
// Dashboard
// ============================================================================

/// GET /api/dashboard
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub profile: Profile,
    pub integrations: Vec<TokenStatus>,
    pub latest_daily_report: Option<ReportSummary>,
    pub latest_weekly_report: Option<ReportSummary>,
    pub today_mood: Option<MoodEntry>,
}
