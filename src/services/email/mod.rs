//! Outbound email with a durable log of every attempt.
//!
//! Each attempt is written as `pending` before the provider call and moved to
//! `sent` or `failed` afterwards.

pub mod sender;

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::email_log::{EmailLog, EmailStatus};
use crate::models::report::ReportKind;

pub use sender::EmailSender;

pub const RECONNECTION_EMAIL: &str = "reconnection";

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("email delivery is not configured")]
    NotConfigured,

    #[error("email provider rate limit exceeded")]
    RateLimited,

    #[error("email provider unavailable")]
    ServiceUnavailable,

    #[error("email send failed: {0}")]
    Send(String),

    #[error("email log error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
}

/// What an email log row records besides the message itself.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub user_id: Uuid,
    pub email_type: &'static str,
    pub report_date: Option<NaiveDate>,
    pub report_type: Option<ReportKind>,
    pub metadata: serde_json::Value,
}

impl LogContext {
    pub fn report(user_id: Uuid, kind: ReportKind, date: NaiveDate, report_id: Uuid) -> Self {
        Self {
            user_id,
            email_type: kind.email_type(),
            report_date: Some(date),
            report_type: Some(kind),
            metadata: serde_json::json!({ "report_id": report_id }),
        }
    }
}

/// Send `message` and log the attempt. Returns the log id on success.
pub async fn deliver(
    db: &PgPool,
    sender: &EmailSender,
    ctx: &LogContext,
    message: &EmailMessage,
) -> Result<Uuid, EmailError> {
    let log_id = create_log(db, ctx, message).await?;

    match sender.send(message).await {
        Ok(()) => {
            mark(db, log_id, EmailStatus::Sent, None).await?;
            Ok(log_id)
        }
        Err(e) => {
            if let Err(db_err) = mark(db, log_id, EmailStatus::Failed, Some(&e.to_string())).await {
                tracing::error!(error = %db_err, log_id = %log_id, "Failed to mark email log as failed");
            }
            Err(e)
        }
    }
}

async fn create_log(db: &PgPool, ctx: &LogContext, message: &EmailMessage) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO email_logs (id, user_id, recipient_email, email_type, subject, status, report_date, report_type, metadata)
        VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(ctx.user_id)
    .bind(&message.to)
    .bind(ctx.email_type)
    .bind(&message.subject)
    .bind(ctx.report_date)
    .bind(ctx.report_type)
    .bind(&ctx.metadata)
    .fetch_one(db)
    .await
}

async fn mark(db: &PgPool, log_id: Uuid, status: EmailStatus, error: Option<&str>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE email_logs SET
            status = $2,
            error = $3,
            sent_at = CASE WHEN $2 = 'sent'::email_status THEN NOW() ELSE sent_at END
        WHERE id = $1
        "#,
    )
    .bind(log_id)
    .bind(status)
    .bind(error)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn list_for_user(db: &PgPool, user_id: Uuid, limit: i64) -> Result<Vec<EmailLog>, sqlx::Error> {
    sqlx::query_as::<_, EmailLog>(
        "SELECT * FROM email_logs WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_context_uses_kind_email_type() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let report_id = Uuid::new_v4();
        let ctx = LogContext::report(Uuid::new_v4(), ReportKind::Weekly, date, report_id);
        assert_eq!(ctx.email_type, "weekly_report");
        assert_eq!(ctx.report_type, Some(ReportKind::Weekly));
        assert_eq!(ctx.metadata["report_id"], report_id.to_string());
    }
}
