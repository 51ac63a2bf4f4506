//! Report job queue backed by the `report_jobs` table.
//!
//! Jobs move `pending -> processing -> completed | failed`. Claiming uses
//! `FOR UPDATE SKIP LOCKED`, so concurrent workers never take the same job.
//! Delivery is at-least-once; a failed job is only retried when the next cron
//! run enqueues it again. A job stuck in `processing` past the lease is
//! considered abandoned and can be claimed or re-enqueued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::job::{JobStatus, ReportJob};
use crate::models::profile::Profile;
use crate::models::report::ReportKind;
use crate::services::email::{self, EmailMessage, EmailSender, LogContext};
use crate::services::oauth::OAuthClient;
use crate::services::render::report_subject;
use crate::services::report::{self, ReportGenerator};
use crate::services::token_refresh;

/// How long a claimed job may stay in `processing` before another worker may
/// take it over.
pub const PROCESSING_LEASE_MINUTES: i32 = 30;

/// Returns `true` when a job was created or a failed or abandoned one was reset.
pub async fn enqueue(
    db: &PgPool,
    user_id: Uuid,
    kind: ReportKind,
    report_date: NaiveDate,
) -> Result<bool, sqlx::Error> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO report_jobs (id, user_id, kind, report_date)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, kind, report_date) DO UPDATE SET
            status = 'pending',
            error = NULL,
            started_at = NULL,
            completed_at = NULL,
            created_at = NOW()
        WHERE report_jobs.status = 'failed'
           OR (report_jobs.status = 'processing'
               AND report_jobs.started_at < NOW() - make_interval(mins => $5))
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(kind)
    .bind(report_date)
    .bind(PROCESSING_LEASE_MINUTES)
    .fetch_optional(db)
    .await?;
    Ok(id.is_some())
}

/// Pending jobs plus any whose processing lease has run out.
pub async fn claim_batch(db: &PgPool, limit: i64) -> Result<Vec<ReportJob>, sqlx::Error> {
    sqlx::query_as::<_, ReportJob>(
        r#"
        UPDATE report_jobs SET status = 'processing', started_at = NOW(), error = NULL
        WHERE id IN (
            SELECT id FROM report_jobs
            WHERE status = 'pending'
               OR (status = 'processing' AND started_at < NOW() - make_interval(mins => $2))
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *
        "#,
    )
    .bind(limit)
    .bind(PROCESSING_LEASE_MINUTES)
    .fetch_all(db)
    .await
}

async fn finish(db: &PgPool, job_id: Uuid, status: JobStatus, error: Option<&str>) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE report_jobs SET status = $2, error = $3, completed_at = NOW() WHERE id = $1")
        .bind(job_id)
        .bind(status)
        .bind(error)
        .execute(db)
        .await?;
    Ok(())
}

/// Delete jobs that have not started yet.
pub async fn clear_pending(db: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM report_jobs WHERE status = 'pending'")
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct JobCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

pub async fn job_counts(db: &PgPool) -> Result<JobCounts, sqlx::Error> {
    let rows = sqlx::query_as::<_, (JobStatus, i64)>(
        "SELECT status, COUNT(*) FROM report_jobs GROUP BY status",
    )
    .fetch_all(db)
    .await?;

    let mut counts = JobCounts::default();
    for (status, count) in rows {
        match status {
            JobStatus::Pending => counts.pending = count,
            JobStatus::Processing => counts.processing = count,
            JobStatus::Completed => counts.completed = count,
            JobStatus::Failed => counts.failed = count,
        }
    }
    Ok(counts)
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { emailed: bool },
    Skipped(&'static str),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobFailure {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<JobFailure>,
}

impl BatchSummary {
    pub fn record(&mut self, job: &ReportJob, result: &Result<JobOutcome, String>) {
        self.processed += 1;
        match result {
            Ok(JobOutcome::Completed { .. }) => self.succeeded += 1,
            Ok(JobOutcome::Skipped(_)) => self.skipped += 1,
            Err(error) => {
                self.failed += 1;
                self.errors.push(JobFailure {
                    job_id: job.id,
                    user_id: job.user_id,
                    error: error.clone(),
                });
            }
        }
    }
}

/// Lifetime counters for this process.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub batches: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub last_batch_at: Option<DateTime<Utc>>,
}

/// Pause flag and counters shared between the worker and admin routes.
/// In-memory only: a restart resumes processing and resets the counters.
#[derive(Debug, Default)]
pub struct QueueControl {
    paused: AtomicBool,
    stats: Mutex<QueueStats>,
}

impl QueueControl {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record_batch(&self, summary: &BatchSummary) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.batches += 1;
            stats.processed += summary.processed as u64;
            stats.succeeded += summary.succeeded as u64;
            stats.failed += summary.failed as u64;
            stats.skipped += summary.skipped as u64;
            stats.last_batch_at = Some(Utc::now());
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub paused: bool,
    pub jobs: JobCounts,
    pub stats: QueueStats,
}

/// Everything a worker needs to turn a job into a stored, emailed report.
#[derive(Debug, Clone)]
pub struct ReportQueue {
    db: PgPool,
    oauth: Arc<OAuthClient>,
    generator: ReportGenerator,
    mailer: EmailSender,
    control: Arc<QueueControl>,
    batch_size: i64,
    concurrency: usize,
}

impl ReportQueue {
    pub fn new(
        db: PgPool,
        oauth: Arc<OAuthClient>,
        generator: ReportGenerator,
        mailer: EmailSender,
        batch_size: i64,
        concurrency: usize,
    ) -> Self {
        Self {
            db,
            oauth,
            generator,
            mailer,
            control: Arc::new(QueueControl::default()),
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    pub fn control(&self) -> &QueueControl {
        &self.control
    }

    pub async fn status(&self) -> Result<QueueStatus, sqlx::Error> {
        Ok(QueueStatus {
            paused: self.control.is_paused(),
            jobs: job_counts(&self.db).await?,
            stats: self.control.stats(),
        })
    }

    /// Claim and process one batch. Ignores the pause flag; the worker checks it.
    pub async fn process_batch(&self) -> Result<BatchSummary, sqlx::Error> {
        let jobs = claim_batch(&self.db, self.batch_size).await?;
        let summary = Mutex::new(BatchSummary::default());

        futures_util::stream::iter(jobs)
            .for_each_concurrent(self.concurrency, |job| {
                let summary = &summary;
                async move {
                    let result = self.process_job(&job).await.map_err(|e| format!("{:#}", e));
                    let (status, error) = match &result {
                        Ok(_) => (JobStatus::Completed, None),
                        Err(e) => (JobStatus::Failed, Some(e.as_str())),
                    };
                    if let Err(db_err) = finish(&self.db, job.id, status, error).await {
                        tracing::error!(job_id = %job.id, error = %db_err, "Failed to record job result");
                    }
                    if let Ok(mut summary) = summary.lock() {
                        summary.record(&job, &result);
                    }
                }
            })
            .await;

        let summary = summary.into_inner().unwrap_or_default();
        self.control.record_batch(&summary);
        if summary.processed > 0 {
            tracing::info!(
                processed = summary.processed,
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped = summary.skipped,
                "Report batch processed"
            );
        }
        Ok(summary)
    }

    async fn process_job(&self, job: &ReportJob) -> anyhow::Result<JobOutcome> {
        if report::report_exists(&self.db, job.user_id, job.report_date, job.kind).await? {
            return Ok(JobOutcome::Skipped("report already exists"));
        }

        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(job.user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("profile {} not found", job.user_id))?;

        // Refresh failures only degrade the affected sections.
        match token_refresh::refresh_user_tokens(&self.db, &self.oauth, job.user_id).await {
            Ok(refresh) if !refresh.is_clean() => {
                tracing::debug!(user_id = %job.user_id, failed = refresh.failed.len(), "Generating with stale integrations");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(user_id = %job.user_id, error = %e, "Token refresh before report failed");
            }
        }

        let generated = self.generator.generate(&profile, job.report_date, job.kind).await?;
        let stored = report::store(&self.db, job.user_id, job.report_date, &generated).await?;

        if !profile.email_reports_enabled || profile.email.is_empty() {
            return Ok(JobOutcome::Completed { emailed: false });
        }

        let message = EmailMessage {
            to: profile.email.clone(),
            to_name: Some(profile.name.clone()),
            subject: report_subject(job.kind, &generated.data),
            html: stored.html,
        };
        let ctx = LogContext::report(job.user_id, job.kind, job.report_date, stored.id);
        // The report is stored either way; the email log records the failure.
        let emailed = match email::deliver(&self.db, &self.mailer, &ctx, &message).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(user_id = %job.user_id, error = %e, "Report email not delivered");
                false
            }
        };
        Ok(JobOutcome::Completed { emailed })
    }
}

pub fn spawn_queue_worker(queue: ReportQueue, poll_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(poll_secs.max(1)));
        loop {
            interval.tick().await;
            if queue.control().is_paused() {
                continue;
            }
            if let Err(e) = queue.process_batch().await {
                tracing::error!(error = %e, "Report queue batch failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;

    fn job() -> ReportJob {
        ReportJob {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: ReportKind::Daily,
            report_date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            status: JobStatus::Processing,
            error: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }

    #[test]
    fn test_batch_summary_keeps_going_after_failure() {
        let mut summary = BatchSummary::default();
        let failing = job();
        summary.record(&job(), &Ok(JobOutcome::Completed { emailed: true }));
        summary.record(&failing, &Err("gmail API error (500)".into()));
        summary.record(&job(), &Ok(JobOutcome::Skipped("report already exists")));
        summary.record(&job(), &Ok(JobOutcome::Completed { emailed: false }));

        assert_eq!(summary.processed, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors[0].job_id, failing.id);
    }

    #[test]
    fn test_queue_control_pause_and_stats() {
        let control = QueueControl::default();
        assert!(!control.is_paused());
        control.pause();
        assert!(control.is_paused());
        control.resume();
        assert!(!control.is_paused());

        let summary = BatchSummary {
            processed: 3,
            succeeded: 2,
            failed: 1,
            ..Default::default()
        };
        control.record_batch(&summary);
        control.record_batch(&BatchSummary::default());

        let stats = control.stats();
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.failed, 1);
        assert!(stats.last_batch_at.is_some());
    }

    async fn set_status(db: &PgPool, user_id: Uuid, status: JobStatus, started_ago_mins: i32) {
        sqlx::query(
            "UPDATE report_jobs SET status = $2, started_at = NOW() - make_interval(mins => $3) WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(status)
        .bind(started_ago_mins)
        .execute(db)
        .await
        .unwrap();
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_claim_batch_reclaims_abandoned_processing_job(pool: PgPool) {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let stuck = fixtures::insert_profile(&pool, "stuck@example.com").await;
        let busy = fixtures::insert_profile(&pool, "busy@example.com").await;
        assert!(enqueue(&pool, stuck, ReportKind::Daily, date).await.unwrap());
        assert!(enqueue(&pool, busy, ReportKind::Daily, date).await.unwrap());
        set_status(&pool, stuck, JobStatus::Processing, PROCESSING_LEASE_MINUTES * 2).await;
        set_status(&pool, busy, JobStatus::Processing, 1).await;

        let claimed = claim_batch(&pool, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].user_id, stuck);
        assert_eq!(claimed[0].status, JobStatus::Processing);
        assert!(claimed[0].started_at.unwrap() > Utc::now() - chrono::Duration::minutes(1));

        // The fresh lease now protects the reclaimed job too.
        assert!(claim_batch(&pool, 10).await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_enqueue_resets_only_failed_or_abandoned_jobs(pool: PgPool) {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let user = fixtures::insert_profile(&pool, "ada@example.com").await;
        let kind = ReportKind::Daily;

        assert!(enqueue(&pool, user, kind, date).await.unwrap());
        assert!(!enqueue(&pool, user, kind, date).await.unwrap(), "pending job is left alone");

        set_status(&pool, user, JobStatus::Processing, 1).await;
        assert!(!enqueue(&pool, user, kind, date).await.unwrap(), "live lease is left alone");

        set_status(&pool, user, JobStatus::Processing, PROCESSING_LEASE_MINUTES + 5).await;
        assert!(enqueue(&pool, user, kind, date).await.unwrap());

        set_status(&pool, user, JobStatus::Completed, 1).await;
        assert!(!enqueue(&pool, user, kind, date).await.unwrap(), "completed job is left alone");

        set_status(&pool, user, JobStatus::Failed, 1).await;
        assert!(enqueue(&pool, user, kind, date).await.unwrap());

        let counts = job_counts(&pool).await.unwrap();
        assert_eq!(counts, JobCounts { pending: 1, ..Default::default() });
    }

    #[test]
    fn test_status_serializes_counts() {
        let status = QueueStatus {
            paused: true,
            jobs: JobCounts {
                pending: 4,
                ..Default::default()
            },
            stats: QueueStats::default(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["paused"], true);
        assert_eq!(json["jobs"]["pending"], 4);
        assert_eq!(json["stats"]["batches"], 0);
    }
}
