use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::integration_token::{IntegrationToken, Provider};
use crate::models::profile::Profile;
use crate::services::email::{self, EmailMessage, EmailSender, LogContext, RECONNECTION_EMAIL};
use crate::services::render::Renderer;
use crate::services::token_store;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReconnectionFailure {
    pub user_id: Uuid,
    pub provider: Provider,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ReconnectionSummary {
    pub pending: usize,
    pub notified: usize,
    pub failed: usize,
    pub errors: Vec<ReconnectionFailure>,
}

/// Email every owner of a token flagged for reconnection, once per flag.
/// A token stays pending until its email goes out. Without a configured
/// mailer nothing is attempted, so no failed log rows pile up between runs.
pub async fn notify_pending(
    db: &PgPool,
    renderer: &Renderer,
    mailer: &EmailSender,
) -> Result<ReconnectionSummary, sqlx::Error> {
    let tokens = token_store::pending_reconnection_notices(db).await?;
    let mut summary = ReconnectionSummary {
        pending: tokens.len(),
        ..Default::default()
    };

    if !mailer.is_configured() {
        tracing::warn!(
            pending = summary.pending,
            "Email delivery is not configured, skipping reconnection notifications"
        );
        return Ok(summary);
    }

    for token in &tokens {
        match notify_one(db, renderer, mailer, token).await {
            Ok(()) => summary.notified += 1,
            Err(error) => {
                tracing::warn!(
                    user_id = %token.user_id,
                    provider = %token.provider,
                    error = %error,
                    "Reconnection notice not sent"
                );
                summary.failed += 1;
                summary.errors.push(ReconnectionFailure {
                    user_id: token.user_id,
                    provider: token.provider,
                    error,
                });
            }
        }
    }

    tracing::info!(
        pending = summary.pending,
        notified = summary.notified,
        failed = summary.failed,
        "Reconnection notifications finished"
    );
    Ok(summary)
}

async fn notify_one(
    db: &PgPool,
    renderer: &Renderer,
    mailer: &EmailSender,
    token: &IntegrationToken,
) -> Result<(), String> {
    let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
        .bind(token.user_id)
        .fetch_optional(db)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "profile not found".to_string())?;

    let html = renderer
        .render_reconnection(&profile.name, token.provider, token.last_refresh_error.as_deref())
        .map_err(|e| e.to_string())?;
    let message = EmailMessage {
        to: profile.email.clone(),
        to_name: Some(profile.name.clone()),
        subject: format!("Reconnect {} to keep your Wellboard reports complete", token.provider.display_name()),
        html,
    };
    let ctx = LogContext {
        user_id: token.user_id,
        email_type: RECONNECTION_EMAIL,
        report_date: None,
        report_type: None,
        metadata: serde_json::json!({
            "provider": token.provider,
            "reconnect_url": renderer.reconnect_url(token.provider),
        }),
    };

    email::deliver(db, mailer, &ctx, &message)
        .await
        .map_err(|e| e.to_string())?;
    token_store::mark_reconnection_notified(db, token.id)
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use crate::services::oauth::TokenGrant;

    fn renderer() -> Renderer {
        Renderer::new("http://localhost:5173").unwrap()
    }

    fn sendgrid(api_key: &str, api_url: String) -> EmailSender {
        EmailSender::new(
            reqwest::Client::new(),
            api_key.into(),
            "reports@wellboard.test".into(),
            "Wellboard".into(),
        )
        .with_api_url(api_url)
    }

    async fn flagged_token(pool: &PgPool, user_id: Uuid) -> IntegrationToken {
        let grant = TokenGrant {
            access_token: "fitbit-access".into(),
            refresh_token: Some("fitbit-refresh".into()),
            expires_in: Some(0),
            scope: None,
        };
        let token = token_store::upsert_from_grant(pool, user_id, Provider::Fitbit, &grant).await.unwrap();
        token_store::record_refresh_failure(pool, token.id, "token endpoint rejected the grant: revoked", true)
            .await
            .unwrap();
        token
    }

    async fn email_log_count(pool: &PgPool) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM email_logs")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn test_summary_shape() {
        let summary = ReconnectionSummary {
            pending: 2,
            notified: 1,
            failed: 1,
            errors: vec![ReconnectionFailure {
                user_id: Uuid::nil(),
                provider: Provider::Fitbit,
                error: "email delivery is not configured".into(),
            }],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["errors"][0]["provider"], "fitbit");
        assert_eq!(json["notified"], 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_unconfigured_mailer_leaves_notices_pending_without_logs(pool: PgPool) {
        let user = fixtures::insert_profile(&pool, "ada@example.com").await;
        flagged_token(&pool, user).await;
        let mailer = sendgrid("", "http://127.0.0.1:1/unused".into());

        for _ in 0..3 {
            let summary = notify_pending(&pool, &renderer(), &mailer).await.unwrap();
            assert_eq!(summary, ReconnectionSummary { pending: 1, ..Default::default() });
        }

        assert_eq!(email_log_count(&pool).await, 0);
        let token = token_store::find(&pool, user, Provider::Fitbit).await.unwrap().unwrap();
        assert!(token.needs_reconnection);
        assert!(token.reconnect_notified_at.is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_notice_is_sent_once_per_flag(pool: PgPool) {
        let mut server = mockito::Server::new_async().await;
        let send = server
            .mock("POST", "/v3/mail/send")
            .with_status(202)
            .expect(1)
            .create_async()
            .await;

        let user = fixtures::insert_profile(&pool, "ada@example.com").await;
        flagged_token(&pool, user).await;
        let mailer = sendgrid("sg-key", format!("{}/v3/mail/send", server.url()));

        let first = notify_pending(&pool, &renderer(), &mailer).await.unwrap();
        assert_eq!(first.pending, 1);
        assert_eq!(first.notified, 1);

        let second = notify_pending(&pool, &renderer(), &mailer).await.unwrap();
        assert_eq!(second, ReconnectionSummary::default());

        send.assert_async().await;
        assert_eq!(email_log_count(&pool).await, 1);
        let token = token_store::find(&pool, user, Provider::Fitbit).await.unwrap().unwrap();
        assert!(token.reconnect_notified_at.is_some());
    }
}
