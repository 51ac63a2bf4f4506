use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::integration_token::{IntegrationToken, Provider};
use crate::services::oauth::OAuthClient;
use crate::services::token_store;
use crate::services::token_validator::TokenStatus;

#[derive(Debug, Clone, Serialize)]
pub struct RefreshFailure {
    pub provider: Provider,
    pub error: String,
    pub needs_reconnection: bool,
}

/// Per-provider outcome. One provider failing never stops the others.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSummary {
    pub refreshed: Vec<Provider>,
    pub failed: Vec<RefreshFailure>,
    pub skipped: Vec<Provider>,
}

impl RefreshSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Refresh every token of `user_id` that the validator flags as
/// auto-refreshable. Not throttled; the HTTP route applies the cooldown.
pub async fn refresh_user_tokens(
    db: &PgPool,
    oauth: &OAuthClient,
    user_id: Uuid,
) -> Result<RefreshSummary, sqlx::Error> {
    let tokens = token_store::list_for_user(db, user_id).await?;
    let now = Utc::now().timestamp();
    let mut summary = RefreshSummary::default();

    for token in &tokens {
        let status = TokenStatus::evaluate(token, now);
        if !status.can_auto_refresh {
            summary.skipped.push(token.provider);
            continue;
        }

        match refresh_one(db, oauth, token).await {
            Ok(()) => summary.refreshed.push(token.provider),
            Err(failure) => summary.failed.push(failure),
        }
    }

    tracing::info!(
        user_id = %user_id,
        refreshed = summary.refreshed.len(),
        failed = summary.failed.len(),
        skipped = summary.skipped.len(),
        "Integration token refresh finished"
    );
    Ok(summary)
}

async fn refresh_one(
    db: &PgPool,
    oauth: &OAuthClient,
    token: &IntegrationToken,
) -> Result<(), RefreshFailure> {
    let provider = token.provider;
    let Some(refresh_token) = token.refresh_token.as_deref() else {
        return Err(RefreshFailure {
            provider,
            error: "no refresh token stored".into(),
            needs_reconnection: true,
        });
    };

    let outcome = match oauth.refresh(provider, refresh_token).await {
        Ok(grant) => token_store::apply_refresh(db, token.id, &grant)
            .await
            .map_err(|e| RefreshFailure {
                provider,
                error: format!("failed to store refreshed token: {}", e),
                needs_reconnection: false,
            }),
        Err(e) => {
            let failure = RefreshFailure {
                provider,
                error: e.to_string(),
                needs_reconnection: e.requires_reconnection(),
            };
            if let Err(db_err) =
                token_store::record_refresh_failure(db, token.id, &failure.error, failure.needs_reconnection)
                    .await
            {
                tracing::error!(error = %db_err, token_id = %token.id, "Failed to record refresh failure");
            }
            Err(failure)
        }
    };

    if let Err(failure) = &outcome {
        tracing::warn!(
            user_id = %token.user_id,
            provider = %provider,
            needs_reconnection = failure.needs_reconnection,
            error = %failure.error,
            "Token refresh failed"
        );
    }
    outcome
}
