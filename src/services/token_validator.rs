use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::integration_token::{IntegrationToken, Provider};
use crate::services::token_store;

pub const EXPIRING_SOON_SECS: i64 = 7 * 24 * 60 * 60;
const SECS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TokenStatus {
    pub provider: Provider,
    pub provider_account: Option<String>,
    pub expires_at: Option<i64>,
    pub is_expired: bool,
    pub is_expiring_soon: bool,
    /// Whole days until expiry; negative once expired, `None` without an expiry.
    pub days_until_expiry: Option<i64>,
    pub has_refresh_token: bool,
    pub can_auto_refresh: bool,
    pub needs_reconnection: bool,
}

impl TokenStatus {
    pub fn evaluate(token: &IntegrationToken, now: i64) -> Self {
        let is_expired = token.is_expired_at(now);
        let is_expiring_soon = !is_expired
            && token
                .expires_at
                .map(|exp| exp - now <= EXPIRING_SOON_SECS)
                .unwrap_or(false);
        let has_refresh_token = token
            .refresh_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false);

        Self {
            provider: token.provider,
            provider_account: token.provider_account.clone(),
            expires_at: token.expires_at,
            is_expired,
            is_expiring_soon,
            days_until_expiry: token
                .expires_at
                .map(|exp| (exp - now).div_euclid(SECS_PER_DAY)),
            has_refresh_token,
            can_auto_refresh: has_refresh_token && (is_expired || is_expiring_soon),
            needs_reconnection: token.needs_reconnection,
        }
    }

    /// Usable for provider calls now, or after a refresh.
    pub fn is_working(&self) -> bool {
        !self.needs_reconnection && (!self.is_expired || self.has_refresh_token)
    }
}

pub async fn validate_user_tokens(db: &PgPool, user_id: Uuid) -> Result<Vec<TokenStatus>, sqlx::Error> {
    let now = Utc::now().timestamp();
    let tokens = token_store::list_for_user(db, user_id).await?;
    Ok(tokens
        .iter()
        .map(|token| TokenStatus::evaluate(token, now))
        .collect())
}
