//! Persistence for integration tokens, one row per (user, provider).

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::integration_token::{IntegrationToken, Provider};
use crate::services::oauth::TokenGrant;

pub async fn list_for_user(db: &PgPool, user_id: Uuid) -> Result<Vec<IntegrationToken>, sqlx::Error> {
    sqlx::query_as::<_, IntegrationToken>(
        "SELECT * FROM integration_tokens WHERE user_id = $1 ORDER BY provider",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

pub async fn find(
    db: &PgPool,
    user_id: Uuid,
    provider: Provider,
) -> Result<Option<IntegrationToken>, sqlx::Error> {
    sqlx::query_as::<_, IntegrationToken>(
        "SELECT * FROM integration_tokens WHERE user_id = $1 AND provider = $2",
    )
    .bind(user_id)
    .bind(provider)
    .fetch_optional(db)
    .await
}

/// Store the grant from an OAuth callback. Reconnecting replaces the previous
/// credentials and clears any reconnection flags.
pub async fn upsert_from_grant(
    db: &PgPool,
    user_id: Uuid,
    provider: Provider,
    grant: &TokenGrant,
) -> Result<IntegrationToken, sqlx::Error> {
    let expires_at = grant.expires_at(Utc::now().timestamp());

    sqlx::query_as::<_, IntegrationToken>(
        r#"
        INSERT INTO integration_tokens (id, user_id, provider, access_token, refresh_token, expires_at, scope)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (user_id, provider) DO UPDATE SET
            access_token = EXCLUDED.access_token,
            refresh_token = COALESCE(EXCLUDED.refresh_token, integration_tokens.refresh_token),
            expires_at = EXCLUDED.expires_at,
            scope = EXCLUDED.scope,
            needs_reconnection = false,
            last_refresh_error = NULL,
            reconnect_notified_at = NULL,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(provider)
    .bind(&grant.access_token)
    .bind(&grant.refresh_token)
    .bind(expires_at)
    .bind(&grant.scope)
    .fetch_one(db)
    .await
}

pub async fn set_provider_account(
    db: &PgPool,
    token_id: Uuid,
    account: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE integration_tokens SET provider_account = $2 WHERE id = $1")
        .bind(token_id)
        .bind(account)
        .execute(db)
        .await?;
    Ok(())
}

/// Overwrite credentials after a successful refresh. Providers that rotate
/// refresh tokens (Fitbit) return a new one; others keep the stored token.
pub async fn apply_refresh(
    db: &PgPool,
    token_id: Uuid,
    grant: &TokenGrant,
) -> Result<(), sqlx::Error> {
    let expires_at = grant.expires_at(Utc::now().timestamp());

    sqlx::query(
        r#"
        UPDATE integration_tokens SET
            access_token = $2,
            refresh_token = COALESCE($3, refresh_token),
            expires_at = $4,
            needs_reconnection = false,
            last_refresh_error = NULL,
            reconnect_notified_at = NULL,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(token_id)
    .bind(&grant.access_token)
    .bind(&grant.refresh_token)
    .bind(expires_at)
    .execute(db)
    .await?;
    Ok(())
}

/// Record a failed refresh. The row is kept; definitive failures (revoked or
/// invalid grant) also flag it so the user is asked to reconnect.
pub async fn record_refresh_failure(
    db: &PgPool,
    token_id: Uuid,
    error: &str,
    needs_reconnection: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE integration_tokens SET
            needs_reconnection = needs_reconnection OR $3,
            last_refresh_error = $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(token_id)
    .bind(error)
    .bind(needs_reconnection)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn delete(db: &PgPool, user_id: Uuid, provider: Provider) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM integration_tokens WHERE user_id = $1 AND provider = $2")
        .bind(user_id)
        .bind(provider)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Tokens flagged for reconnection whose owner has not been emailed yet.
pub async fn pending_reconnection_notices(db: &PgPool) -> Result<Vec<IntegrationToken>, sqlx::Error> {
    sqlx::query_as::<_, IntegrationToken>(
        r#"
        SELECT * FROM integration_tokens
        WHERE needs_reconnection = true AND reconnect_notified_at IS NULL
        ORDER BY updated_at ASC
        "#,
    )
    .fetch_all(db)
    .await
}

pub async fn mark_reconnection_notified(db: &PgPool, token_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE integration_tokens SET reconnect_notified_at = NOW() WHERE id = $1")
        .bind(token_id)
        .execute(db)
        .await?;
    Ok(())
}
