use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::auth::{
    middleware::AuthUser,
    oauth_state::STATE_COOKIE,
};
use crate::config::Config;
use crate::dto::{CallbackQuery, ConnectResponse, DisconnectResponse};
use crate::error::{AppError, AppResult};
use crate::models::integration_token::Provider;
use crate::services::{token_store, token_validator::{self, TokenStatus}};
use crate::AppState;

/// Cookie scope: only the callback routes need to see the nonce.
const STATE_COOKIE_PATH: &str = "/api/integrations";

/// Error codes the settings page understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackError {
    AccessDenied,
    InvalidState,
    TokenExchangeFailed,
    StorageFailed,
}

impl CallbackError {
    fn code(self) -> &'static str {
        match self {
            CallbackError::AccessDenied => "access_denied",
            CallbackError::InvalidState => "invalid_state",
            CallbackError::TokenExchangeFailed => "token_exchange_failed",
            CallbackError::StorageFailed => "storage_failed",
        }
    }
}

fn callback_redirect(config: &Config, outcome: Result<Provider, CallbackError>) -> Redirect {
    let base = config.integrations_page_url();
    let target = match outcome {
        Ok(provider) => format!("{}?connected={}", base, provider.slug()),
        Err(e) => format!("{}?error={}", base, e.code()),
    };
    Redirect::to(&target)
}

fn state_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE, value))
        .path(STATE_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub async fn list_integrations(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<TokenStatus>>> {
    let statuses = token_validator::validate_user_tokens(&state.db, auth_user.id).await?;
    Ok(Json(statuses))
}

pub async fn connect(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(provider): Path<Provider>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<ConnectResponse>)> {
    let nonce = state.oauth_states.issue(auth_user.id, provider).await;
    let authorize_url = state.oauth.authorize_url(provider, &nonce)?;

    tracing::info!(user_id = %auth_user.id, provider = %provider, "OAuth authorization started");
    let jar = jar.add(state_cookie(nonce, state.config.cookie_secure));
    Ok((jar, Json(ConnectResponse { authorize_url })))
}

/// Browser lands here from the provider. Every outcome is a redirect back to
/// the settings page; the state cookie is always cleared.
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<Provider>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    let cookie_value = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(Cookie::build(STATE_COOKIE).path(STATE_COOKIE_PATH));

    let outcome = complete_authorization(&state, provider, query, cookie_value.as_deref()).await;
    (jar, callback_redirect(&state.config, outcome))
}

async fn complete_authorization(
    state: &AppState,
    provider: Provider,
    query: CallbackQuery,
    cookie: Option<&str>,
) -> Result<Provider, CallbackError> {
    if let Some(error) = query.error {
        tracing::info!(provider = %provider, error = %error, "OAuth authorization declined");
        return Err(CallbackError::AccessDenied);
    }

    let (Some(code), Some(nonce)) = (query.code, query.state) else {
        return Err(CallbackError::InvalidState);
    };

    let pending = state
        .oauth_states
        .consume(&nonce, cookie, provider)
        .await
        .map_err(|e| {
            tracing::warn!(provider = %provider, error = %e, "OAuth state rejected");
            CallbackError::InvalidState
        })?;

    let grant = state.oauth.exchange_code(provider, &code).await.map_err(|e| {
        tracing::warn!(user_id = %pending.user_id, provider = %provider, error = %e, "OAuth code exchange failed");
        CallbackError::TokenExchangeFailed
    })?;

    let token = token_store::upsert_from_grant(&state.db, pending.user_id, provider, &grant)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %pending.user_id, provider = %provider, error = %e, "Failed to store integration token");
            CallbackError::StorageFailed
        })?;

    // Account identity is cosmetic; a failed lookup does not fail the connection.
    if let Some(adapter) = state.providers.get(provider) {
        match adapter.get_profile(&grant.access_token).await {
            Ok(profile) => {
                if let Err(e) = token_store::set_provider_account(&state.db, token.id, &profile.account).await {
                    tracing::warn!(provider = %provider, error = %e, "Failed to store provider account");
                }
            }
            Err(e) => tracing::warn!(provider = %provider, error = %e, "Provider profile lookup failed"),
        }
    }

    tracing::info!(user_id = %pending.user_id, provider = %provider, "Integration connected");
    Ok(provider)
}

pub async fn disconnect(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(provider): Path<Provider>,
) -> AppResult<Json<DisconnectResponse>> {
    if !token_store::delete(&state.db, auth_user.id, provider).await? {
        return Err(AppError::NotFound(format!("{} is not connected", provider.display_name())));
    }
    tracing::info!(user_id = %auth_user.id, provider = %provider, "Integration disconnected");
    Ok(Json(DisconnectResponse {
        provider,
        deleted: true,
    }))
}
