use axum::{extract::State, Extension, Json};

use crate::auth::middleware::AuthUser;
use crate::error::AppResult;
use crate::services::token_refresh::{self, RefreshSummary};
use crate::services::token_validator::{self, TokenStatus};
use crate::AppState;

pub async fn token_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<TokenStatus>>> {
    let statuses = token_validator::validate_user_tokens(&state.db, auth_user.id).await?;
    Ok(Json(statuses))
}

/// Layered behind the per-user refresh cooldown.
pub async fn refresh_tokens(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<RefreshSummary>> {
    let summary = token_refresh::refresh_user_tokens(&state.db, &state.oauth, auth_user.id).await?;
    Ok(Json(summary))
}
