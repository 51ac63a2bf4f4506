use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::auth::oauth_state::constant_time_eq;
use crate::error::AppError;
use crate::AppState;

/// Scheduled triggers authenticate with `Authorization: Bearer <CRON_SECRET>`.
/// An unset secret disables the cron routes entirely.
pub async fn require_cron_secret(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state.config.cron_secret.as_bytes();
    if expected.is_empty() {
        tracing::warn!(path = %req.uri().path(), "Cron secret not configured, rejecting trigger");
        return Err(AppError::Unauthorized);
    }

    let TypedHeader(auth) = bearer.ok_or(AppError::Unauthorized)?;
    if !constant_time_eq(auth.token().as_bytes(), expected) {
        tracing::warn!(path = %req.uri().path(), "Invalid cron secret");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(req).await)
}
