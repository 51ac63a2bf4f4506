use axum::{
    extract::{Query, State},
    Extension, Json,
};
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{EmailLogsQuery, DEFAULT_LIST_LIMIT};
use crate::error::AppResult;
use crate::models::email_log::EmailLog;
use crate::services::email;
use crate::AppState;

pub async fn list_email_logs(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<EmailLogsQuery>,
) -> AppResult<Json<Vec<EmailLog>>> {
    query.validate()?;
    let logs = email::list_for_user(
        &state.db,
        auth_user.id,
        query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
    )
    .await?;
    Ok(Json(logs))
}
