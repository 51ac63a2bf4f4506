use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{MoodQuery, UpsertMoodRequest};
use crate::error::{AppError, AppResult};
use crate::models::mood::MoodEntry;
use crate::services::mood;
use crate::AppState;

const MAX_FACTOR_LEN: usize = 100;

pub async fn get_mood(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<MoodQuery>,
) -> AppResult<Json<Option<MoodEntry>>> {
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let entry = mood::get_for_date(&state.db, auth_user.id, date).await?;
    Ok(Json(entry))
}

/// Manual entries replace any prediction for the same day.
pub async fn upsert_mood(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<UpsertMoodRequest>,
) -> AppResult<Json<MoodEntry>> {
    body.validate()?;
    if body.factors.iter().any(|f| f.trim().is_empty() || f.len() > MAX_FACTOR_LEN) {
        return Err(AppError::Validation(format!(
            "factors must be non-empty and at most {} characters",
            MAX_FACTOR_LEN
        )));
    }

    let date = body.date.unwrap_or_else(|| Utc::now().date_naive());
    let factors: Vec<String> = body.factors.iter().map(|f| f.trim().to_string()).collect();
    let entry = mood::upsert_manual(
        &state.db,
        auth_user.id,
        date,
        body.mood,
        body.confidence_score,
        &factors,
    )
    .await?;
    Ok(Json(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Request, StatusCode},
        routing::put,
        Router,
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app(state: AppState) -> Router {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: "ada@example.com".into(),
        };
        Router::new()
            .route("/api/mood", put(upsert_mood))
            .layer(axum::Extension(user))
            .with_state(state)
    }

    async fn put_mood(body: serde_json::Value) -> StatusCode {
        app(AppState::for_tests())
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/mood")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_rejected() {
        let status = put_mood(serde_json::json!({ "mood": "good", "confidence_score": 2.0 })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_blank_factor_is_rejected() {
        let status = put_mood(serde_json::json!({ "mood": "low", "factors": ["slept badly", "  "] })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
