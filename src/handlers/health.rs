use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "wellboard-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Database reachability plus which optional upstreams are configured.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .is_ok();

    let checks = json!({
        "database": if db_ok { "ok" } else { "failed" },
        "email": if state.mailer.is_configured() { "configured" } else { "disabled" },
        "weather": if state.config.openweather_api_key.is_empty() { "disabled" } else { "configured" },
        "queue": if state.queue.control().is_paused() { "paused" } else { "running" },
    });

    if db_ok {
        (StatusCode::OK, Json(json!({ "status": "ready", "checks": checks })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "checks": checks })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_names_service() {
        let Json(body) = health_check().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "wellboard-api");
    }
}
