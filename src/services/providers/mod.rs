//! Read-only adapters over the third-party provider APIs.
//!
//! Adapters never store or refresh credentials. They read the token row, fail
//! fast with [`ProviderError::NotConnected`] or [`ProviderError::TokenExpired`]
//! and otherwise issue bearer-authenticated GETs.

pub mod fitbit;
pub mod gmail;
pub mod google_calendar;
pub mod google_tasks;
pub mod spotify;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::integration_token::Provider;
use crate::models::report::ReportPeriod;
use crate::services::token_store;

pub use fitbit::{FitbitAdapter, FitbitStats};
pub use gmail::{GmailAdapter, GmailStats};
pub use google_calendar::{CalendarStats, GoogleCalendarAdapter};
pub use google_tasks::{GoogleTasksAdapter, TaskStats};
pub use spotify::{SpotifyAdapter, SpotifyStats};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} is not connected")]
    NotConnected(Provider),

    #[error("{0} access token has expired")]
    TokenExpired(Provider),

    #[error("{0} rejected the access token")]
    Unauthorized(Provider),

    #[error("{0} rate limit exceeded")]
    RateLimited(Provider),

    #[error("{provider} API error ({status}): {message}")]
    Upstream {
        provider: Provider,
        status: u16,
        message: String,
    },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{provider} returned an unexpected payload: {message}")]
    Decode { provider: Provider, message: String },
}

/// Account identity shown next to a connected integration.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProviderProfile {
    pub account: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderStats {
    Gmail(GmailStats),
    Spotify(SpotifyStats),
    Fitbit(FitbitStats),
    GoogleCalendar(CalendarStats),
    GoogleTasks(TaskStats),
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Current access token for `user_id`, without refreshing it.
    async fn get_access_token(&self, db: &PgPool, user_id: Uuid) -> Result<String, ProviderError> {
        let provider = self.provider();
        let token = token_store::find(db, user_id, provider)
            .await?
            .ok_or(ProviderError::NotConnected(provider))?;

        if token.needs_reconnection || token.is_expired_at(Utc::now().timestamp()) {
            return Err(ProviderError::TokenExpired(provider));
        }
        Ok(token.access_token)
    }

    async fn get_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError>;

    async fn get_stats(
        &self,
        access_token: &str,
        period: ReportPeriod,
    ) -> Result<ProviderStats, ProviderError>;
}

/// Bearer-authenticated JSON GET shared by every adapter.
pub(crate) async fn get_json<T: DeserializeOwned>(
    http: &Client,
    provider: Provider,
    url: &str,
    access_token: &str,
    query: &[(&str, String)],
) -> Result<T, ProviderError> {
    let response = http
        .get(url)
        .bearer_auth(access_token)
        .query(query)
        .send()
        .await?;

    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED => return Err(ProviderError::Unauthorized(provider)),
        StatusCode::TOO_MANY_REQUESTS => return Err(ProviderError::RateLimited(provider)),
        s if !s.is_success() => {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(provider = %provider, status = s.as_u16(), url, "Provider request failed");
            return Err(ProviderError::Upstream {
                provider,
                status: s.as_u16(),
                message,
            });
        }
        _ => {}
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
        provider,
        message: e.to_string(),
    })
}

/// One adapter per provider, shared across requests and workers.
#[derive(Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new(http: Client) -> Self {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
            Arc::new(GmailAdapter::new(http.clone())),
            Arc::new(SpotifyAdapter::new(http.clone())),
            Arc::new(FitbitAdapter::new(http.clone())),
            Arc::new(GoogleCalendarAdapter::new(http.clone())),
            Arc::new(GoogleTasksAdapter::new(http)),
        ];
        Self::with_adapters(adapters)
    }

    pub fn with_adapters(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self {
            adapters: adapters.into_iter().map(|a| (a.provider(), a)).collect(),
        }
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
