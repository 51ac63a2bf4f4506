use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "integration_provider", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Gmail,
    Spotify,
    Fitbit,
    GoogleCalendar,
    GoogleTasks,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Gmail,
        Provider::Spotify,
        Provider::Fitbit,
        Provider::GoogleCalendar,
        Provider::GoogleTasks,
    ];

    /// URL path segment, matches the serde name.
    pub fn slug(self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::Spotify => "spotify",
            Provider::Fitbit => "fitbit",
            Provider::GoogleCalendar => "google_calendar",
            Provider::GoogleTasks => "google_tasks",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Gmail => "Gmail",
            Provider::Spotify => "Spotify",
            Provider::Fitbit => "Fitbit",
            Provider::GoogleCalendar => "Google Calendar",
            Provider::GoogleTasks => "Google Tasks",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IntegrationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: Provider,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    /// Unix seconds. `None` means the provider did not report an expiry.
    pub expires_at: Option<i64>,
    pub scope: Option<String>,
    pub provider_account: Option<String>,
    pub needs_reconnection: bool,
    pub last_refresh_error: Option<String>,
    pub reconnect_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntegrationToken {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.map(|exp| exp < now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_slug_matches_serde_name() {
        for provider in Provider::ALL {
            let json = serde_json::to_value(provider).unwrap();
            assert_eq!(json, provider.slug());
        }
    }

    #[test]
    fn test_provider_deserializes_from_path_segment() {
        let p: Provider = serde_json::from_str("\"google_tasks\"").unwrap();
        assert_eq!(p, Provider::GoogleTasks);
        assert_eq!(p.display_name(), "Google Tasks");
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let token = IntegrationToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider: Provider::Spotify,
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            expires_at: Some(1_700_000_000),
            scope: None,
            provider_account: Some("listener42".into()),
            needs_reconnection: false,
            last_refresh_error: None,
            reconnect_notified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&token).unwrap();
        assert!(!json.contains("secret-access"));
        assert!(!json.contains("secret-refresh"));
        assert!(json.contains("listener42"));
    }
}
