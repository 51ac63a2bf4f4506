use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    /// Public base URL of this API, used to build OAuth redirect URIs.
    pub api_url: String,
    pub cookie_secure: bool,

    pub jwt_secret: String,
    pub jwt_access_ttl_secs: i64,
    pub jwt_refresh_ttl_secs: i64,

    pub cron_secret: String,

    pub google_client_id: String,
    pub google_client_secret: String,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub fitbit_client_id: String,
    pub fitbit_client_secret: String,

    pub openweather_api_key: String,

    pub sendgrid_api_key: String,
    pub email_from: String,
    pub email_from_name: String,

    // Report queue
    pub queue_poll_secs: u64,
    pub queue_batch_size: i64,
    pub queue_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a number");

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            api_url: env::var("API_URL").unwrap_or_else(|_| format!("http://localhost:{}", port)),
            cookie_secure: env::var("COOKIE_SECURE")
                .unwrap_or_else(|_| "false".into())
                .parse()
                .unwrap_or(false),

            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            jwt_access_ttl_secs: env::var("JWT_ACCESS_TTL_SECS")
                .unwrap_or_else(|_| "900".into())
                .parse()
                .expect("JWT_ACCESS_TTL_SECS must be a number"),
            jwt_refresh_ttl_secs: env::var("JWT_REFRESH_TTL_SECS")
                .unwrap_or_else(|_| "604800".into())
                .parse()
                .expect("JWT_REFRESH_TTL_SECS must be a number"),

            cron_secret: env::var("CRON_SECRET").unwrap_or_default(),

            google_client_id: env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            spotify_client_id: env::var("SPOTIFY_CLIENT_ID").unwrap_or_default(),
            spotify_client_secret: env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default(),
            fitbit_client_id: env::var("FITBIT_CLIENT_ID").unwrap_or_default(),
            fitbit_client_secret: env::var("FITBIT_CLIENT_SECRET").unwrap_or_default(),

            openweather_api_key: env::var("OPENWEATHER_API_KEY").unwrap_or_default(),

            sendgrid_api_key: env::var("SENDGRID_API_KEY").unwrap_or_default(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "reports@wellboard.app".into()),
            email_from_name: env::var("EMAIL_FROM_NAME").unwrap_or_else(|_| "Wellboard".into()),

            queue_poll_secs: env::var("QUEUE_POLL_SECS")
                .unwrap_or_else(|_| "30".into())
                .parse()
                .unwrap_or(30),
            queue_batch_size: env::var("QUEUE_BATCH_SIZE")
                .unwrap_or_else(|_| "20".into())
                .parse()
                .unwrap_or(20),
            queue_concurrency: env::var("QUEUE_CONCURRENCY")
                .unwrap_or_else(|_| "4".into())
                .parse()
                .unwrap_or(4),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Redirect URI registered with each provider's OAuth app.
    pub fn oauth_redirect_uri(&self, provider_slug: &str) -> String {
        format!(
            "{}/api/integrations/{}/callback",
            self.api_url.trim_end_matches('/'),
            provider_slug
        )
    }

    pub fn integrations_page_url(&self) -> String {
        format!(
            "{}/settings/integrations",
            self.frontend_url.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/wellboard_test".into(),
            host: "127.0.0.1".into(),
            port: 8080,
            frontend_url: "http://localhost:3000".into(),
            api_url: "http://localhost:8080".into(),
            cookie_secure: false,
            jwt_secret: "test-secret".into(),
            jwt_access_ttl_secs: 900,
            jwt_refresh_ttl_secs: 604800,
            cron_secret: "cron-secret".into(),
            google_client_id: "google-id".into(),
            google_client_secret: "google-secret".into(),
            spotify_client_id: "spotify-id".into(),
            spotify_client_secret: "spotify-secret".into(),
            fitbit_client_id: "fitbit-id".into(),
            fitbit_client_secret: "fitbit-secret".into(),
            openweather_api_key: String::new(),
            sendgrid_api_key: String::new(),
            email_from: "reports@wellboard.test".into(),
            email_from_name: "Wellboard".into(),
            queue_poll_secs: 30,
            queue_batch_size: 20,
            queue_concurrency: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_uri_strips_trailing_slash() {
        let mut config = Config::for_tests();
        config.api_url = "https://api.wellboard.app/".into();
        assert_eq!(
            config.oauth_redirect_uri("google_calendar"),
            "https://api.wellboard.app/api/integrations/google_calendar/callback"
        );
    }
}
