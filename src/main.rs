use anyhow::Context;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod db;
mod dto;
mod error;
mod handlers;
mod models;
mod services;

use auth::oauth_state::OAuthStateStore;
use auth::rate_limit::RateLimitState;
use config::Config;
use services::email::EmailSender;
use services::oauth::OAuthClient;
use services::providers::ProviderRegistry;
use services::queue::ReportQueue;
use services::render::Renderer;
use services::report::ReportGenerator;
use services::weather::WeatherClient;

const OUTBOUND_TIMEOUT_SECS: u64 = 15;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimitState,
    pub oauth_states: OAuthStateStore,
    pub oauth: Arc<OAuthClient>,
    pub providers: ProviderRegistry,
    pub renderer: Renderer,
    pub mailer: EmailSender,
    pub generator: ReportGenerator,
    pub queue: ReportQueue,
}

impl AppState {
    /// Wire every service from config. One reqwest client is shared by all
    /// outbound calls.
    pub fn build(db: PgPool, config: Arc<Config>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(OUTBOUND_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        let oauth = Arc::new(OAuthClient::from_config(&config, http.clone()));
        let providers = ProviderRegistry::new(http.clone());
        let weather = WeatherClient::new(http.clone(), config.openweather_api_key.clone());
        let renderer = Renderer::new(config.frontend_url.clone()).context("Failed to load email templates")?;
        let mailer = EmailSender::new(
            http,
            config.sendgrid_api_key.clone(),
            config.email_from.clone(),
            config.email_from_name.clone(),
        );
        let generator = ReportGenerator::new(db.clone(), providers.clone(), weather, renderer.clone());
        let queue = ReportQueue::new(
            db.clone(),
            oauth.clone(),
            generator.clone(),
            mailer.clone(),
            config.queue_batch_size,
            config.queue_concurrency,
        );

        Ok(Self {
            db,
            config,
            rate_limiter: RateLimitState::new(),
            oauth_states: OAuthStateStore::new(),
            oauth,
            providers,
            renderer,
            mailer,
            generator,
            queue,
        })
    }
}

#[cfg(test)]
impl AppState {
    pub fn for_tests() -> Self {
        Self::build(db::lazy_pool(), Arc::new(Config::for_tests())).unwrap()
    }
}

fn router(state: AppState) -> anyhow::Result<Router> {
    // Auth routes with IP rate limiting
    let auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let cron_routes = Router::new()
        .route("/api/cron/daily-reports", post(handlers::cron::daily_reports))
        .route("/api/cron/weekly-reports", post(handlers::cron::weekly_reports))
        .route(
            "/api/cron/reconnection-notifications",
            post(handlers::cron::reconnection_notifications),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::cron::require_cron_secret,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        // Browser redirect from the provider; the user is identified by the state nonce.
        .route(
            "/api/integrations/:provider/callback",
            get(handlers::integrations::callback),
        )
        .merge(auth_routes)
        .merge(cron_routes);

    // Runs inside require_auth so the cooldown is keyed by user.
    let token_refresh_routes = Router::new()
        .route("/api/tokens/refresh", post(handlers::tokens::refresh_tokens))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_token_refresh,
        ));

    let admin_routes = Router::new()
        .route("/api/admin/queue", get(handlers::admin::queue_status))
        .route("/api/admin/queue/pause", post(handlers::admin::pause_queue))
        .route("/api/admin/queue/resume", post(handlers::admin::resume_queue))
        .route("/api/admin/queue/clear", post(handlers::admin::clear_queue))
        .route("/api/admin/queue/process", post(handlers::admin::process_queue))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_admin,
        ));

    let protected_routes = Router::new()
        .route(
            "/api/me",
            get(handlers::auth::me).put(handlers::auth::update_me),
        )
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/dashboard", get(handlers::dashboard::get_dashboard))
        // Integrations
        .route(
            "/api/integrations",
            get(handlers::integrations::list_integrations),
        )
        .route(
            "/api/integrations/:provider/connect",
            get(handlers::integrations::connect),
        )
        .route(
            "/api/integrations/:provider",
            delete(handlers::integrations::disconnect),
        )
        .route("/api/tokens/status", get(handlers::tokens::token_status))
        // Reports
        .route("/api/reports", get(handlers::reports::list_reports))
        .route("/api/reports/exists", get(handlers::reports::report_exists))
        .route(
            "/api/reports/generate",
            post(handlers::reports::generate_report),
        )
        .route("/api/reports/:id", get(handlers::reports::get_report))
        // Mood
        .route(
            "/api/mood",
            get(handlers::mood::get_mood).put(handlers::mood::upsert_mood),
        )
        .route(
            "/api/email-logs",
            get(handlers::email_logs::list_email_logs),
        )
        .merge(token_refresh_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let allowed_origins: Vec<axum::http::HeaderValue> = {
        let mut origins = vec![state
            .config
            .frontend_url
            .parse::<axum::http::HeaderValue>()
            .context("FRONTEND_URL is not a valid origin")?];
        if let Ok(extra) = std::env::var("CORS_EXTRA_ORIGINS") {
            for o in extra.split(',') {
                if let Ok(hv) = o.trim().parse::<axum::http::HeaderValue>() {
                    origins.push(hv);
                }
            }
        }
        origins
    };
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true);

    Ok(Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wellboard_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());

    let db = db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    let state = AppState::build(db, config.clone())?;

    auth::rate_limit::spawn_cleanup_worker(state.rate_limiter.clone());
    services::queue::spawn_queue_worker(state.queue.clone(), config.queue_poll_secs);

    let app = router(state)?;

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    // Connect info feeds the per-IP auth rate limit.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("Server error")?;
    Ok(())
}
