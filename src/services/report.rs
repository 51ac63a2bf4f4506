//! Report assembly, scoring and persistence.
//!
//! Generation gathers every data source sequentially and never fails because
//! one of them did: a broken source becomes an `unavailable` section. Callers
//! are responsible for checking [`report_exists`] before generating.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::integration_token::Provider;
use crate::models::mood::{Mood, MoodType};
use crate::models::profile::Profile;
use crate::models::report::{Report, ReportKind, ReportPeriod, ReportSummary};
use crate::services::mood::{self, MoodSignals};
use crate::services::providers::{
    CalendarStats, FitbitStats, GmailStats, ProviderRegistry, ProviderStats, SpotifyStats, TaskStats,
};
use crate::services::render::Renderer;
use crate::services::token_store;
use crate::services::weather::{WeatherClient, WeatherCondition, WeatherSummary};

const BASE_SCORE: f64 = 50.0;
const STEP_TARGET: f64 = 10_000.0;
const SLEEP_TARGET_MINUTES: f64 = 480.0;
const LISTENING_MINUTES: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to render report: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("failed to encode report data: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One data source in a report.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Section<T> {
    Ok(T),
    Unavailable { reason: String },
}

impl<T> Section<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Section::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            Section::Ok(value) => Some(value),
            Section::Unavailable { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MoodSummary {
    pub mood: Mood,
    pub mood_type: MoodType,
    pub confidence_score: Option<f64>,
    pub factors: Vec<String>,
}

/// Provider sections are `None` when the user never connected that provider.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub kind: ReportKind,
    pub period: ReportPeriod,
    pub score: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Section<GmailStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music: Option<Section<SpotifyStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fitness: Option<Section<FitbitStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar: Option<Section<CalendarStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Section<TaskStats>>,
    pub weather: Section<WeatherSummary>,
    pub mood: Section<MoodSummary>,
    pub generated_at: DateTime<Utc>,
}

impl ReportData {
    pub fn empty(kind: ReportKind, period: ReportPeriod) -> Self {
        Self {
            kind,
            period,
            score: BASE_SCORE as i32,
            email: None,
            music: None,
            fitness: None,
            calendar: None,
            tasks: None,
            weather: Section::unavailable("not requested"),
            mood: Section::unavailable("not requested"),
            generated_at: Utc::now(),
        }
    }

    /// Place a provider result into its section.
    pub fn insert_provider(&mut self, provider: Provider, result: Result<ProviderStats, String>) {
        match result {
            Ok(ProviderStats::Gmail(s)) => self.email = Some(Section::Ok(s)),
            Ok(ProviderStats::Spotify(s)) => self.music = Some(Section::Ok(s)),
            Ok(ProviderStats::Fitbit(s)) => self.fitness = Some(Section::Ok(s)),
            Ok(ProviderStats::GoogleCalendar(s)) => self.calendar = Some(Section::Ok(s)),
            Ok(ProviderStats::GoogleTasks(s)) => self.tasks = Some(Section::Ok(s)),
            Err(reason) => match provider {
                Provider::Gmail => self.email = Some(Section::unavailable(reason)),
                Provider::Spotify => self.music = Some(Section::unavailable(reason)),
                Provider::Fitbit => self.fitness = Some(Section::unavailable(reason)),
                Provider::GoogleCalendar => self.calendar = Some(Section::unavailable(reason)),
                Provider::GoogleTasks => self.tasks = Some(Section::unavailable(reason)),
            },
        }
    }

    fn section<T>(section: &Option<Section<T>>) -> Option<&T> {
        section.as_ref().and_then(Section::ok)
    }

    /// Normalised per-day signals for the mood predictor.
    pub fn mood_signals(&self) -> MoodSignals {
        let days = self.period.days().max(1);
        let fitness = Self::section(&self.fitness);
        MoodSignals {
            avg_daily_steps: fitness.map(|f| f.avg_daily_steps),
            avg_minutes_asleep: fitness.and_then(|f| f.avg_minutes_asleep),
            unread_inbox: Self::section(&self.email).map(|e| e.unread_inbox),
            busy_minutes_per_day: Self::section(&self.calendar).map(|c| c.busy_minutes / days),
            tasks: Self::section(&self.tasks).map(|t| (t.completed_in_period, t.overdue)),
            minutes_listened_per_day: Self::section(&self.music).map(|m| m.minutes_listened / days),
            weather: self.weather.ok().map(|w| w.condition),
        }
    }
}

/// Deterministic wellness score in `0..=100`.
pub fn score(data: &ReportData) -> i32 {
    let days = data.period.days().max(1);
    let mut total = BASE_SCORE;

    if let Some(fitness) = ReportData::section(&data.fitness) {
        total += 20.0 * (fitness.avg_daily_steps as f64 / STEP_TARGET).clamp(0.0, 1.0);
        if let Some(asleep) = fitness.avg_minutes_asleep {
            // Full marks at the target, zero at four hours off in either direction.
            let distance = (asleep as f64 - SLEEP_TARGET_MINUTES).abs();
            total += 15.0 * (1.0 - distance / 240.0).max(0.0);
        }
    }

    if let Some(email) = ReportData::section(&data.email) {
        total -= (email.unread_inbox as f64 / 10.0).clamp(0.0, 10.0);
    }

    if let Some(calendar) = ReportData::section(&data.calendar) {
        let busy_per_day = calendar.busy_minutes / days;
        if busy_per_day > 6 * 60 {
            total -= 10.0;
        } else if busy_per_day > 4 * 60 {
            total -= 5.0;
        }
    }

    if let Some(tasks) = ReportData::section(&data.tasks) {
        let considered = tasks.completed_in_period + tasks.open;
        if considered > 0 {
            total += 10.0 * tasks.completed_in_period as f64 / considered as f64;
        }
        total -= (2 * tasks.overdue).min(6) as f64;
    }

    if let Some(music) = ReportData::section(&data.music) {
        if music.minutes_listened / days >= LISTENING_MINUTES {
            total += 5.0;
        }
    }

    match data.weather.ok().map(|w| w.condition) {
        Some(WeatherCondition::Clear) => total += 5.0,
        Some(c) if c.is_precipitation() => total -= 3.0,
        _ => {}
    }

    if let Some(mood) = data.mood.ok() {
        total += match mood.mood {
            Mood::Great => 10.0,
            Mood::Good => 5.0,
            Mood::Okay => 0.0,
            Mood::Low => -5.0,
            Mood::Bad => -10.0,
        };
    }

    (total.round() as i32).clamp(0, 100)
}

/// Combine gathered sections into the final data with its score.
pub fn assemble(mut data: ReportData, weather: Section<WeatherSummary>, mood: Section<MoodSummary>) -> ReportData {
    data.weather = weather;
    data.mood = mood;
    data.score = score(&data);
    data
}

#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub data: ReportData,
    pub html: String,
}

#[derive(Clone)]
pub struct ReportGenerator {
    db: PgPool,
    providers: ProviderRegistry,
    weather: WeatherClient,
    renderer: Renderer,
}

impl ReportGenerator {
    pub fn new(db: PgPool, providers: ProviderRegistry, weather: WeatherClient, renderer: Renderer) -> Self {
        Self {
            db,
            providers,
            weather,
            renderer,
        }
    }

    pub async fn generate(
        &self,
        profile: &Profile,
        date: NaiveDate,
        kind: ReportKind,
    ) -> Result<GeneratedReport, ReportError> {
        let period = kind.period(date);
        let mut data = ReportData::empty(kind, period);

        for token in token_store::list_for_user(&self.db, profile.id).await? {
            let Some(adapter) = self.providers.get(token.provider) else {
                continue;
            };
            let result = match adapter.get_access_token(&self.db, profile.id).await {
                Ok(access_token) => adapter.get_stats(&access_token, period).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                tracing::warn!(
                    user_id = %profile.id,
                    provider = %token.provider,
                    error = %e,
                    "Report section unavailable"
                );
            }
            data.insert_provider(token.provider, result.map_err(|e| e.to_string()));
        }

        let weather = match self.weather.current(profile.city.as_deref()).await {
            Ok(summary) => Section::Ok(summary),
            Err(e) => Section::unavailable(e.to_string()),
        };
        data.weather = weather.clone();

        let mood = self.resolve_mood(profile.id, period.end, &data).await;
        let data = assemble(data, weather, mood);
        let html = self.renderer.render_report(profile, &data)?;

        tracing::info!(
            user_id = %profile.id,
            kind = kind.label(),
            date = %date,
            score = data.score,
            "Report generated"
        );
        Ok(GeneratedReport { data, html })
    }

    /// Manual entry for the day if there is one, otherwise a stored prediction.
    async fn resolve_mood(&self, user_id: Uuid, date: NaiveDate, data: &ReportData) -> Section<MoodSummary> {
        match mood::get_for_date(&self.db, user_id, date).await {
            Ok(Some(entry)) if entry.mood_type == MoodType::Manual => {
                return Section::Ok(MoodSummary {
                    mood: entry.mood,
                    mood_type: entry.mood_type,
                    confidence_score: entry.confidence_score,
                    factors: entry.factors,
                });
            }
            Ok(_) => {}
            Err(e) => return Section::unavailable(format!("mood lookup failed: {}", e)),
        }

        let prediction = mood::predict(&data.mood_signals());
        if let Err(e) = mood::upsert_predicted(&self.db, user_id, date, &prediction).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to store mood prediction");
        }

        Section::Ok(MoodSummary {
            mood: prediction.mood,
            mood_type: MoodType::Predicted,
            confidence_score: Some(prediction.confidence_score),
            factors: prediction.factors,
        })
    }
}

impl std::fmt::Debug for ReportGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportGenerator")
            .field("providers", &self.providers)
            .field("weather", &self.weather)
            .finish()
    }
}

pub async fn report_exists(
    db: &PgPool,
    user_id: Uuid,
    date: NaiveDate,
    kind: ReportKind,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM reports WHERE user_id = $1 AND report_date = $2 AND kind = $3)",
    )
    .bind(user_id)
    .bind(date)
    .bind(kind)
    .fetch_one(db)
    .await
}

pub async fn store(
    db: &PgPool,
    user_id: Uuid,
    date: NaiveDate,
    generated: &GeneratedReport,
) -> Result<Report, ReportError> {
    let data = serde_json::to_value(&generated.data)?;
    let report = sqlx::query_as::<_, Report>(
        r#"
        INSERT INTO reports (id, user_id, report_date, kind, score, html, data)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(date)
    .bind(generated.data.kind)
    .bind(generated.data.score)
    .bind(&generated.html)
    .bind(data)
    .fetch_one(db)
    .await?;
    Ok(report)
}

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub kind: Option<ReportKind>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: i64,
}

pub async fn list(db: &PgPool, user_id: Uuid, filter: &ReportFilter) -> Result<Vec<ReportSummary>, sqlx::Error> {
    sqlx::query_as::<_, ReportSummary>(
        r#"
        SELECT id, report_date, kind, score, created_at FROM reports
        WHERE user_id = $1
          AND ($2::report_kind IS NULL OR kind = $2)
          AND ($3::date IS NULL OR report_date >= $3)
          AND ($4::date IS NULL OR report_date <= $4)
        ORDER BY report_date DESC, created_at DESC
        LIMIT $5
        "#,
    )
    .bind(user_id)
    .bind(filter.kind)
    .bind(filter.start_date)
    .bind(filter.end_date)
    .bind(filter.limit)
    .fetch_all(db)
    .await
}

pub async fn get(db: &PgPool, user_id: Uuid, id: Uuid) -> Result<Option<Report>, sqlx::Error> {
    sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
}

pub async fn latest(db: &PgPool, user_id: Uuid, kind: ReportKind) -> Result<Option<ReportSummary>, sqlx::Error> {
    sqlx::query_as::<_, ReportSummary>(
        r#"
        SELECT id, report_date, kind, score, created_at FROM reports
        WHERE user_id = $1 AND kind = $2
        ORDER BY report_date DESC, created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(kind)
    .fetch_optional(db)
    .await
}
