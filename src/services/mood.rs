//! Mood entries and the heuristic predictor used when no manual entry exists.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::mood::{Mood, MoodEntry, MoodType};
use crate::services::weather::WeatherCondition;

const MIN_CONFIDENCE: f64 = 0.3;
const MAX_CONFIDENCE: f64 = 0.9;
const SIGNAL_KINDS: usize = 7;

/// Per-day signals gathered for a report. `None` means the source was unavailable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoodSignals {
    pub avg_daily_steps: Option<i64>,
    pub avg_minutes_asleep: Option<i64>,
    pub unread_inbox: Option<i64>,
    pub busy_minutes_per_day: Option<i64>,
    /// (completed in period, overdue)
    pub tasks: Option<(i64, i64)>,
    pub minutes_listened_per_day: Option<i64>,
    pub weather: Option<WeatherCondition>,
}

impl MoodSignals {
    fn available(&self) -> usize {
        [
            self.avg_daily_steps.is_some(),
            self.avg_minutes_asleep.is_some(),
            self.unread_inbox.is_some(),
            self.busy_minutes_per_day.is_some(),
            self.tasks.is_some(),
            self.minutes_listened_per_day.is_some(),
            self.weather.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MoodPrediction {
    pub mood: Mood,
    pub confidence_score: f64,
    pub factors: Vec<String>,
}

pub fn predict(signals: &MoodSignals) -> MoodPrediction {
    let mut points = 0i32;
    let mut factors = Vec::new();
    let mut note = |delta: i32, factor: &str| {
        points += delta;
        factors.push(factor.to_string());
    };

    match signals.avg_minutes_asleep {
        Some(m) if m >= 420 => note(2, "Well rested"),
        Some(m) if m < 360 => note(-2, "Short on sleep"),
        _ => {}
    }
    match signals.avg_daily_steps {
        Some(s) if s >= 8_000 => note(1, "Active day"),
        Some(s) if s < 3_000 => note(-1, "Low activity"),
        _ => {}
    }
    if let Some(busy) = signals.busy_minutes_per_day {
        if busy > 360 {
            note(-1, "Packed calendar");
        }
    }
    if let Some((completed, overdue)) = signals.tasks {
        if overdue >= 3 {
            note(-1, "Overdue tasks piling up");
        } else if completed >= 3 {
            note(1, "Getting things done");
        }
    }
    if let Some(unread) = signals.unread_inbox {
        if unread > 100 {
            note(-1, "Overflowing inbox");
        }
    }
    if let Some(listened) = signals.minutes_listened_per_day {
        if listened >= 30 {
            note(1, "Time with music");
        }
    }
    match signals.weather {
        Some(WeatherCondition::Clear) => note(1, "Clear skies"),
        Some(c) if c.is_precipitation() => note(-1, "Gloomy weather"),
        _ => {}
    }

    let mood = match points {
        p if p >= 3 => Mood::Great,
        1..=2 => Mood::Good,
        0 => Mood::Okay,
        -2..=-1 => Mood::Low,
        _ => Mood::Bad,
    };

    let coverage = signals.available() as f64 / SIGNAL_KINDS as f64;
    let confidence = MIN_CONFIDENCE + (MAX_CONFIDENCE - MIN_CONFIDENCE) * coverage;

    MoodPrediction {
        mood,
        confidence_score: (confidence * 100.0).round() / 100.0,
        factors,
    }
}

pub async fn get_for_date(
    db: &PgPool,
    user_id: Uuid,
    date: NaiveDate,
) -> Result<Option<MoodEntry>, sqlx::Error> {
    sqlx::query_as::<_, MoodEntry>("SELECT * FROM mood_entries WHERE user_id = $1 AND entry_date = $2")
        .bind(user_id)
        .bind(date)
        .fetch_optional(db)
        .await
}

/// A manual entry always wins, replacing any prediction for the day.
pub async fn upsert_manual(
    db: &PgPool,
    user_id: Uuid,
    date: NaiveDate,
    mood: Mood,
    confidence_score: Option<f64>,
    factors: &[String],
) -> Result<MoodEntry, sqlx::Error> {
    sqlx::query_as::<_, MoodEntry>(
        r#"
        INSERT INTO mood_entries (id, user_id, entry_date, mood, mood_type, confidence_score, factors)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (user_id, entry_date) DO UPDATE SET
            mood = EXCLUDED.mood,
            mood_type = EXCLUDED.mood_type,
            confidence_score = EXCLUDED.confidence_score,
            factors = EXCLUDED.factors,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(date)
    .bind(mood)
    .bind(MoodType::Manual)
    .bind(confidence_score)
    .bind(factors)
    .fetch_one(db)
    .await
}

/// Store a prediction unless the user already recorded a manual entry.
/// Returns `None` when a manual entry was kept.
pub async fn upsert_predicted(
    db: &PgPool,
    user_id: Uuid,
    date: NaiveDate,
    prediction: &MoodPrediction,
) -> Result<Option<MoodEntry>, sqlx::Error> {
    sqlx::query_as::<_, MoodEntry>(
        r#"
        INSERT INTO mood_entries (id, user_id, entry_date, mood, mood_type, confidence_score, factors)
        VALUES ($1, $2, $3, $4, 'predicted', $5, $6)
        ON CONFLICT (user_id, entry_date) DO UPDATE SET
            mood = EXCLUDED.mood,
            confidence_score = EXCLUDED.confidence_score,
            factors = EXCLUDED.factors,
            updated_at = NOW()
        WHERE mood_entries.mood_type = 'predicted'
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(date)
    .bind(prediction.mood)
    .bind(prediction.confidence_score)
    .bind(&prediction.factors)
    .fetch_optional(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;

    #[test]
    fn test_no_signals_is_okay_with_floor_confidence() {
        let prediction = predict(&MoodSignals::default());
        assert_eq!(prediction.mood, Mood::Okay);
        assert_eq!(prediction.confidence_score, 0.3);
        assert!(prediction.factors.is_empty());
    }

    #[test]
    fn test_all_signals_reach_max_confidence() {
        let signals = MoodSignals {
            avg_daily_steps: Some(11_000),
            avg_minutes_asleep: Some(470),
            unread_inbox: Some(4),
            busy_minutes_per_day: Some(120),
            tasks: Some((5, 0)),
            minutes_listened_per_day: Some(45),
            weather: Some(WeatherCondition::Clear),
        };
        let prediction = predict(&signals);
        assert_eq!(prediction.confidence_score, 0.9);
        assert_eq!(prediction.mood, Mood::Great);
        assert!(prediction.factors.contains(&"Well rested".to_string()));
    }

    #[test]
    fn test_rough_day_predicts_bad() {
        let signals = MoodSignals {
            avg_minutes_asleep: Some(300),
            avg_daily_steps: Some(1_200),
            busy_minutes_per_day: Some(480),
            weather: Some(WeatherCondition::Thunderstorm),
            ..Default::default()
        };
        let prediction = predict(&signals);
        assert_eq!(prediction.mood, Mood::Bad);
        assert_eq!(prediction.factors.len(), 4);
        assert!(prediction.confidence_score > 0.3 && prediction.confidence_score < 0.9);
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let signals = MoodSignals {
            unread_inbox: Some(250),
            tasks: Some((0, 4)),
            ..Default::default()
        };
        assert_eq!(predict(&signals), predict(&signals));
        assert_eq!(predict(&signals).mood, Mood::Low);
    }

    fn prediction(mood: Mood) -> MoodPrediction {
        MoodPrediction {
            mood,
            confidence_score: 0.6,
            factors: vec!["Short sleep".into()],
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_prediction_never_overwrites_manual_entry(pool: PgPool) {
        let user = fixtures::insert_profile(&pool, "ada@example.com").await;
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        upsert_manual(&pool, user, date, Mood::Great, None, &[]).await.unwrap();

        let stored = upsert_predicted(&pool, user, date, &prediction(Mood::Bad)).await.unwrap();
        assert!(stored.is_none());

        let entry = get_for_date(&pool, user, date).await.unwrap().unwrap();
        assert_eq!(entry.mood, Mood::Great);
        assert_eq!(entry.mood_type, MoodType::Manual);
        assert!(entry.factors.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_prediction_replaces_prediction_and_manual_replaces_both(pool: PgPool) {
        let user = fixtures::insert_profile(&pool, "ada@example.com").await;
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

        let first = upsert_predicted(&pool, user, date, &prediction(Mood::Low)).await.unwrap().unwrap();
        let second = upsert_predicted(&pool, user, date, &prediction(Mood::Good)).await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.mood, Mood::Good);
        assert_eq!(second.mood_type, MoodType::Predicted);

        let manual = upsert_manual(&pool, user, date, Mood::Okay, None, &[]).await.unwrap();
        assert_eq!(manual.id, first.id);
        assert_eq!(manual.mood_type, MoodType::Manual);
        assert_eq!(manual.confidence_score, None);
    }
}
