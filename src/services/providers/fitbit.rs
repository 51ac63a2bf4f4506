use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{get_json, ProviderAdapter, ProviderError, ProviderProfile, ProviderStats};
use crate::models::integration_token::Provider;
use crate::models::report::ReportPeriod;

const FITBIT_API: &str = "https://api.fitbit.com";

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FitbitStats {
    pub total_steps: i64,
    pub avg_daily_steps: i64,
    /// Average over nights with a main sleep log; `None` when nothing was logged.
    pub avg_minutes_asleep: Option<i64>,
    pub nights_logged: i64,
}

#[derive(Deserialize)]
struct ProfileEnvelope {
    user: FitbitUser,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FitbitUser {
    encoded_id: String,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct StepsSeries {
    #[serde(rename = "activities-steps", default)]
    days: Vec<StepsDay>,
}

#[derive(Deserialize)]
struct StepsDay {
    // Fitbit returns the count as a string.
    value: String,
}

#[derive(Deserialize)]
struct SleepRange {
    #[serde(default)]
    sleep: Vec<SleepLog>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SleepLog {
    minutes_asleep: i64,
    #[serde(default = "main_sleep_default")]
    is_main_sleep: bool,
}

fn main_sleep_default() -> bool {
    true
}

pub struct FitbitAdapter {
    http: Client,
    base_url: String,
}

impl FitbitAdapter {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, FITBIT_API)
    }

    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

fn summarize(steps: &StepsSeries, sleep: &SleepRange, period: ReportPeriod) -> FitbitStats {
    let total_steps: i64 = steps
        .days
        .iter()
        .filter_map(|d| d.value.parse::<i64>().ok())
        .sum();

    let nights: Vec<i64> = sleep
        .sleep
        .iter()
        .filter(|s| s.is_main_sleep)
        .map(|s| s.minutes_asleep)
        .collect();
    let nights_logged = nights.len() as i64;

    FitbitStats {
        total_steps,
        avg_daily_steps: total_steps / period.days().max(1),
        avg_minutes_asleep: (nights_logged > 0).then(|| nights.iter().sum::<i64>() / nights_logged),
        nights_logged,
    }
}

#[async_trait]
impl ProviderAdapter for FitbitAdapter {
    fn provider(&self) -> Provider {
        Provider::Fitbit
    }

    async fn get_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let url = format!("{}/1/user/-/profile.json", self.base_url);
        let envelope: ProfileEnvelope = get_json(&self.http, Provider::Fitbit, &url, access_token, &[]).await?;
        Ok(ProviderProfile {
            account: envelope.user.encoded_id,
            display_name: envelope.user.display_name,
        })
    }

    async fn get_stats(
        &self,
        access_token: &str,
        period: ReportPeriod,
    ) -> Result<ProviderStats, ProviderError> {
        let range = format!("{}/{}", period.start.format("%Y-%m-%d"), period.end.format("%Y-%m-%d"));

        let url = format!("{}/1/user/-/activities/steps/date/{}.json", self.base_url, range);
        let steps: StepsSeries = get_json(&self.http, Provider::Fitbit, &url, access_token, &[]).await?;

        let url = format!("{}/1.2/user/-/sleep/date/{}.json", self.base_url, range);
        let sleep: SleepRange = get_json(&self.http, Provider::Fitbit, &url, access_token, &[]).await?;

        Ok(ProviderStats::Fitbit(summarize(&steps, &sleep, period)))
    }
}
