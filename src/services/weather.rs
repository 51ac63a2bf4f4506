use reqwest::Client;
use serde::{Deserialize, Serialize};

const OPENWEATHER_API: &str = "https://api.openweathermap.org/data/2.5";

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather API key is not configured")]
    NotConfigured,

    #[error("no city set on the profile")]
    NoCity,

    #[error("weather request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("weather API error ({0})")]
    Upstream(u16),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WeatherCondition {
    Clear,
    Clouds,
    Rain,
    Snow,
    Thunderstorm,
    Other,
}

impl WeatherCondition {
    fn from_main(main: &str) -> Self {
        match main {
            "Clear" => Self::Clear,
            "Clouds" => Self::Clouds,
            "Rain" | "Drizzle" => Self::Rain,
            "Snow" => Self::Snow,
            "Thunderstorm" => Self::Thunderstorm,
            _ => Self::Other,
        }
    }

    pub fn is_precipitation(self) -> bool {
        matches!(self, Self::Rain | Self::Snow | Self::Thunderstorm)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WeatherSummary {
    pub city: String,
    pub condition: WeatherCondition,
    pub description: String,
    pub temp_c: f64,
    pub humidity: i64,
}

#[derive(Deserialize)]
struct CurrentWeather {
    name: String,
    #[serde(default)]
    weather: Vec<WeatherEntry>,
    main: MainReadings,
}

#[derive(Deserialize)]
struct WeatherEntry {
    main: String,
    description: String,
}

#[derive(Deserialize)]
struct MainReadings {
    temp: f64,
    humidity: i64,
}

/// Current conditions for a profile's city (OpenWeather, metric units).
#[derive(Clone)]
pub struct WeatherClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl WeatherClient {
    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(http, api_key, OPENWEATHER_API)
    }

    pub fn with_base_url(http: Client, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    pub async fn current(&self, city: Option<&str>) -> Result<WeatherSummary, WeatherError> {
        if self.api_key.is_empty() {
            return Err(WeatherError::NotConfigured);
        }
        let city = city.map(str::trim).filter(|c| !c.is_empty()).ok_or(WeatherError::NoCity)?;

        let response = self
            .http
            .get(format!("{}/weather", self.base_url))
            .query(&[("q", city), ("appid", self.api_key.as_str()), ("units", "metric")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::warn!(status, city, "Weather lookup failed");
            return Err(WeatherError::Upstream(status));
        }

        let current: CurrentWeather = response.json().await?;
        let entry = current.weather.first();
        Ok(WeatherSummary {
            city: current.name,
            condition: entry
                .map(|w| WeatherCondition::from_main(&w.main))
                .unwrap_or(WeatherCondition::Other),
            description: entry.map(|w| w.description.clone()).unwrap_or_default(),
            temp_c: current.main.temp,
            humidity: current.main.humidity,
        })
    }
}

impl std::fmt::Debug for WeatherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherClient")
            .field("configured", &!self.api_key.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_missing_key_or_city_degrades_without_request() {
        let unconfigured = WeatherClient::new(Client::new(), "");
        assert!(matches!(
            unconfigured.current(Some("Lisbon")).await,
            Err(WeatherError::NotConfigured)
        ));

        let client = WeatherClient::new(Client::new(), "key");
        assert!(matches!(client.current(None).await, Err(WeatherError::NoCity)));
        assert!(matches!(client.current(Some("  ")).await, Err(WeatherError::NoCity)));
    }

    #[tokio::test]
    async fn test_current_weather() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/weather")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "Lisbon".into()),
                Matcher::UrlEncoded("units".into(), "metric".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"name":"Lisbon","weather":[{"main":"Drizzle","description":"light drizzle"}],"main":{"temp":14.2,"humidity":88}}"#,
            )
            .create_async()
            .await;

        let client = WeatherClient::with_base_url(Client::new(), "key", server.url());
        let summary = client.current(Some("Lisbon")).await.unwrap();
        assert_eq!(summary.condition, WeatherCondition::Rain);
        assert!(summary.condition.is_precipitation());
        assert_eq!(summary.humidity, 88);
    }
}
