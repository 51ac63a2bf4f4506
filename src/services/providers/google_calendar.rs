use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{get_json, ProviderAdapter, ProviderError, ProviderProfile, ProviderStats};
use crate::models::integration_token::Provider;
use crate::models::report::ReportPeriod;

const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";
const LISTED_EVENTS: usize = 3;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CalendarStats {
    pub event_count: i64,
    /// Timed events only; all-day events do not count as busy time.
    pub busy_minutes: i64,
    pub first_events: Vec<String>,
}

#[derive(Deserialize)]
struct CalendarListEntry {
    id: String,
    summary: Option<String>,
}

#[derive(Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<Event>,
}

#[derive(Deserialize)]
struct Event {
    summary: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<DateTime<Utc>>,
}

impl Event {
    fn busy_minutes(&self) -> i64 {
        let start = self.start.as_ref().and_then(|t| t.date_time);
        let end = self.end.as_ref().and_then(|t| t.date_time);
        match (start, end) {
            (Some(start), Some(end)) if end > start => (end - start).num_minutes(),
            _ => 0,
        }
    }
}

pub struct GoogleCalendarAdapter {
    http: Client,
    base_url: String,
}

impl GoogleCalendarAdapter {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, CALENDAR_API)
    }

    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for GoogleCalendarAdapter {
    fn provider(&self) -> Provider {
        Provider::GoogleCalendar
    }

    async fn get_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let url = format!("{}/users/me/calendarList/primary", self.base_url);
        let entry: CalendarListEntry =
            get_json(&self.http, Provider::GoogleCalendar, &url, access_token, &[]).await?;
        Ok(ProviderProfile {
            account: entry.id,
            display_name: entry.summary,
        })
    }

    async fn get_stats(
        &self,
        access_token: &str,
        period: ReportPeriod,
    ) -> Result<ProviderStats, ProviderError> {
        let url = format!("{}/calendars/primary/events", self.base_url);
        let events: EventList = get_json(
            &self.http,
            Provider::GoogleCalendar,
            &url,
            access_token,
            &[
                ("timeMin", period.start_utc().to_rfc3339()),
                ("timeMax", period.end_utc_exclusive().to_rfc3339()),
                ("singleEvents", "true".into()),
                ("orderBy", "startTime".into()),
                ("maxResults", "250".into()),
            ],
        )
        .await?;

        Ok(ProviderStats::GoogleCalendar(CalendarStats {
            event_count: events.items.len() as i64,
            busy_minutes: events.items.iter().map(Event::busy_minutes).sum(),
            first_events: events
                .items
                .iter()
                .filter_map(|e| e.summary.clone())
                .take(LISTED_EVENTS)
                .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_busy_minutes_skip_all_day_events() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/calendars/primary/events")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("singleEvents".into(), "true".into()),
                Matcher::UrlEncoded("timeMin".into(), "2026-03-01T00:00:00+00:00".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"items":[
                    {"summary":"Offsite","start":{"date":"2026-03-01"},"end":{"date":"2026-03-02"}},
                    {"summary":"Standup","start":{"dateTime":"2026-03-01T09:00:00Z"},"end":{"dateTime":"2026-03-01T09:15:00Z"}},
                    {"summary":"Planning","start":{"dateTime":"2026-03-01T13:00:00+01:00"},"end":{"dateTime":"2026-03-01T14:30:00+01:00"}},
                    {"summary":"Review","start":{"dateTime":"2026-03-01T16:00:00Z"},"end":{"dateTime":"2026-03-01T17:00:00Z"}}
                ]}"#,
            )
            .create_async()
            .await;

        let adapter = GoogleCalendarAdapter::with_base_url(Client::new(), server.url());
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let stats = adapter
            .get_stats("t", ReportPeriod { start: date, end: date })
            .await
            .unwrap();

        mock.assert_async().await;
        match stats {
            ProviderStats::GoogleCalendar(s) => {
                assert_eq!(s.event_count, 4);
                assert_eq!(s.busy_minutes, 15 + 90 + 60);
                assert_eq!(s.first_events, vec!["Offsite", "Standup", "Planning"]);
            }
            other => panic!("unexpected stats: {:?}", other),
        }
    }
}
