use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{get_json, ProviderAdapter, ProviderError, ProviderProfile, ProviderStats};
use crate::models::integration_token::Provider;
use crate::models::report::ReportPeriod;

const TASKS_API: &str = "https://tasks.googleapis.com/tasks/v1";
const MAX_LISTS: usize = 10;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TaskStats {
    pub open: i64,
    pub completed_in_period: i64,
    /// Open tasks due on or before the last day of the period.
    pub overdue: i64,
}

#[derive(Deserialize)]
struct TaskLists {
    #[serde(default)]
    items: Vec<TaskList>,
}

#[derive(Deserialize)]
struct TaskList {
    id: String,
    title: Option<String>,
}

#[derive(Deserialize)]
struct Tasks {
    #[serde(default)]
    items: Vec<Task>,
}

#[derive(Deserialize)]
struct Task {
    status: String,
    due: Option<DateTime<Utc>>,
    completed: Option<DateTime<Utc>>,
}

pub struct GoogleTasksAdapter {
    http: Client,
    base_url: String,
}

impl GoogleTasksAdapter {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, TASKS_API)
    }

    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn lists(&self, access_token: &str) -> Result<Vec<TaskList>, ProviderError> {
        let url = format!("{}/users/@me/lists", self.base_url);
        let lists: TaskLists = get_json(&self.http, Provider::GoogleTasks, &url, access_token, &[]).await?;
        Ok(lists.items)
    }
}

fn tally(stats: &mut TaskStats, tasks: &[Task], period: ReportPeriod) {
    let start = period.start_utc();
    let end = period.end_utc_exclusive();
    for task in tasks {
        if task.status == "completed" {
            if task.completed.map(|c| c >= start && c < end).unwrap_or(false) {
                stats.completed_in_period += 1;
            }
        } else {
            stats.open += 1;
            if task.due.map(|due| due < end).unwrap_or(false) {
                stats.overdue += 1;
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for GoogleTasksAdapter {
    fn provider(&self) -> Provider {
        Provider::GoogleTasks
    }

    async fn get_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let lists = self.lists(access_token).await?;
        let first = lists.into_iter().next();
        Ok(ProviderProfile {
            account: first
                .as_ref()
                .and_then(|l| l.title.clone())
                .unwrap_or_else(|| Provider::GoogleTasks.display_name().to_string()),
            display_name: None,
        })
    }

    async fn get_stats(
        &self,
        access_token: &str,
        period: ReportPeriod,
    ) -> Result<ProviderStats, ProviderError> {
        let mut stats = TaskStats::default();
        for list in self.lists(access_token).await?.iter().take(MAX_LISTS) {
            let url = format!("{}/lists/{}/tasks", self.base_url, list.id);
            let tasks: Tasks = get_json(
                &self.http,
                Provider::GoogleTasks,
                &url,
                access_token,
                &[
                    ("showCompleted", "true".into()),
                    ("showHidden", "true".into()),
                    ("maxResults", "100".into()),
                ],
            )
            .await?;
            tally(&mut stats, &tasks.items, period);
        }
        Ok(ProviderStats::GoogleTasks(stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_stats_across_lists() {
        let mut server = mockito::Server::new_async().await;
        let _lists = server
            .mock("GET", "/users/@me/lists")
            .with_status(200)
            .with_body(r#"{"items":[{"id":"work","title":"Work"},{"id":"home","title":"Home"}]}"#)
            .create_async()
            .await;
        let _work = server
            .mock("GET", "/lists/work/tasks")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"items":[
                    {"status":"completed","completed":"2026-03-01T15:00:00Z"},
                    {"status":"completed","completed":"2026-02-20T15:00:00Z"},
                    {"status":"needsAction","due":"2026-02-27T00:00:00.000Z"}
                ]}"#,
            )
            .create_async()
            .await;
        let _home = server
            .mock("GET", "/lists/home/tasks")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"items":[
                    {"status":"needsAction","due":"2026-03-10T00:00:00.000Z"},
                    {"status":"needsAction"}
                ]}"#,
            )
            .create_async()
            .await;

        let adapter = GoogleTasksAdapter::with_base_url(Client::new(), server.url());
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let stats = adapter
            .get_stats("t", ReportPeriod { start: date, end: date })
            .await
            .unwrap();

        match stats {
            ProviderStats::GoogleTasks(s) => {
                assert_eq!(s.completed_in_period, 1);
                assert_eq!(s.open, 3);
                assert_eq!(s.overdue, 1);
            }
            other => panic!("unexpected stats: {:?}", other),
        }
    }
}
