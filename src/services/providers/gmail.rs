use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{get_json, ProviderAdapter, ProviderError, ProviderProfile, ProviderStats};
use crate::models::integration_token::Provider;
use crate::models::report::ReportPeriod;

const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1";

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GmailStats {
    pub unread_inbox: i64,
    pub total_inbox: i64,
    pub received_in_period: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailProfile {
    email_address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Label {
    #[serde(default)]
    messages_total: i64,
    #[serde(default)]
    messages_unread: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    result_size_estimate: i64,
}

pub struct GmailAdapter {
    http: Client,
    base_url: String,
}

impl GmailAdapter {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, GMAIL_API)
    }

    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for GmailAdapter {
    fn provider(&self) -> Provider {
        Provider::Gmail
    }

    async fn get_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let url = format!("{}/users/me/profile", self.base_url);
        let profile: GmailProfile = get_json(&self.http, Provider::Gmail, &url, access_token, &[]).await?;
        Ok(ProviderProfile {
            account: profile.email_address,
            display_name: None,
        })
    }

    async fn get_stats(
        &self,
        access_token: &str,
        period: ReportPeriod,
    ) -> Result<ProviderStats, ProviderError> {
        let url = format!("{}/users/me/labels/INBOX", self.base_url);
        let inbox: Label = get_json(&self.http, Provider::Gmail, &url, access_token, &[]).await?;

        // Gmail search accepts epoch seconds for after/before.
        let query = format!(
            "after:{} before:{}",
            period.start_utc().timestamp(),
            period.end_utc_exclusive().timestamp()
        );
        let url = format!("{}/users/me/messages", self.base_url);
        let received: MessageList = get_json(
            &self.http,
            Provider::Gmail,
            &url,
            access_token,
            &[("q", query), ("maxResults", "500".into())],
        )
        .await?;

        Ok(ProviderStats::Gmail(GmailStats {
            unread_inbox: inbox.messages_unread,
            total_inbox: inbox.messages_total,
            received_in_period: received.result_size_estimate,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_stats_combine_inbox_and_period_search() {
        let mut server = mockito::Server::new_async().await;
        let _inbox = server
            .mock("GET", "/users/me/labels/INBOX")
            .match_header("authorization", "Bearer gmail-token")
            .with_status(200)
            .with_body(r#"{"id":"INBOX","messagesTotal":1200,"messagesUnread":37}"#)
            .create_async()
            .await;
        // 2026-03-01T00:00:00Z .. 2026-03-02T00:00:00Z
        let search = server
            .mock("GET", "/users/me/messages")
            .match_query(Matcher::UrlEncoded(
                "q".into(),
                "after:1772323200 before:1772409600".into(),
            ))
            .with_status(200)
            .with_body(r#"{"messages":[{"id":"a"},{"id":"b"}],"resultSizeEstimate":42}"#)
            .create_async()
            .await;

        let adapter = GmailAdapter::with_base_url(Client::new(), server.url());
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let stats = adapter
            .get_stats("gmail-token", ReportPeriod { start: date, end: date })
            .await
            .unwrap();

        search.assert_async().await;
        match stats {
            ProviderStats::Gmail(s) => {
                assert_eq!(s.unread_inbox, 37);
                assert_eq!(s.total_inbox, 1200);
                assert_eq!(s.received_in_period, 42);
            }
            other => panic!("unexpected stats: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_profile_returns_email_address() {
        let mut server = mockito::Server::new_async().await;
        let _profile = server
            .mock("GET", "/users/me/profile")
            .with_status(200)
            .with_body(r#"{"emailAddress":"ada@example.com","messagesTotal":5}"#)
            .create_async()
            .await;

        let adapter = GmailAdapter::with_base_url(Client::new(), server.url());
        let profile = adapter.get_profile("t").await.unwrap();
        assert_eq!(profile.account, "ada@example.com");
    }
}
