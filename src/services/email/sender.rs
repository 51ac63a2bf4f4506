use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use super::{EmailError, EmailMessage};

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    mime: &'static str,
    value: &'a str,
}

/// SendGrid v3 `mail/send` body.
#[derive(Serialize)]
struct SendGridPayload<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

/// Delivers messages through SendGrid. An empty API key makes every send fail
/// with [`EmailError::NotConfigured`] without a network call.
#[derive(Clone)]
pub struct EmailSender {
    client: Client,
    api_key: String,
    api_url: String,
    from_email: String,
    from_name: String,
}

impl EmailSender {
    pub fn new(client: Client, api_key: String, from_email: String, from_name: String) -> Self {
        Self {
            client,
            api_key,
            api_url: SENDGRID_SEND_URL.to_string(),
            from_email,
            from_name,
        }
    }

    #[cfg(test)]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[instrument(skip(self, message), fields(to = %message.to, subject = %message.subject))]
    pub async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if !self.is_configured() {
            return Err(EmailError::NotConfigured);
        }

        let payload = SendGridPayload {
            personalizations: vec![Personalization {
                to: vec![Address {
                    email: &message.to,
                    name: message.to_name.as_deref(),
                }],
            }],
            from: Address {
                email: &self.from_email,
                name: Some(&self.from_name),
            },
            subject: &message.subject,
            content: vec![Content {
                mime: "text/html",
                value: &message.html,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Network error while sending email");
                EmailError::Send(format!("network error: {}", e))
            })?;

        let status = response.status();
        if status.is_success() {
            info!("Email sent");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), body = %body, "Email provider rejected message");
        if status.as_u16() == 429 {
            Err(EmailError::RateLimited)
        } else if status.is_server_error() {
            Err(EmailError::ServiceUnavailable)
        } else {
            Err(EmailError::Send(format!("status {}: {}", status.as_u16(), body)))
        }
    }
}

impl std::fmt::Debug for EmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSender")
            .field("api_url", &self.api_url)
            .field("configured", &self.is_configured())
            .field("from_email", &self.from_email)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "ada@example.com".into(),
            to_name: Some("Ada".into()),
            subject: "Your daily report".into(),
            html: "<p>hello</p>".into(),
        }
    }

    fn sender(key: &str, url: &str) -> EmailSender {
        EmailSender::new(
            Client::new(),
            key.into(),
            "reports@wellboard.test".into(),
            "Wellboard".into(),
        )
        .with_api_url(url)
    }

    #[tokio::test]
    async fn test_send_posts_sendgrid_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v3/mail/send")
            .match_header("authorization", "Bearer sg-key")
            .match_body(Matcher::PartialJson(json!({
                "personalizations": [{ "to": [{ "email": "ada@example.com", "name": "Ada" }] }],
                "from": { "email": "reports@wellboard.test", "name": "Wellboard" },
                "subject": "Your daily report",
                "content": [{ "type": "text/html", "value": "<p>hello</p>" }]
            })))
            .with_status(202)
            .create_async()
            .await;

        let url = format!("{}/v3/mail/send", server.url());
        sender("sg-key", &url).send(&message()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_key_is_not_configured() {
        let err = sender("", "http://127.0.0.1:1/unused")
            .send(&message())
            .await
            .unwrap_err();
        assert!(matches!(err, EmailError::NotConfigured));
    }

    #[tokio::test]
    async fn test_rate_limit_and_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let _limited = server.mock("POST", "/limited").with_status(429).create_async().await;
        let _down = server.mock("POST", "/down").with_status(503).create_async().await;

        let err = sender("k", &format!("{}/limited", server.url()))
            .send(&message())
            .await
            .unwrap_err();
        assert!(matches!(err, EmailError::RateLimited));

        let err = sender("k", &format!("{}/down", server.url()))
            .send(&message())
            .await
            .unwrap_err();
        assert!(matches!(err, EmailError::ServiceUnavailable));
    }
}
