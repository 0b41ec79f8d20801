use std::time::Duration;

use serde::Serialize;

use crate::domain::repository::Mailer;
use crate::domain::types::EmailMessage;
use crate::error::MailError;

#[derive(Debug, Clone, Serialize)]
struct MailAddress {
    email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailBody<'a> {
    sender: &'a MailAddress,
    to: [MailAddress; 1],
    subject: &'a str,
    text_content: &'a str,
}

/// Transactional-mail client speaking the Brevo-style HTTP API
/// (`api-key` header, JSON body, 2xx = accepted).
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    sender: MailAddress,
}

impl HttpMailer {
    pub fn new(
        timeout: Duration,
        api_url: String,
        api_key: String,
        sender_email: String,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            api_key,
            sender: MailAddress {
                email: sender_email,
            },
        })
    }
}

impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let body = SendEmailBody {
            sender: &self.sender,
            to: [MailAddress {
                email: message.to.clone(),
            }],
            subject: &message.subject,
            text_content: &message.body,
        };
        let response = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(MailError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}
