use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GatewayConfig;

pub const SECRET_HEADER: &str = "X-Webhook-Secret";

/// Body of `POST /webhook/message`
#[derive(Debug, Clone, Serialize)]
pub struct MessageWebhook {
    pub from_: String,
    pub sender: String,
    pub sender_name: String,
    pub body: String,
    pub timestamp: i64,
    pub is_direct: bool,
}

/// Body of `POST /webhook/poll-created`
#[derive(Debug, Clone, Serialize)]
pub struct PollCreatedWebhook {
    pub poll_id: String,
    pub wa_message_id: String,
}

/// Body of `POST /webhook/poll-vote`
#[derive(Debug, Clone, Serialize)]
pub struct PollVoteWebhook {
    pub wa_message_id: String,
    pub voter: String,
    pub voter_name: String,
    pub selected_options: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendResponse {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub poll: Option<PollPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollPayload {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub poll_id: Option<String>,
}

/// Client for the decision backend's webhook endpoints
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    secret: Option<String>,
    message_timeout: Duration,
}

impl BackendClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.bot_url.trim_end_matches('/').to_string(),
            secret: config.webhook_secret.clone(),
            message_timeout: Duration::from_secs(config.backend_timeout_secs),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forward a chat message. Bounded by the configured timeout.
    pub async fn forward_message(&self, message: &MessageWebhook) -> Result<BackendResponse> {
        let response = self
            .post("/webhook/message", message)
            .timeout(self.message_timeout)
            .send()
            .await
            .context("Failed to send message to backend")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Backend error ({}): {}", status, error_body);
        }

        let body = response
            .bytes()
            .await
            .context("Failed to read backend response")?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(BackendResponse::default());
        }

        serde_json::from_slice(&body).context("Failed to parse backend response")
    }

    /// Link a backend poll to the message that carries it.
    pub async fn link_poll(&self, link: &PollCreatedWebhook) -> Result<()> {
        let response = self
            .post("/webhook/poll-created", link)
            .send()
            .await
            .context("Failed to send poll link to backend")?;
        ensure_success(response).await
    }

    pub async fn forward_vote(&self, vote: &PollVoteWebhook) -> Result<()> {
        let response = self
            .post("/webhook/poll-vote", vote)
            .send()
            .await
            .context("Failed to send poll vote to backend")?;
        ensure_success(response).await
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let request = self.client.post(&url).json(body);
        match &self.secret {
            Some(secret) => request.header(SECRET_HEADER, secret),
            None => request,
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        anyhow::bail!("Backend error ({}): {}", status, error_body);
    }
    Ok(())
}

/// Why a backend call failed, for operator hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unreachable,
    TimedOut,
    Other,
}

pub fn classify(error: &anyhow::Error) -> FailureKind {
    let reqwest_error = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<reqwest::Error>());

    match reqwest_error {
        Some(e) if e.is_connect() => FailureKind::Unreachable,
        Some(e) if e.is_timeout() => FailureKind::TimedOut,
        _ => FailureKind::Other,
    }
}
