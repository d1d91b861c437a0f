//! Outbound bot transport.
//!
//! The wizard edits one tracked message per conversation; only submit and
//! cancel confirmations are separate sends. The orchestrator treats every
//! transport failure as non-fatal: session state stays authoritative and
//! the next interaction re-renders it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use fixbot_shared::render::WizardView;

use crate::config::BotConfig;

#[async_trait]
pub trait BotTransport: Send + Sync {
    /// Post a fresh wizard message, returning the platform message id the
    /// session will be keyed by.
    async fn send_wizard(&self, chat_id: &str, view: &WizardView) -> Result<String>;

    /// Edit the tracked wizard message in place.
    async fn edit_wizard(&self, chat_id: &str, message_id: &str, view: &WizardView) -> Result<()>;

    /// Post a permanent plain-text message (submit confirmation, cancel
    /// notice).
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    chat_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<&'a str>,
    text: &'a str,
    buttons: Vec<OutboundButton<'a>>,
}

#[derive(Debug, Serialize)]
struct OutboundButton<'a> {
    label: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
}

/// HTTP client for the chat platform's bot API.
pub struct HttpBotTransport {
    client: reqwest::Client,
    base: String,
}

impl HttpBotTransport {
    pub fn new(config: &BotConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build bot HTTP client")?;
        Ok(Self {
            client,
            base: format!(
                "{}/bot{}",
                config.api_base.trim_end_matches('/'),
                config.token
            ),
        })
    }

    fn view_buttons(view: &WizardView) -> Vec<OutboundButton<'_>> {
        view.options
            .iter()
            .map(|o| OutboundButton {
                label: &o.label,
                data: &o.data,
            })
            .collect()
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &OutboundMessage<'_>,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base, method);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Bot API request failed: {}", method))?
            .error_for_status()
            .with_context(|| format!("Bot API rejected {}", method))?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl BotTransport for HttpBotTransport {
    async fn send_wizard(&self, chat_id: &str, view: &WizardView) -> Result<String> {
        let body = OutboundMessage {
            chat_id,
            message_id: None,
            text: &view.text,
            buttons: Self::view_buttons(view),
        };
        let response: SendResponse = self.post("sendMessage", &body).await?;
        Ok(response.message_id)
    }

    async fn edit_wizard(&self, chat_id: &str, message_id: &str, view: &WizardView) -> Result<()> {
        let body = OutboundMessage {
            chat_id,
            message_id: Some(message_id),
            text: &view.text,
            buttons: Self::view_buttons(view),
        };
        let _: serde_json::Value = self.post("editMessage", &body).await?;
        Ok(())
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        let body = OutboundMessage {
            chat_id,
            message_id: None,
            text,
            buttons: vec![],
        };
        let _: serde_json::Value = self.post("sendMessage", &body).await?;
        Ok(())
    }
}
