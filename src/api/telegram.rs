use crate::error::NotifyError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Delivers a text message to a chat.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), NotifyError>;
}

/// A notifier bound to the chat it talks to.
#[derive(Clone)]
pub struct Recipient {
    pub notifier: Arc<dyn Notifier>,
    pub chat_id: i64,
}

impl Recipient {
    pub fn new(notifier: Arc<dyn Notifier>, chat_id: i64) -> Self {
        Self { notifier, chat_id }
    }

    pub async fn send(&self, text: &str) -> Result<(), NotifyError> {
        self.notifier.send(self.chat_id, text).await
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

pub struct Telegram {
    client: Client,
    base_url: String,
}

impl Telegram {
    pub fn new(token: &str) -> Self {
        Self::with_base_url("https://api.telegram.org", token)
    }

    pub fn with_base_url(api_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        }
    }
}

#[async_trait]
impl Notifier for Telegram {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/sendMessage", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage { chat_id, text })
            .send()
            .await?;
        // Telegram reports failures in the body, including on 4xx.
        let body = response.json::<ApiResponse>().await?;
        if body.ok {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                chat_id,
                description: body.description.unwrap_or_else(|| "no description".to_string()),
            })
        }
    }
}
