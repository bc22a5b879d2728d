//! Minimal Telegram Bot API client shared by the alert notifier and the
//! operator bot.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram {method} failed with HTTP {status}: {description}")]
    Api {
        method: &'static str,
        status: u16,
        description: String,
    },
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotCommand {
    pub command: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<T>(&self, method: &'static str, payload: Value) -> Result<T, TelegramError>
    where
        T: DeserializeOwned + Default,
    {
        let response = self
            .http
            .post(self.endpoint(method))
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body: ApiResponse<T> = match response.json().await {
            Ok(body) => body,
            Err(err) if status.is_success() => return Err(err.into()),
            Err(_) => {
                return Err(TelegramError::Api {
                    method,
                    status: status.as_u16(),
                    description: "unreadable response body".into(),
                })
            }
        };
        if !status.is_success() || !body.ok {
            return Err(TelegramError::Api {
                method,
                status: status.as_u16(),
                description: body.description.unwrap_or_default(),
            });
        }
        Ok(body.result.unwrap_or_default())
    }

    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<(), TelegramError> {
        let mut payload = json!({ "chat_id": chat_id, "text": text });
        if let Some(mode) = parse_mode {
            payload["parse_mode"] = json!(mode);
        }
        self.call::<Value>("sendMessage", payload).await?;
        Ok(())
    }

    /// Long-polls for updates newer than `offset`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let mut payload = json!({ "timeout": timeout_secs });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }
        self.call("getUpdates", payload).await
    }

    pub async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), TelegramError> {
        self.call::<Value>("setMyCommands", json!({ "commands": commands }))
            .await?;
        Ok(())
    }
}
