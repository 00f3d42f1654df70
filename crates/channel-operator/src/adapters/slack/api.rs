//! Slack Web API client.
//!
//! Every method posts to `{api_base}/{method}` with a bearer token. Slack
//! answers HTTP 200 with `"ok": false` on failure; those become
//! [`PlatformError::Api`].

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::SlackConfig;
use crate::error::PlatformError;
use crate::traits::PlatformClient;
use crate::types::{Channel, DeliveryReceipt, OutboundMessage, User};

/// Slack Web API client.
#[derive(Clone)]
pub struct SlackApiClient {
    client: reqwest::Client,
    bot_token: String,
    admin_token: Option<String>,
    api_base: String,
}

/// Response from Slack's `auth.test` API.
#[derive(Debug, Default, Deserialize)]
pub struct AuthTestResponse {
    pub team: Option<String>,
    pub team_id: Option<String>,
    pub url: Option<String>,
    pub user: Option<String>,
    pub user_id: Option<String>,
    pub bot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Default, Deserialize)]
struct PostedMessage {
    channel: Option<String>,
    ts: Option<String>,
    message_ts: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UserInfo {
    user: Option<User>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelInfo {
    channel: Option<Channel>,
}

#[derive(Debug, Default, Deserialize)]
struct Empty {}

enum Payload<'a> {
    Json(serde_json::Value),
    Form(&'a [(&'a str, &'a str)]),
}

impl SlackApiClient {
    pub fn new(config: &SlackConfig) -> Result<Self, PlatformError> {
        if config.bot_token.is_empty() {
            return Err(PlatformError::Config(
                "bot token cannot be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PlatformError::Config(format!("HTTP client init: {}", e)))?;

        Ok(Self {
            client,
            bot_token: config.bot_token.clone(),
            admin_token: config.admin_token.clone().filter(|t| !t.is_empty()),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Verify the bot token and get workspace info via `auth.test`.
    pub async fn auth_test(&self) -> Result<AuthTestResponse, PlatformError> {
        match self
            .call::<AuthTestResponse>("auth.test", &self.bot_token, Payload::Json(serde_json::json!({})))
            .await
        {
            Err(PlatformError::Api { error, .. }) => {
                Err(PlatformError::Auth(format!("auth.test rejected: {}", error)))
            }
            other => other,
        }
    }

    /// Token for deleting other members' messages.
    fn delete_token(&self) -> &str {
        self.admin_token.as_deref().unwrap_or(&self.bot_token)
    }

    async fn call<T>(
        &self,
        method: &str,
        token: &str,
        payload: Payload<'_>,
    ) -> Result<T, PlatformError>
    where
        T: DeserializeOwned,
    {
        let request = self
            .client
            .post(format!("{}/{}", self.api_base, method))
            .bearer_auth(token);
        let request = match payload {
            Payload::Json(body) => request.json(&body),
            Payload::Form(fields) => request.form(fields),
        };

        let resp = request
            .send()
            .await
            .map_err(|e| PlatformError::Connection(format!("{} failed: {}", method, e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PlatformError::Api {
                method: method.to_string(),
                error: format!("http status {}", status.as_u16()),
            });
        }

        let parsed: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(format!("{} parse: {}", method, e)))?;
        if !parsed.ok {
            return Err(PlatformError::Api {
                method: method.to_string(),
                error: parsed.error.unwrap_or_else(|| "unknown".to_string()),
            });
        }
        Ok(parsed.body)
    }
}

#[async_trait]
impl PlatformClient for SlackApiClient {
    async fn post_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<DeliveryReceipt, PlatformError> {
        let mut payload = serde_json::json!({
            "channel": message.channel_id,
            "text": message.content,
        });
        if let Some(ref thread_ts) = message.thread_id {
            payload["thread_ts"] = serde_json::Value::String(thread_ts.clone());
        }
        if let Some(ref attachments) = message.attachments {
            payload["attachments"] = attachments.clone();
        }

        let method = match (message.ephemeral, &message.user_id) {
            (true, Some(user)) => {
                payload["user"] = serde_json::Value::String(user.clone());
                "chat.postEphemeral"
            }
            (true, None) => {
                return Err(PlatformError::Config(
                    "ephemeral message without a recipient".to_string(),
                ))
            }
            (false, _) => "chat.postMessage",
        };

        let posted: PostedMessage = self
            .call(method, &self.bot_token, Payload::Json(payload))
            .await?;
        Ok(DeliveryReceipt {
            channel_id: posted
                .channel
                .unwrap_or_else(|| message.channel_id.clone()),
            message_ts: posted.ts.or(posted.message_ts),
            delivered_at: chrono::Utc::now(),
        })
    }

    async fn delete_message(&self, channel_id: &str, ts: &str) -> Result<(), PlatformError> {
        let _: Empty = self
            .call(
                "chat.delete",
                self.delete_token(),
                Payload::Json(serde_json::json!({"channel": channel_id, "ts": ts})),
            )
            .await?;
        Ok(())
    }

    async fn channel_info(&self, channel_id: &str) -> Result<Channel, PlatformError> {
        let info: ChannelInfo = self
            .call(
                "conversations.info",
                &self.bot_token,
                Payload::Form(&[("channel", channel_id)]),
            )
            .await?;
        info.channel
            .ok_or_else(|| PlatformError::ParseError("conversations.info: no channel".to_string()))
    }

    async fn user_info(&self, user_id: &str) -> Result<User, PlatformError> {
        let info: UserInfo = self
            .call(
                "users.info",
                &self.bot_token,
                Payload::Form(&[("user", user_id)]),
            )
            .await?;
        info.user
            .ok_or_else(|| PlatformError::ParseError("users.info: no user".to_string()))
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        ts: &str,
        name: &str,
    ) -> Result<(), PlatformError> {
        let _: Empty = self
            .call(
                "reactions.add",
                &self.bot_token,
                Payload::Json(serde_json::json!({"channel": channel_id, "timestamp": ts, "name": name})),
            )
            .await?;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel_id: &str,
        ts: &str,
        name: &str,
    ) -> Result<(), PlatformError> {
        let _: Empty = self
            .call(
                "reactions.remove",
                &self.bot_token,
                Payload::Json(serde_json::json!({"channel": channel_id, "timestamp": ts, "name": name})),
            )
            .await?;
        Ok(())
    }
}
