//! Slack Events API and interactive-message payload parsing.
//!
//! Message events become ambient messages, direct messages or channel joins
//! depending on `channel_type` and `subtype`. Interactive button clicks
//! arrive form-encoded with the JSON in a `payload` field.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;

use crate::error::PlatformError;
use crate::types::{EventKind, IncomingEvent};

/// Top-level Slack Events API envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEnvelope {
    /// Sent once while configuring the request URL.
    UrlVerification { challenge: String },
    EventCallback {
        #[serde(default)]
        team_id: String,
        #[serde(default)]
        event_id: String,
        /// Kept raw; it is what the audit trail stores.
        event: serde_json::Value,
    },
}

/// The subset of event types the operator listens to.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    Message {
        channel: String,
        user: Option<String>,
        #[serde(default)]
        text: String,
        ts: String,
        thread_ts: Option<String>,
        bot_id: Option<String>,
        subtype: Option<String>,
        channel_type: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
struct InteractivePayload {
    #[serde(rename = "type")]
    payload_type: String,
    #[serde(default)]
    callback_id: String,
    channel: Option<IdRef>,
    user: Option<IdRef>,
    message_ts: Option<String>,
    action_ts: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct IdRef {
    id: String,
}

/// Normalize the `event` of an `event_callback`.
///
/// Returns `None` for events the operator does not act on: bot messages,
/// edits and other subtypes, and messages that mention `bot_user_id`.
pub fn parse_event(
    event: &serde_json::Value,
    bot_user_id: Option<&str>,
) -> Result<Option<IncomingEvent>, PlatformError> {
    let parsed: SlackEvent = serde_json::from_value(event.clone())
        .map_err(|e| PlatformError::ParseError(format!("event: {}", e)))?;

    let SlackEvent::Message {
        channel,
        user,
        text,
        ts,
        thread_ts,
        bot_id,
        subtype,
        channel_type,
    } = parsed
    else {
        return Ok(None);
    };

    let Some(user) = user else {
        return Ok(None);
    };
    if bot_id.is_some() {
        return Ok(None);
    }

    let kind = match subtype.as_deref() {
        Some("channel_join") => EventKind::ChannelJoin,
        Some(_) => return Ok(None),
        None if channel_type.as_deref() == Some("im") => EventKind::DirectMessage,
        None => {
            if let Some(bot) = bot_user_id {
                if text.contains(&format!("<@{}", bot)) {
                    return Ok(None);
                }
            }
            EventKind::Ambient
        }
    };

    Ok(Some(IncomingEvent {
        kind,
        channel_id: channel,
        user_id: user,
        ts,
        thread_ts,
        text,
        received_at: Utc::now(),
        raw: event.clone(),
    }))
}

/// Decode a form-encoded interactive request body.
pub fn parse_interactive_form(body: &[u8]) -> Result<Option<IncomingEvent>, PlatformError> {
    let form: HashMap<String, String> = serde_urlencoded::from_bytes(body)
        .map_err(|e| PlatformError::ParseError(format!("form body: {}", e)))?;
    let payload = form
        .get("payload")
        .ok_or_else(|| PlatformError::ParseError("form body has no payload".to_string()))?;
    let raw: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| PlatformError::ParseError(format!("payload: {}", e)))?;
    parse_interactive_payload(&raw)
}

fn parse_interactive_payload(
    raw: &serde_json::Value,
) -> Result<Option<IncomingEvent>, PlatformError> {
    let payload: InteractivePayload = serde_json::from_value(raw.clone())
        .map_err(|e| PlatformError::ParseError(format!("payload: {}", e)))?;
    if payload.payload_type != "interactive_message" {
        return Ok(None);
    }

    let (Some(channel), Some(user)) = (payload.channel, payload.user) else {
        return Err(PlatformError::ParseError(
            "interactive payload without channel or user".to_string(),
        ));
    };

    Ok(Some(IncomingEvent {
        kind: EventKind::InteractiveCallback,
        channel_id: channel.id,
        user_id: user.id,
        ts: payload
            .message_ts
            .or(payload.action_ts)
            .unwrap_or_default(),
        thread_ts: None,
        text: payload.callback_id,
        received_at: Utc::now(),
        raw: raw.clone(),
    }))
}
