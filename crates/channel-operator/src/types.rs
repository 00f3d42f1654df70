use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A workspace member, as returned by `users.info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_owner: bool,
}

impl User {
    /// Admins and owners share every privilege the operator knows about.
    pub fn is_privileged(&self) -> bool {
        self.is_admin || self.is_owner
    }
}

/// A conversation, as returned by `conversations.info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_channel: bool,
    #[serde(default)]
    pub is_private: bool,
}

impl Channel {
    /// Public channels are the only ones whose traffic is audited.
    pub fn is_public_channel(&self) -> bool {
        self.is_channel && !self.is_private
    }
}

/// Event kinds the operator subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "user_channel_join")]
    ChannelJoin,
    #[serde(rename = "ambient")]
    Ambient,
    #[serde(rename = "direct_message")]
    DirectMessage,
    #[serde(rename = "interactive_message_callback")]
    InteractiveCallback,
}

impl EventKind {
    /// Name used by rule configuration in `event_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ChannelJoin => "user_channel_join",
            EventKind::Ambient => "ambient",
            EventKind::DirectMessage => "direct_message",
            EventKind::InteractiveCallback => "interactive_message_callback",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered by the platform feed, normalized for rule matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub kind: EventKind,
    pub channel_id: String,
    pub user_id: String,
    /// Platform timestamp of the triggering message; doubles as its id.
    pub ts: String,
    pub thread_ts: Option<String>,
    pub text: String,
    pub received_at: DateTime<Utc>,
    /// The event exactly as the platform sent it.
    pub raw: serde_json::Value,
}

/// A message to hand to the platform client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel_id: String,
    pub thread_id: Option<String>,
    pub content: String,
    pub attachments: Option<serde_json::Value>,
    /// Posted so that only `user_id` can see it.
    pub ephemeral: bool,
    pub user_id: Option<String>,
}

/// Receipt confirming a message was accepted by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub channel_id: String,
    pub message_ts: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_names_match_rule_vocabulary() {
        assert_eq!(EventKind::ChannelJoin.as_str(), "user_channel_join");
        assert_eq!(EventKind::Ambient.to_string(), "ambient");
        let json = serde_json::to_string(&EventKind::InteractiveCallback).unwrap();
        assert_eq!(json, "\"interactive_message_callback\"");
    }

    #[test]
    fn user_deserializes_from_users_info_shape() {
        let json = r#"{"id":"U1","name":"alice","is_admin":false,"is_owner":true,"tz":"America/Mexico_City"}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.name, "alice");
        assert!(user.is_privileged());
    }

    #[test]
    fn channel_visibility() {
        let json = r#"{"id":"C1","name":"general","is_channel":true,"is_private":false}"#;
        let channel: Channel = serde_json::from_str(json).unwrap();
        assert!(channel.is_public_channel());

        let im: Channel = serde_json::from_str(r#"{"id":"D1","is_im":true}"#).unwrap();
        assert!(!im.is_public_channel());
        assert!(im.name.is_empty());
    }
}
