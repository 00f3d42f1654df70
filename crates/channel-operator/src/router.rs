//! Turns a rule's response mode into concrete platform calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;
use crate::rules::{EventRule, RespondAs};
use crate::traits::PlatformClient;
use crate::types::{DeliveryReceipt, IncomingEvent, OutboundMessage, User};

/// Where and how one rendered reply goes out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryIntent {
    /// Channel id, or the acting user's id for direct messages.
    pub target_id: String,
    pub thread_ts: Option<String>,
    pub whisper: bool,
    /// The acting user; the only one who sees a whisper.
    pub recipient_id: String,
    pub text: String,
    pub attachments: Option<serde_json::Value>,
}

impl DeliveryIntent {
    pub fn for_rule(rule: &EventRule, event: &IncomingEvent, text: String) -> Self {
        let target_id = match rule.respond_as {
            RespondAs::Dm => event.user_id.clone(),
            _ => event.channel_id.clone(),
        };
        let thread_ts = match rule.respond_as {
            RespondAs::Thread => Some(event.ts.clone()),
            _ => None,
        };

        Self {
            target_id,
            thread_ts,
            whisper: rule.respond_as == RespondAs::Whisper,
            recipient_id: event.user_id.clone(),
            text,
            attachments: rule.attachments.clone(),
        }
    }

    fn into_message(self) -> OutboundMessage {
        OutboundMessage {
            channel_id: self.target_id,
            thread_id: self.thread_ts,
            content: self.text,
            attachments: self.attachments,
            ephemeral: self.whisper,
            user_id: self.whisper.then_some(self.recipient_id),
        }
    }
}

/// What the delete-trigger directive ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The author is an admin or owner; their messages stay.
    Exempt,
}

pub struct DeliveryRouter {
    client: Arc<dyn PlatformClient>,
}

impl DeliveryRouter {
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self { client }
    }

    /// Deliver through exactly one path: a whisper or a regular post.
    pub async fn route(&self, intent: DeliveryIntent) -> Result<DeliveryReceipt, DeliveryError> {
        let target = intent.target_id.clone();
        let whisper = intent.whisper;
        let message = intent.into_message();

        let receipt = self
            .client
            .post_message(&message)
            .await
            .map_err(|source| DeliveryError::Send {
                target: target.clone(),
                source,
            })?;

        tracing::debug!(
            target = %target,
            whisper,
            threaded = message.thread_id.is_some(),
            "Delivered rule response"
        );
        Ok(receipt)
    }

    /// Remove the triggering message unless `author` is an admin or owner.
    ///
    /// Rule matching already filters by role; the exemption is enforced here
    /// regardless of how the directive was reached.
    pub async fn delete_trigger(
        &self,
        event: &IncomingEvent,
        author: &User,
    ) -> Result<DeleteOutcome, DeliveryError> {
        if author.is_privileged() {
            tracing::debug!(
                channel = %event.channel_id,
                user = %author.id,
                "Trigger author is privileged, not deleting"
            );
            return Ok(DeleteOutcome::Exempt);
        }

        self.client
            .delete_message(&event.channel_id, &event.ts)
            .await
            .map_err(|source| DeliveryError::Delete {
                channel: event.channel_id.clone(),
                ts: event.ts.clone(),
                source,
            })?;

        tracing::info!(
            channel = %event.channel_id,
            user = %author.id,
            ts = %event.ts,
            "Deleted trigger message"
        );
        Ok(DeleteOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::PlatformError;
    use crate::types::{Channel, EventKind};

    #[derive(Default)]
    struct RecordingClient {
        posted: Mutex<Vec<OutboundMessage>>,
        deleted: Mutex<Vec<(String, String)>>,
        fail_posts: bool,
    }

    #[async_trait]
    impl PlatformClient for RecordingClient {
        async fn post_message(
            &self,
            message: &OutboundMessage,
        ) -> Result<DeliveryReceipt, PlatformError> {
            if self.fail_posts {
                return Err(PlatformError::Api {
                    method: "chat.postMessage".to_string(),
                    error: "not_in_channel".to_string(),
                });
            }
            self.posted.lock().push(message.clone());
            Ok(DeliveryReceipt {
                channel_id: message.channel_id.clone(),
                message_ts: Some("2.0".to_string()),
                delivered_at: chrono::Utc::now(),
            })
        }
        async fn delete_message(&self, channel_id: &str, ts: &str) -> Result<(), PlatformError> {
            self.deleted
                .lock()
                .push((channel_id.to_string(), ts.to_string()));
            Ok(())
        }
        async fn channel_info(&self, _channel_id: &str) -> Result<Channel, PlatformError> {
            unreachable!()
        }
        async fn user_info(&self, _user_id: &str) -> Result<User, PlatformError> {
            unreachable!()
        }
        async fn add_reaction(&self, _c: &str, _ts: &str, _n: &str) -> Result<(), PlatformError> {
            Ok(())
        }
        async fn remove_reaction(
            &self,
            _c: &str,
            _ts: &str,
            _n: &str,
        ) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    fn event() -> IncomingEvent {
        IncomingEvent {
            kind: EventKind::Ambient,
            channel_id: "C1".to_string(),
            user_id: "U1".to_string(),
            ts: "1700000000.000100".to_string(),
            thread_ts: None,
            text: "hello".to_string(),
            received_at: chrono::Utc::now(),
            raw: serde_json::Value::Null,
        }
    }

    fn rule(respond_as: RespondAs) -> EventRule {
        EventRule {
            event_type: "ambient".to_string(),
            admins_only: false,
            users_only: false,
            respond_as,
            delete_trigger: false,
            text: String::new(),
            attachments: Some(serde_json::json!([{"fallback": "x"}])),
        }
    }

    fn member(is_admin: bool) -> User {
        User {
            id: "U1".to_string(),
            name: "member".to_string(),
            is_admin,
            is_owner: false,
        }
    }

    #[test]
    fn intent_targets_follow_respond_as() {
        let ev = event();

        let channel = DeliveryIntent::for_rule(&rule(RespondAs::Channel), &ev, "t".into());
        assert_eq!(channel.target_id, "C1");
        assert!(channel.thread_ts.is_none());
        assert!(!channel.whisper);

        let dm = DeliveryIntent::for_rule(&rule(RespondAs::Dm), &ev, "t".into());
        assert_eq!(dm.target_id, "U1");
        assert!(dm.thread_ts.is_none());

        let thread = DeliveryIntent::for_rule(&rule(RespondAs::Thread), &ev, "t".into());
        assert_eq!(thread.target_id, "C1");
        assert_eq!(thread.thread_ts.as_deref(), Some("1700000000.000100"));

        let whisper = DeliveryIntent::for_rule(&rule(RespondAs::Whisper), &ev, "t".into());
        assert_eq!(whisper.target_id, "C1");
        assert!(whisper.whisper);
        assert_eq!(whisper.recipient_id, "U1");
        assert!(whisper.attachments.is_some());
    }

    #[tokio::test]
    async fn whisper_and_post_are_mutually_exclusive() {
        let client = Arc::new(RecordingClient::default());
        let router = DeliveryRouter::new(client.clone());
        let ev = event();

        router
            .route(DeliveryIntent::for_rule(&rule(RespondAs::Whisper), &ev, "psst".into()))
            .await
            .unwrap();
        router
            .route(DeliveryIntent::for_rule(&rule(RespondAs::Channel), &ev, "hi".into()))
            .await
            .unwrap();

        let posted = client.posted.lock();
        assert_eq!(posted.len(), 2);
        assert!(posted[0].ephemeral);
        assert_eq!(posted[0].user_id.as_deref(), Some("U1"));
        assert!(!posted[1].ephemeral);
        assert!(posted[1].user_id.is_none());
    }

    #[tokio::test]
    async fn send_failure_becomes_delivery_error() {
        let client = Arc::new(RecordingClient {
            fail_posts: true,
            ..RecordingClient::default()
        });
        let router = DeliveryRouter::new(client);
        let err = router
            .route(DeliveryIntent::for_rule(&rule(RespondAs::Channel), &event(), "x".into()))
            .await
            .unwrap_err();
        match err {
            DeliveryError::Send { target, .. } => assert_eq!(target, "C1"),
            other => panic!("expected Send, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn delete_trigger_spares_privileged_authors() {
        let client = Arc::new(RecordingClient::default());
        let router = DeliveryRouter::new(client.clone());
        let ev = event();

        let outcome = router.delete_trigger(&ev, &member(true)).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Exempt);
        assert!(client.deleted.lock().is_empty());

        let outcome = router.delete_trigger(&ev, &member(false)).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(
            client.deleted.lock().as_slice(),
            &[("C1".to_string(), "1700000000.000100".to_string())]
        );
    }
}
