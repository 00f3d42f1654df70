//! Slack implementation of the platform client and event feed.
//!
//! [`SlackApiClient`] talks to the Web API. [`SlackEventFeed`] turns signed
//! webhook requests (Events API JSON or interactive form posts) into
//! [`IncomingEvent`]s. The HTTP listener itself belongs to the embedding
//! binary: it passes the `x-slack-request-timestamp` and `x-slack-signature`
//! headers and the raw body to [`SlackEventFeed::ingest`].

pub mod api;
pub mod events;
pub mod signature;

use std::sync::Arc;

use crate::config::SlackConfig;
use crate::error::PlatformError;
use crate::traits::EventHandler;
use crate::types::IncomingEvent;

pub use api::SlackApiClient;

/// What a webhook request turned out to be.
#[derive(Debug)]
pub enum Inbound {
    /// URL verification; respond with this body.
    Challenge(String),
    Event(IncomingEvent),
    /// Valid request the operator does not act on.
    Ignored,
}

/// Verifies and decodes inbound Slack webhook requests.
pub struct SlackEventFeed {
    signing_secret: Option<String>,
    bot_user_id: Option<String>,
}

impl SlackEventFeed {
    pub fn new(config: &SlackConfig) -> Self {
        if config.signing_secret.is_none() {
            tracing::warn!("No Slack signing secret configured, webhook requests are not verified");
        }
        Self {
            signing_secret: config.signing_secret.clone(),
            bot_user_id: config.bot_user_id.clone(),
        }
    }

    pub fn ingest(
        &self,
        timestamp: &str,
        signature: &str,
        body: &[u8],
    ) -> Result<Inbound, PlatformError> {
        if let Some(ref secret) = self.signing_secret {
            signature::verify_slack_signature(secret, timestamp, body, signature)?;
        }

        let is_json = body
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|b| *b == b'{');
        if !is_json {
            return Ok(match events::parse_interactive_form(body)? {
                Some(event) => Inbound::Event(event),
                None => Inbound::Ignored,
            });
        }

        let envelope: events::SlackEnvelope = serde_json::from_slice(body)
            .map_err(|e| PlatformError::ParseError(format!("envelope: {}", e)))?;
        match envelope {
            events::SlackEnvelope::UrlVerification { challenge } => {
                Ok(Inbound::Challenge(challenge))
            }
            events::SlackEnvelope::EventCallback { event, .. } => {
                Ok(match events::parse_event(&event, self.bot_user_id.as_deref())? {
                    Some(event) => Inbound::Event(event),
                    None => Inbound::Ignored,
                })
            }
        }
    }

    /// Ingest a request and hand any event to `handler` on a new task.
    ///
    /// Returns the body the webhook should answer with. Slack retries
    /// requests that take longer than three seconds, so the handler is
    /// never awaited here.
    pub fn accept(
        &self,
        handler: Arc<dyn EventHandler>,
        timestamp: &str,
        signature: &str,
        body: &[u8],
    ) -> Result<String, PlatformError> {
        match self.ingest(timestamp, signature, body) {
            Ok(Inbound::Challenge(challenge)) => Ok(challenge),
            Ok(Inbound::Event(event)) => {
                tokio::spawn(async move {
                    let disposition = handler.handle_event(event).await;
                    tracing::trace!(?disposition, "Event handled");
                });
                Ok(String::new())
            }
            Ok(Inbound::Ignored) => Ok(String::new()),
            Err(e) => {
                tracing::warn!(error = %e, "Rejected Slack request");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::operator::Disposition;
    use crate::types::EventKind;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    fn feed(secret: Option<&str>) -> SlackEventFeed {
        SlackEventFeed::new(&SlackConfig {
            signing_secret: secret.map(str::to_string),
            bot_user_id: Some("UBOT".to_string()),
            ..SlackConfig::default()
        })
    }

    fn signed(body: &str) -> (String, String) {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let sig = signature::compute_signature(SECRET, &timestamp, body.as_bytes()).unwrap();
        (timestamp, sig)
    }

    const JOIN: &str = r#"{
        "type": "event_callback",
        "team_id": "T1",
        "event_id": "Ev1",
        "event": {"type": "message", "subtype": "channel_join", "channel": "C1", "user": "U1",
                  "text": "<@U1> has joined the channel", "ts": "1.1", "channel_type": "channel"}
    }"#;

    #[test]
    fn challenge_is_answered() {
        let body = r#"{"type":"url_verification","challenge":"3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"}"#;
        let (ts, sig) = signed(body);
        match feed(Some(SECRET)).ingest(&ts, &sig, body.as_bytes()).unwrap() {
            Inbound::Challenge(c) => assert!(c.starts_with("3eZbrw")),
            other => panic!("expected challenge, got: {:?}", other),
        }
    }

    #[test]
    fn signed_event_is_decoded() {
        let (ts, sig) = signed(JOIN);
        match feed(Some(SECRET)).ingest(&ts, &sig, JOIN.as_bytes()).unwrap() {
            Inbound::Event(event) => {
                assert_eq!(event.kind, EventKind::ChannelJoin);
                assert_eq!(event.user_id, "U1");
            }
            other => panic!("expected event, got: {:?}", other),
        }
    }

    #[test]
    fn bad_signature_is_rejected() {
        let (ts, _) = signed(JOIN);
        assert!(matches!(
            feed(Some(SECRET)).ingest(&ts, "v0=00", JOIN.as_bytes()),
            Err(PlatformError::SignatureInvalid(_))
        ));
        // Without a secret nothing is checked.
        assert!(feed(None).ingest("", "", JOIN.as_bytes()).is_ok());
    }

    #[test]
    fn interactive_form_is_decoded() {
        let payload = serde_json::json!({
            "type": "interactive_message",
            "callback_id": "publicar_oferta",
            "channel": {"id": "C1"},
            "user": {"id": "U1"},
            "message_ts": "1.1"
        });
        let body = serde_urlencoded::to_string([("payload", payload.to_string())]).unwrap();
        match feed(None).ingest("", "", body.as_bytes()).unwrap() {
            Inbound::Event(event) => assert_eq!(event.kind, EventKind::InteractiveCallback),
            other => panic!("expected event, got: {:?}", other),
        }
    }

    struct Forward(mpsc::UnboundedSender<IncomingEvent>);

    #[async_trait]
    impl EventHandler for Forward {
        async fn handle_event(&self, event: IncomingEvent) -> Disposition {
            let _ = self.0.send(event);
            Disposition::CallbackLogged
        }
    }

    #[tokio::test]
    async fn accept_hands_event_to_handler() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let body = feed(None)
            .accept(Arc::new(Forward(tx)), "", "", JOIN.as_bytes())
            .unwrap();
        assert!(body.is_empty());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.channel_id, "C1");
    }
}
