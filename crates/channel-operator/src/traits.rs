use async_trait::async_trait;

use crate::error::PlatformError;
use crate::operator::Disposition;
use crate::types::{Channel, DeliveryReceipt, IncomingEvent, OutboundMessage, User};

/// Capabilities the operator needs from a messaging platform.
///
/// The Slack implementation lives in `adapters::slack`; tests provide
/// in-memory fakes.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Post a message, or an ephemeral one when `message.ephemeral` is set.
    async fn post_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<DeliveryReceipt, PlatformError>;

    /// Remove a message from a channel.
    async fn delete_message(&self, channel_id: &str, ts: &str) -> Result<(), PlatformError>;

    async fn channel_info(&self, channel_id: &str) -> Result<Channel, PlatformError>;

    async fn user_info(&self, user_id: &str) -> Result<User, PlatformError>;

    async fn add_reaction(&self, channel_id: &str, ts: &str, name: &str)
        -> Result<(), PlatformError>;

    async fn remove_reaction(
        &self,
        channel_id: &str,
        ts: &str,
        name: &str,
    ) -> Result<(), PlatformError>;

    /// Markup that renders as a mention of the user.
    fn mention_user(&self, user_id: &str) -> String {
        format!("<@{}>", user_id)
    }

    /// Markup that renders as a link to the channel.
    fn mention_channel(&self, channel_id: &str) -> String {
        format!("<#{}>", channel_id)
    }
}

/// Consumer of the platform event feed.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: IncomingEvent) -> Disposition;
}
