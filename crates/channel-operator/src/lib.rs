//! Rule-driven moderation core for Slack communities.
//!
//! Watches channel joins and ambient messages, matches them against
//! per-channel response rules and replies in the channel, by direct message,
//! in a thread or as a whisper. Rules can also delete the triggering message
//! for non-admins. Public channel traffic is written to an audit table.
//!
//! # Components
//! - [`RuleStore`]: hot-reloadable rule table (`recarga mensajes` from an admin DM)
//! - [`IdentityResolver`]: LRU-bounded user and channel lookups
//! - [`ChannelOperator`]: matcher and dispatcher, one task per matching rule
//! - [`DeliveryRouter`]: channel / DM / thread / whisper delivery and trigger deletion
//! - [`AuditLogger`]: fire-and-forget audit writer with fixed-delay reconnects
//!
//! # Features
//! - `slack` (default): Slack Web API client and webhook event feed
//! - `mysql` (default): MySQL audit store

pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod operator;
pub mod router;
pub mod rules;
pub mod template;
pub mod traits;
pub mod types;

pub mod adapters;

// Re-export core types
pub use audit::{AuditConnection, AuditConnector, AuditLogger, AuditRecord, AuditSettings};
pub use config::{AuditConfig, OperatorConfig, SlackConfig};
pub use error::{
    ConfigError, DeliveryError, IdentityKind, IdentityLookupError, PersistenceError, PlatformError,
};
pub use identity::IdentityResolver;
pub use operator::{ChannelOperator, Dispatch, DispatchSummary, Disposition, SkipReason};
pub use router::{DeleteOutcome, DeliveryIntent, DeliveryRouter};
pub use rules::{EventRule, FileRuleSource, RespondAs, RuleSource, RuleStore, RuleTable};
pub use traits::{EventHandler, PlatformClient};
pub use types::{Channel, DeliveryReceipt, EventKind, IncomingEvent, OutboundMessage, User};

#[cfg(feature = "mysql")]
pub use audit::MySqlConnector;

#[cfg(feature = "slack")]
pub use adapters::slack::{Inbound, SlackApiClient, SlackEventFeed};
