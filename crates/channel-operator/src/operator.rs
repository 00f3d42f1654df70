//! Rule matcher and dispatcher.
//!
//! Every platform event goes through [`ChannelOperator::handle`], which
//! switches on the event kind. Channel events resolve identities, pick the
//! channel's rules from the current snapshot and fan out one task per
//! permitted rule. Tasks are not awaited by the handler; each one catches
//! and logs its own delivery error. Direct messages are checked for the
//! reload command.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::audit::AuditLogger;
use crate::config::OperatorConfig;
use crate::error::ConfigError;
use crate::identity::{IdentityResolver, DEFAULT_CACHE_CAPACITY};
use crate::router::{DeleteOutcome, DeliveryIntent, DeliveryRouter};
use crate::rules::{FileRuleSource, RuleStore};
use crate::template;
use crate::traits::{EventHandler, PlatformClient};
use crate::types::{EventKind, IncomingEvent};

const REACTION_WORKING: &str = "thinking_face";
const REACTION_DONE: &str = "thumbsup";
const REACTION_FAILED: &str = "x";

/// Why an event produced no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The user or channel could not be looked up.
    IdentityUnavailable,
    /// Replies inside threads are not monitored.
    Threaded,
    Unmonitored,
    NoMatchingRule,
    /// A direct message that is not the reload command.
    NotACommand,
}

/// What the operator did with one event.
#[derive(Debug)]
pub enum Disposition {
    Skipped(SkipReason),
    Dispatched(Dispatch),
    Reloaded { channels: usize, rules: usize },
    /// The reload command came from someone who is not an admin or owner.
    ReloadDenied,
    /// The rule source was unreadable or malformed; previous rules stay active.
    ReloadFailed,
    /// Interactive callbacks are only logged.
    CallbackLogged,
}

impl Disposition {
    pub fn into_dispatch(self) -> Option<Dispatch> {
        match self {
            Disposition::Dispatched(dispatch) => Some(dispatch),
            _ => None,
        }
    }
}

/// Tasks started for one event's matching rules.
///
/// Dropping a `Dispatch` detaches the tasks; they still run to completion.
#[derive(Debug, Default)]
pub struct Dispatch {
    deliveries: Vec<JoinHandle<bool>>,
    deletion: Option<JoinHandle<Option<DeleteOutcome>>>,
    filtered: usize,
}

/// Result of every task in a [`Dispatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
    /// Matching rules skipped by the role filter.
    pub filtered: usize,
    /// `None` when no rule asked for deletion or the delete failed.
    pub deletion: Option<DeleteOutcome>,
}

impl Dispatch {
    /// Number of deliveries started.
    pub fn deliveries(&self) -> usize {
        self.deliveries.len()
    }

    pub fn filtered(&self) -> usize {
        self.filtered
    }

    pub fn deletes_trigger(&self) -> bool {
        self.deletion.is_some()
    }

    /// Wait for every started task.
    pub async fn settled(self) -> DispatchSummary {
        let mut summary = DispatchSummary {
            filtered: self.filtered,
            ..DispatchSummary::default()
        };

        for handle in self.deliveries {
            match handle.await {
                Ok(true) => summary.delivered += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "Rule delivery task aborted");
                    summary.failed += 1;
                }
            }
        }

        if let Some(handle) = self.deletion {
            summary.deletion = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(error = %e, "Delete task aborted");
                    None
                }
            };
        }

        summary
    }
}

/// The moderation bot core: rules, identities, delivery and audit.
pub struct ChannelOperator {
    client: Arc<dyn PlatformClient>,
    identities: IdentityResolver,
    rules: RuleStore,
    router: Arc<DeliveryRouter>,
    audit: Option<AuditLogger>,
    reload_command: String,
}

impl ChannelOperator {
    pub fn new(client: Arc<dyn PlatformClient>, rules: RuleStore) -> Self {
        Self {
            identities: IdentityResolver::new(client.clone(), DEFAULT_CACHE_CAPACITY),
            router: Arc::new(DeliveryRouter::new(client.clone())),
            client,
            rules,
            audit: None,
            reload_command: OperatorConfig::default().reload_command,
        }
    }

    /// Load rules from `config.rules_path` and apply the remaining settings.
    ///
    /// Auditing is attached separately with [`with_audit`](Self::with_audit).
    pub fn from_config(
        config: &OperatorConfig,
        client: Arc<dyn PlatformClient>,
    ) -> Result<Self, ConfigError> {
        let rules = RuleStore::load(Box::new(FileRuleSource::new(config.rules_path.clone())))?;
        Ok(Self::new(client, rules)
            .with_identity_cache_capacity(config.identity_cache_capacity)
            .with_reload_command(config.reload_command.clone()))
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_reload_command(mut self, command: impl Into<String>) -> Self {
        self.reload_command = command.into();
        self
    }

    /// Replace the identity cache with an empty one of the given size.
    pub fn with_identity_cache_capacity(mut self, capacity: usize) -> Self {
        self.identities = IdentityResolver::new(self.client.clone(), capacity);
        self
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn identities(&self) -> &IdentityResolver {
        &self.identities
    }

    pub async fn handle(&self, event: IncomingEvent) -> Disposition {
        match event.kind {
            EventKind::ChannelJoin | EventKind::Ambient => self.handle_channel_event(event).await,
            EventKind::DirectMessage => self.handle_direct_message(&event).await,
            EventKind::InteractiveCallback => {
                tracing::info!(
                    channel = %event.channel_id,
                    user = %event.user_id,
                    "Interactive callback received"
                );
                Disposition::CallbackLogged
            }
        }
    }

    async fn handle_channel_event(&self, event: IncomingEvent) -> Disposition {
        let channel = match self.identities.resolve_channel(&event.channel_id).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(event_type = %event.kind, error = %e, "Dropping event");
                return Disposition::Skipped(SkipReason::IdentityUnavailable);
            }
        };
        let user = match self.identities.resolve_user(&event.user_id).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(event_type = %event.kind, error = %e, "Dropping event");
                return Disposition::Skipped(SkipReason::IdentityUnavailable);
            }
        };

        if event.kind == EventKind::Ambient {
            if let Some(audit) = &self.audit {
                audit.record_event(&event, &user, &channel);
            }
        }

        if event.thread_ts.is_some() {
            tracing::debug!(channel = %channel.name, ts = %event.ts, "Ignoring threaded reply");
            return Disposition::Skipped(SkipReason::Threaded);
        }

        // One snapshot for the whole event, however long the tasks run.
        let table = self.rules.snapshot();
        if !table.is_monitored(&channel.name) {
            tracing::debug!(channel = %channel.name, "Channel not monitored");
            return Disposition::Skipped(SkipReason::Unmonitored);
        }

        let matching: Vec<_> = table
            .rules_for(&channel.name)
            .iter()
            .filter(|rule| rule.matches(event.kind))
            .collect();
        if matching.is_empty() {
            tracing::debug!(
                channel = %channel.name,
                event_type = %event.kind,
                "No rule for event"
            );
            return Disposition::Skipped(SkipReason::NoMatchingRule);
        }

        let event = Arc::new(event);
        let mut dispatch = Dispatch::default();

        // Only rules that may act on this author can delete the trigger.
        if matching
            .iter()
            .any(|rule| rule.delete_trigger && rule.permits(&user))
        {
            let router = self.router.clone();
            let event = event.clone();
            let author = user.clone();
            dispatch.deletion = Some(tokio::spawn(async move {
                match router.delete_trigger(&event, &author).await {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        tracing::warn!(error = %e, "Trigger deletion failed");
                        None
                    }
                }
            }));
        }

        let user_mention = self.client.mention_user(&user.id);
        let channel_mention = self.client.mention_channel(&channel.id);

        for (index, rule) in matching.into_iter().enumerate() {
            if !rule.permits(&user) {
                tracing::debug!(
                    channel = %channel.name,
                    user = %user.id,
                    rule = index,
                    admins_only = rule.admins_only,
                    users_only = rule.users_only,
                    "Rule filtered by role"
                );
                dispatch.filtered += 1;
                continue;
            }

            let text = template::render(&rule.text, &user_mention, &channel_mention);
            let intent = DeliveryIntent::for_rule(rule, &event, text);
            let router = self.router.clone();
            let channel_name = channel.name.clone();
            dispatch.deliveries.push(tokio::spawn(async move {
                match router.route(intent).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(channel = %channel_name, rule = index, error = %e, "Rule delivery failed");
                        false
                    }
                }
            }));
        }

        tracing::debug!(
            channel = %channel.name,
            event_type = %event.kind,
            deliveries = dispatch.deliveries(),
            filtered = dispatch.filtered(),
            delete = dispatch.deletes_trigger(),
            "Dispatched rules"
        );
        Disposition::Dispatched(dispatch)
    }

    async fn handle_direct_message(&self, event: &IncomingEvent) -> Disposition {
        if !self.is_reload_command(&event.text) {
            tracing::debug!(user = %event.user_id, "Direct message is not a command");
            return Disposition::Skipped(SkipReason::NotACommand);
        }

        let user = match self.identities.resolve_user(&event.user_id).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot authorize reload");
                return Disposition::Skipped(SkipReason::IdentityUnavailable);
            }
        };
        if !user.is_privileged() {
            tracing::info!(user = %user.id, "Reload refused for non-admin");
            return Disposition::ReloadDenied;
        }

        self.react(event, REACTION_WORKING).await;
        let result = self.rules.reload();
        self.unreact(event, REACTION_WORKING).await;

        match result {
            Ok(table) => {
                self.react(event, REACTION_DONE).await;
                Disposition::Reloaded {
                    channels: table.channel_count(),
                    rules: table.rule_count(),
                }
            }
            Err(_) => {
                self.react(event, REACTION_FAILED).await;
                Disposition::ReloadFailed
            }
        }
    }

    fn is_reload_command(&self, text: &str) -> bool {
        let command = self.reload_command.trim().to_lowercase();
        !command.is_empty() && text.to_lowercase().contains(&command)
    }

    async fn react(&self, event: &IncomingEvent, name: &str) {
        if let Err(e) = self
            .client
            .add_reaction(&event.channel_id, &event.ts, name)
            .await
        {
            tracing::warn!(reaction = name, error = %e, "Failed to add reaction");
        }
    }

    async fn unreact(&self, event: &IncomingEvent, name: &str) {
        if let Err(e) = self
            .client
            .remove_reaction(&event.channel_id, &event.ts, name)
            .await
        {
            tracing::warn!(reaction = name, error = %e, "Failed to remove reaction");
        }
    }
}

#[async_trait]
impl EventHandler for ChannelOperator {
    async fn handle_event(&self, event: IncomingEvent) -> Disposition {
        self.handle(event).await
    }
}
