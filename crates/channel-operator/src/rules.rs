//! Per-channel response rules and the hot-reloadable store that holds them.
//!
//! The active [`RuleTable`] sits behind an [`ArcSwap`]: readers take a
//! snapshot and keep it for as long as they need, a reload publishes a new
//! table in a single pointer swap. A reload that fails leaves the current
//! table in place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{EventKind, User};

/// How a rule's reply is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RespondAs {
    #[default]
    Channel,
    Dm,
    Thread,
    Whisper,
}

/// A configured reaction to one event type in one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEventRule")]
pub struct EventRule {
    pub event_type: String,
    pub admins_only: bool,
    pub users_only: bool,
    pub respond_as: RespondAs,
    pub delete_trigger: bool,
    /// Reply template; `{{user}}` and `{{channel}}` are substituted.
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<serde_json::Value>,
}

/// On-disk shape, accepting the older `event` key and `as_*` flags.
#[derive(Deserialize)]
struct RawEventRule {
    #[serde(alias = "event", default)]
    event_type: String,
    #[serde(default)]
    admins_only: bool,
    #[serde(default)]
    users_only: bool,
    #[serde(default)]
    respond_as: Option<RespondAs>,
    #[serde(default)]
    as_dm: bool,
    #[serde(default)]
    as_thread: bool,
    #[serde(default)]
    as_whisper: bool,
    #[serde(default)]
    delete_trigger: bool,
    #[serde(default)]
    text: String,
    #[serde(default)]
    attachments: Option<serde_json::Value>,
}

impl From<RawEventRule> for EventRule {
    fn from(raw: RawEventRule) -> Self {
        let respond_as = raw.respond_as.unwrap_or(if raw.as_whisper {
            RespondAs::Whisper
        } else if raw.as_thread {
            RespondAs::Thread
        } else if raw.as_dm {
            RespondAs::Dm
        } else {
            RespondAs::Channel
        });

        Self {
            event_type: raw.event_type,
            admins_only: raw.admins_only,
            users_only: raw.users_only,
            respond_as,
            delete_trigger: raw.delete_trigger,
            text: raw.text,
            attachments: raw.attachments,
        }
    }
}

impl EventRule {
    pub fn matches(&self, kind: EventKind) -> bool {
        self.event_type == kind.as_str()
    }

    /// Whether `actor` passes the rule's role filter.
    ///
    /// A rule that is both `admins_only` and `users_only` admits nobody.
    pub fn permits(&self, actor: &User) -> bool {
        if actor.is_privileged() {
            !self.users_only
        } else {
            !self.admins_only
        }
    }
}

/// Channel name to ordered rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleTable {
    channels: HashMap<String, Vec<EventRule>>,
}

impl RuleTable {
    pub fn new(channels: HashMap<String, Vec<EventRule>>) -> Self {
        Self { channels }
    }

    /// Rules for `channel_name` in configuration order; empty when unmonitored.
    pub fn rules_for(&self, channel_name: &str) -> &[EventRule] {
        self.channels
            .get(channel_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_monitored(&self, channel_name: &str) -> bool {
        self.channels.contains_key(channel_name)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn rule_count(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (channel, rules) in &self.channels {
            for (index, rule) in rules.iter().enumerate() {
                if rule.event_type.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "rule {} for channel '{}' has no event_type",
                        index, channel
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Where rule tables come from.
pub trait RuleSource: Send + Sync {
    fn load(&self) -> Result<RuleTable, ConfigError>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// Rules stored in a JSON file, or YAML when the extension says so.
pub struct FileRuleSource {
    path: PathBuf,
}

impl FileRuleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_yaml(&self) -> bool {
        matches!(
            self.path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        )
    }
}

impl RuleSource for FileRuleSource {
    fn load(&self) -> Result<RuleTable, ConfigError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;

        let parse_error = |message: String| ConfigError::Parse {
            path: self.path.clone(),
            message,
        };
        let table: RuleTable = if self.is_yaml() {
            serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?
        } else {
            serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?
        };

        Ok(table)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Owner of the active rule table.
pub struct RuleStore {
    source: Box<dyn RuleSource>,
    active: ArcSwap<RuleTable>,
}

impl RuleStore {
    /// Load the initial table. Fails if the source cannot produce one.
    pub fn load(source: Box<dyn RuleSource>) -> Result<Self, ConfigError> {
        let table = Self::fetch(source.as_ref())?;
        tracing::info!(
            source = %source.describe(),
            channels = table.channel_count(),
            rules = table.rule_count(),
            "Loaded channel rules"
        );
        Ok(Self {
            source,
            active: ArcSwap::from_pointee(table),
        })
    }

    /// Re-read the source and swap the new table in.
    ///
    /// On error the previous table stays active.
    pub fn reload(&self) -> Result<Arc<RuleTable>, ConfigError> {
        match Self::fetch(self.source.as_ref()) {
            Ok(table) => {
                let table = Arc::new(table);
                self.active.store(table.clone());
                tracing::info!(
                    source = %self.source.describe(),
                    channels = table.channel_count(),
                    rules = table.rule_count(),
                    "Reloaded channel rules"
                );
                Ok(table)
            }
            Err(e) => {
                tracing::warn!(
                    source = %self.source.describe(),
                    error = %e,
                    "Rule reload failed, keeping previous rules"
                );
                Err(e)
            }
        }
    }

    fn fetch(source: &dyn RuleSource) -> Result<RuleTable, ConfigError> {
        let table = source.load()?;
        table.validate()?;
        Ok(table)
    }

    /// The table in effect right now. Unaffected by later reloads.
    pub fn snapshot(&self) -> Arc<RuleTable> {
        self.active.load_full()
    }

    pub fn rules_for(&self, channel_name: &str) -> Vec<EventRule> {
        self.active.load().rules_for(channel_name).to_vec()
    }
}
