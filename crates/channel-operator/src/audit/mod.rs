//! Best-effort audit trail of public channel traffic.
//!
//! A single writer task owns the store connection. Callers hand records over
//! through a bounded queue and never wait for the write. When the connection
//! drops the writer reconnects at a fixed interval, forever; records that
//! were in flight when the connection dropped are lost. Any other store error
//! stops the writer and is returned through its join handle.

#[cfg(feature = "mysql")]
pub mod mysql;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::AuditConfig;
use crate::error::PersistenceError;
use crate::types::{Channel, IncomingEvent, User};

#[cfg(feature = "mysql")]
pub use mysql::MySqlConnector;

/// One row of the audit table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Event timestamp.
    pub id: String,
    pub room_id: String,
    pub room_name: String,
    pub text: String,
    pub user_id: String,
    pub user_name: String,
    pub url: String,
    pub json: String,
}

impl AuditRecord {
    pub fn from_event(
        event: &IncomingEvent,
        user: &User,
        channel: &Channel,
        team_domain: &str,
    ) -> Self {
        Self {
            id: event.ts.clone(),
            room_id: event.channel_id.clone(),
            room_name: channel.name.clone(),
            text: event.text.clone(),
            user_id: event.user_id.clone(),
            user_name: user.name.clone(),
            url: permalink(team_domain, &event.channel_id, &event.ts),
            json: event.raw.to_string(),
        }
    }
}

/// Archive link for a message; empty when there is no room.
pub fn permalink(team_domain: &str, room_id: &str, ts: &str) -> String {
    if room_id.is_empty() {
        return String::new();
    }
    format!(
        "https://{}.slack.com/archives/{}/p{}",
        team_domain,
        room_id,
        ts.replacen('.', "", 1)
    )
}

/// Opens connections to the durable store.
#[async_trait]
pub trait AuditConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn AuditConnection>, PersistenceError>;
}

/// An open store connection.
#[async_trait]
pub trait AuditConnection: Send {
    async fn insert(&mut self, record: &AuditRecord) -> Result<(), PersistenceError>;
}

#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub team_domain: String,
    pub retry_delay: Duration,
    pub queue_capacity: usize,
}

impl From<&AuditConfig> for AuditSettings {
    fn from(config: &AuditConfig) -> Self {
        Self {
            team_domain: config.team_domain.clone(),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Handle for submitting audit records.
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<AuditRecord>,
    connected: Arc<AtomicBool>,
    team_domain: String,
}

impl AuditLogger {
    /// Start the writer task. It connects in the background; records
    /// submitted before the first connection succeeds wait in the queue.
    pub fn spawn(
        connector: Arc<dyn AuditConnector>,
        settings: AuditSettings,
    ) -> (Self, JoinHandle<Result<(), PersistenceError>>) {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let connected = Arc::new(AtomicBool::new(false));

        let writer = AuditWriter {
            connector,
            retry_delay: settings.retry_delay,
            connected: connected.clone(),
        };
        let handle = tokio::spawn(writer.run(rx));

        let logger = Self {
            tx,
            connected,
            team_domain: settings.team_domain,
        };
        (logger, handle)
    }

    /// Queue a record for a public channel event. Other conversations are ignored.
    pub fn record_event(&self, event: &IncomingEvent, user: &User, channel: &Channel) {
        if !channel.is_public_channel() {
            tracing::debug!(
                target: "channel_operator::audit",
                channel = %event.channel_id,
                "Ignoring event outside a public channel"
            );
            return;
        }
        self.submit(AuditRecord::from_event(
            event,
            user,
            channel,
            &self.team_domain,
        ));
    }

    /// Queue a record without waiting for it to be written.
    pub fn submit(&self, record: AuditRecord) {
        if let Err(e) = self.tx.try_send(record) {
            let (reason, record) = match e {
                mpsc::error::TrySendError::Full(r) => ("queue full", r),
                mpsc::error::TrySendError::Closed(r) => ("writer stopped", r),
            };
            tracing::warn!(
                target: "channel_operator::audit",
                id = %record.id,
                room = %record.room_id,
                reason,
                "Dropping audit record"
            );
        }
    }

    /// Whether the writer currently holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

struct AuditWriter {
    connector: Arc<dyn AuditConnector>,
    retry_delay: Duration,
    connected: Arc<AtomicBool>,
}

impl AuditWriter {
    async fn run(self, mut rx: mpsc::Receiver<AuditRecord>) -> Result<(), PersistenceError> {
        loop {
            let mut connection = match self.connect().await {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::error!(target: "channel_operator::audit", error = %e, "Audit store failed");
                    return Err(e);
                }
            };

            loop {
                let Some(record) = rx.recv().await else {
                    self.connected.store(false, Ordering::SeqCst);
                    tracing::info!(target: "channel_operator::audit", "Audit logger shut down");
                    return Ok(());
                };

                match connection.insert(&record).await {
                    Ok(()) => {
                        tracing::debug!(
                            target: "channel_operator::audit",
                            id = %record.id,
                            room = %record.room_name,
                            "Audit record written"
                        );
                    }
                    Err(PersistenceError::ConnectionLost(reason)) => {
                        self.connected.store(false, Ordering::SeqCst);
                        tracing::warn!(
                            target: "channel_operator::audit",
                            id = %record.id,
                            reason = %reason,
                            retry_in_ms = self.retry_delay.as_millis() as u64,
                            "Audit store connection lost, record dropped"
                        );
                        tokio::time::sleep(self.retry_delay).await;
                        break;
                    }
                    Err(e) => {
                        self.connected.store(false, Ordering::SeqCst);
                        tracing::error!(target: "channel_operator::audit", error = %e, "Audit store failed");
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Connect, retrying at a fixed interval for as long as the store is unreachable.
    async fn connect(&self) -> Result<Box<dyn AuditConnection>, PersistenceError> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.connector.connect().await {
                Ok(connection) => {
                    self.connected.store(true, Ordering::SeqCst);
                    tracing::info!(target: "channel_operator::audit", attempt, "Audit store connected");
                    return Ok(connection);
                }
                Err(PersistenceError::ConnectionLost(reason)) => {
                    tracing::warn!(
                        target: "channel_operator::audit",
                        attempt,
                        reason = %reason,
                        retry_in_ms = self.retry_delay.as_millis() as u64,
                        "Audit store unreachable, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
