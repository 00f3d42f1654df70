//! MySQL-backed audit store.
//!
//! Expects an append-only table shaped like:
//!
//! ```sql
//! CREATE TABLE log (
//!     id        VARCHAR(32),
//!     room_id   VARCHAR(32),
//!     room_name VARCHAR(255),
//!     text      TEXT,
//!     user_id   VARCHAR(32),
//!     user_name VARCHAR(255),
//!     url       VARCHAR(512),
//!     json      TEXT
//! );
//! ```

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError};
use sqlx::Connection;

use super::{AuditConnection, AuditConnector, AuditRecord};
use crate::config::AuditConfig;
use crate::error::PersistenceError;

// Server error numbers meaning the session is gone or could not start.
const CR_SERVER_GONE_ERROR: u16 = 2006;
const CR_SERVER_LOST: u16 = 2013;
const ER_CON_COUNT_ERROR: u16 = 1040;

pub struct MySqlConnector {
    options: MySqlConnectOptions,
    insert_sql: String,
}

impl MySqlConnector {
    pub fn new(config: &AuditConfig) -> Result<Self, PersistenceError> {
        if !is_identifier(&config.table) {
            return Err(PersistenceError::Fatal(format!(
                "invalid audit table name '{}'",
                config.table
            )));
        }

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        Ok(Self {
            options,
            insert_sql: format!(
                "INSERT INTO `{}` (id, room_id, room_name, text, user_id, user_name, url, json) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                config.table
            ),
        })
    }
}

#[async_trait]
impl AuditConnector for MySqlConnector {
    async fn connect(&self) -> Result<Box<dyn AuditConnection>, PersistenceError> {
        let conn = MySqlConnection::connect_with(&self.options)
            .await
            .map_err(classify)?;
        Ok(Box::new(MySqlAuditConnection {
            conn,
            insert_sql: self.insert_sql.clone(),
        }))
    }
}

struct MySqlAuditConnection {
    conn: MySqlConnection,
    insert_sql: String,
}

#[async_trait]
impl AuditConnection for MySqlAuditConnection {
    async fn insert(&mut self, record: &AuditRecord) -> Result<(), PersistenceError> {
        sqlx::query(&self.insert_sql)
            .bind(record.id.as_str())
            .bind(record.room_id.as_str())
            .bind(record.room_name.as_str())
            .bind(record.text.as_str())
            .bind(record.user_id.as_str())
            .bind(record.user_name.as_str())
            .bind(record.url.as_str())
            .bind(record.json.as_str())
            .execute(&mut self.conn)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

/// Split store errors into the retryable connection losses and everything else.
fn classify(err: sqlx::Error) -> PersistenceError {
    let lost = match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => {
            let number = db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number);
            number.map(is_connection_lost_number).unwrap_or(false)
                || db
                    .code()
                    .map(|state| is_connection_lost_state(&state))
                    .unwrap_or(false)
        }
        _ => false,
    };

    if lost {
        PersistenceError::ConnectionLost(err.to_string())
    } else {
        PersistenceError::Fatal(err.to_string())
    }
}

fn is_connection_lost_number(number: u16) -> bool {
    matches!(
        number,
        CR_SERVER_GONE_ERROR | CR_SERVER_LOST | ER_CON_COUNT_ERROR
    )
}

/// SQLSTATE class 08: connection exceptions.
fn is_connection_lost_state(state: &str) -> bool {
    state.starts_with("08")
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
