//! IMAP session reuse
//!
//! One connection per account, held in a slot behind an async mutex so
//! two operations never interleave commands on it. An operation takes
//! the connection out of the slot and only puts it back when it
//! finishes; a cancelled operation therefore drops its connection and
//! the next one reconnects instead of inheriting a half-issued command.

use crate::config::MailConfig;
use crate::error::{Operation, Result};
use crate::imap::{self, ImapConnection};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub(crate) struct SessionManager {
    config: Arc<MailConfig>,
    slot: Mutex<Option<ImapConnection>>,
}

impl SessionManager {
    pub(crate) fn new(config: Arc<MailConfig>) -> Self {
        Self {
            config,
            slot: Mutex::new(None),
        }
    }

    /// Run `op` on the account's connection.
    ///
    /// Connection failures of read-only operations are retried once
    /// on a fresh connection after the configured backoff.
    pub(crate) async fn run<T>(
        &self,
        operation: Operation,
        mut op: impl AsyncFnMut(&mut ImapConnection) -> Result<T>,
    ) -> Result<T> {
        let mut slot = self.slot.lock().await;
        match self.attempt(&mut slot, &mut op).await {
            Err(e) if e.is_retryable() && operation.is_idempotent() => {
                warn!("{} failed ({}), retrying once", operation, e);
                tokio::time::sleep(self.config.retry_backoff).await;
                self.attempt(&mut slot, &mut op).await
            }
            other => other,
        }
    }

    async fn attempt<T>(
        &self,
        slot: &mut Option<ImapConnection>,
        op: &mut impl AsyncFnMut(&mut ImapConnection) -> Result<T>,
    ) -> Result<T> {
        let mut conn = match slot.take() {
            Some(mut conn) => match conn.noop().await {
                Ok(()) => conn,
                Err(e) => {
                    debug!("Reused IMAP session is dead ({}), reconnecting", e);
                    imap::connect(&self.config).await?
                }
            },
            None => imap::connect(&self.config).await?,
        };

        let result = op(&mut conn).await;
        match &result {
            Err(e) if e.poisons_session() => {
                debug!("Discarding IMAP session after: {}", e);
            }
            _ => *slot = Some(conn),
        }
        result
    }

    /// Log out and forget the connection, if any. Never fails.
    pub(crate) async fn disconnect(&self) {
        let conn = self.slot.lock().await.take();
        if let Some(conn) = conn {
            conn.logout().await;
            debug!("IMAP session closed");
        }
    }
}
