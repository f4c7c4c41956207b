//! Named-argument operation contract
//!
//! The remote-invocation transport hands over `{"operation": ...,
//! "arguments": {...}}` objects; [`MailClient::dispatch`] runs them and
//! [`MailClient::handle_json`] does the whole JSON round trip.

use crate::client::{DEFAULT_LIMIT, MailClient};
use crate::error::{Error, Operation, OperationError};
use crate::folder::FolderName;
use crate::message::{Delivery, EmailDraft, MessageContent, MessageSummary, MoveOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// One operation with its arguments.
///
/// ```
/// use mailbox_ops::Request;
///
/// let request: Request = serde_json::from_str(
///     r#"{"operation": "list_recent_emails", "arguments": {"folder": "INBOX"}}"#,
/// )
/// .unwrap();
/// assert_eq!(
///     request,
///     Request::ListRecentEmails { folder: "INBOX".into(), limit: 50 }
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "operation", content = "arguments", rename_all = "snake_case")]
pub enum Request {
    ListFolders,
    CreateFolder {
        name: String,
    },
    DeleteFolder {
        name: String,
    },
    ListRecentEmails {
        folder: String,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    SearchEmail {
        folder: String,
        query: String,
    },
    ReadEmail {
        folder: String,
        message_id: String,
    },
    SendEmail(EmailDraft),
    MoveEmail {
        folder: String,
        message_id: String,
        target_folder: String,
    },
    DeleteEmail {
        folder: String,
        message_id: String,
    },
    MarkEmail {
        folder: String,
        message_id: String,
        flag: String,
    },
}

const fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl Request {
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::ListFolders => Operation::ListFolders,
            Self::CreateFolder { .. } => Operation::CreateFolder,
            Self::DeleteFolder { .. } => Operation::DeleteFolder,
            Self::ListRecentEmails { .. } => Operation::ListRecentEmails,
            Self::SearchEmail { .. } => Operation::SearchEmail,
            Self::ReadEmail { .. } => Operation::ReadEmail,
            Self::SendEmail(_) => Operation::SendEmail,
            Self::MoveEmail { .. } => Operation::MoveEmail,
            Self::DeleteEmail { .. } => Operation::DeleteEmail,
            Self::MarkEmail { .. } => Operation::MarkEmail,
        }
    }
}

/// Result of a dispatched [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Response {
    /// Success marker of operations that return nothing else.
    Ack,
    Folders(Vec<FolderName>),
    Summaries(Vec<MessageSummary>),
    Message(Box<MessageContent>),
    Sent(Delivery),
    Moved(MoveOutcome),
}

impl MailClient {
    /// Run one request.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation reports; an unknown flag name
    /// is `InvalidFlag` before anything is sent.
    pub async fn dispatch(&self, request: Request) -> Result<Response, OperationError> {
        debug!("Dispatching {}", request.operation());
        match request {
            Request::ListFolders => self.list_folders().await.map(Response::Folders),
            Request::CreateFolder { name } => {
                self.create_folder(&name).await.map(|()| Response::Ack)
            }
            Request::DeleteFolder { name } => {
                self.delete_folder(&name).await.map(|()| Response::Ack)
            }
            Request::ListRecentEmails { folder, limit } => self
                .list_recent_emails(&folder, limit)
                .await
                .map(Response::Summaries),
            Request::SearchEmail { folder, query } => self
                .search_email(&folder, &query)
                .await
                .map(Response::Summaries),
            Request::ReadEmail { folder, message_id } => self
                .read_email(&folder, &message_id)
                .await
                .map(|content| Response::Message(Box::new(content))),
            Request::SendEmail(draft) => self.send_email(&draft).await.map(Response::Sent),
            Request::MoveEmail {
                folder,
                message_id,
                target_folder,
            } => self
                .move_email(&folder, &message_id, &target_folder)
                .await
                .map(Response::Moved),
            Request::DeleteEmail { folder, message_id } => self
                .delete_email(&folder, &message_id)
                .await
                .map(|()| Response::Ack),
            Request::MarkEmail {
                folder,
                message_id,
                flag,
            } => {
                let flag = flag.parse().map_err(|e: Error| {
                    OperationError::new(Operation::MarkEmail, e)
                        .folder(&folder)
                        .message_id(&message_id)
                })?;
                self.mark_email(&folder, &message_id, flag)
                    .await
                    .map(|()| Response::Ack)
            }
        }
    }

    /// Parse a JSON request, run it and render the outcome as
    /// `{"ok": true, "result": ...}` or `{"ok": false, "error": ...}`.
    pub async fn handle_json(&self, request: &str) -> String {
        let request: Request = match serde_json::from_str(request) {
            Ok(request) => request,
            Err(e) => {
                return json!({
                    "ok": false,
                    "error": { "kind": "invalid_request", "message": e.to_string() },
                })
                .to_string();
            }
        };

        let outcome = match self.dispatch(request).await {
            Ok(response) => json!({ "ok": true, "result": response }),
            Err(e) => json!({ "ok": false, "error": e }),
        };
        outcome.to_string()
    }
}
