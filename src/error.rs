//! Error types for mailbox-ops
//!
//! [`Error`] is the failure taxonomy shared by every layer. The
//! operations on [`crate::MailClient`] wrap it in an
//! [`OperationError`] that also names the operation and the folder /
//! message it was working on, so a caller can retry deliberately.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Network or transport failure, including timeouts. Retryable.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected the credentials for `user`.
    #[error("authentication rejected for {user}: {reason}")]
    Authentication { user: String, reason: String },

    #[error("folder not found: {folder}")]
    FolderNotFound { folder: String },

    #[error("message {id} not found in {folder}")]
    MessageNotFound { folder: String, id: String },

    #[error("folder {folder} is protected and cannot be deleted")]
    ProtectedFolder { folder: String },

    #[error("folder already exists: {folder}")]
    DuplicateFolder { folder: String },

    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid flag {0:?} (expected seen, unseen, flagged, unflagged, deleted or answered)")]
    InvalidFlag(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid attachment {filename:?}: {reason}")]
    InvalidAttachment { filename: String, reason: String },

    /// The SMTP server refused the message (carries the server reply).
    #[error("send rejected: {0}")]
    SendRejected(String),

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    AttachmentTooLarge { size: u64, limit: u64 },

    /// Unexpected server response; the raw response is kept for diagnosis.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable snake_case name of the failure kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_error",
            Self::Authentication { .. } => "authentication_error",
            Self::FolderNotFound { .. } => "folder_not_found",
            Self::MessageNotFound { .. } => "message_not_found",
            Self::ProtectedFolder { .. } => "protected_folder",
            Self::DuplicateFolder { .. } => "duplicate_folder",
            Self::InvalidAddress { .. } => "invalid_address",
            Self::InvalidFlag(_) => "invalid_flag",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::InvalidAttachment { .. } => "invalid_attachment",
            Self::SendRejected(_) => "send_rejected",
            Self::AttachmentTooLarge { .. } => "attachment_too_large",
            Self::Protocol(_) => "protocol_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Only transport failures are worth retrying without caller input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Whether the session that produced this error can still be used.
    ///
    /// Transport failures leave the connection in an unknown state.
    #[must_use]
    pub(crate) const fn poisons_session(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Io(_))
    }
}

/// The user-facing operations exposed by [`crate::MailClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ListFolders,
    CreateFolder,
    DeleteFolder,
    ListRecentEmails,
    SearchEmail,
    ReadEmail,
    SendEmail,
    MoveEmail,
    DeleteEmail,
    MarkEmail,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListFolders => "list_folders",
            Self::CreateFolder => "create_folder",
            Self::DeleteFolder => "delete_folder",
            Self::ListRecentEmails => "list_recent_emails",
            Self::SearchEmail => "search_email",
            Self::ReadEmail => "read_email",
            Self::SendEmail => "send_email",
            Self::MoveEmail => "move_email",
            Self::DeleteEmail => "delete_email",
            Self::MarkEmail => "mark_email",
        }
    }

    /// Read-only operations may be retried once after a connection
    /// failure. Mutations never are: the server may already have
    /// applied the effect.
    #[must_use]
    pub const fn is_idempotent(self) -> bool {
        matches!(
            self,
            Self::ListFolders | Self::ListRecentEmails | Self::SearchEmail | Self::ReadEmail
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An [`Error`] annotated with the operation and target it hit.
#[derive(Debug)]
pub struct OperationError {
    pub operation: Operation,
    pub folder: Option<String>,
    pub message_id: Option<String>,
    pub error: Error,
}

impl OperationError {
    pub(crate) const fn new(operation: Operation, error: Error) -> Self {
        Self {
            operation,
            folder: None,
            message_id: None,
            error,
        }
    }

    #[must_use]
    pub(crate) fn folder(mut self, folder: &str) -> Self {
        self.folder = Some(folder.to_string());
        self
    }

    #[must_use]
    pub(crate) fn message_id(mut self, id: &str) -> Self {
        self.message_id = Some(id.to_string());
        self
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.error.kind()
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.operation)?;
        match (&self.folder, &self.message_id) {
            (Some(folder), Some(id)) => write!(f, " (folder {folder}, message {id})")?,
            (Some(folder), None) => write!(f, " (folder {folder})")?,
            (None, Some(id)) => write!(f, " (message {id})")?,
            (None, None) => {}
        }
        write!(f, ": {}", self.error)
    }
}

/// `{operation, kind, folder?, message_id?, message}` for the
/// operation contract.
impl Serialize for OperationError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_struct("OperationError", 5)?;
        out.serialize_field("operation", &self.operation)?;
        out.serialize_field("kind", self.kind())?;
        if let Some(folder) = &self.folder {
            out.serialize_field("folder", folder)?;
        } else {
            out.skip_field("folder")?;
        }
        if let Some(id) = &self.message_id {
            out.serialize_field("message_id", id)?;
        } else {
            out.skip_field("message_id")?;
        }
        out.serialize_field("message", &self.error.to_string())?;
        out.end()
    }
}

impl std::error::Error for OperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
