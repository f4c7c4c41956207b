//! Mailbox and message operations over IMAP and SMTP
//!
//! A [`MailClient`] exposes ten operations (list, create and delete
//! folders; list, search, read, send, move, delete and flag messages)
//! on one mail account. IMAP runs over TLS (implicit or STARTTLS) on a
//! single reused session; sends use one SMTP transaction each.
//!
//! ```no_run
//! use mailbox_ops::{MailClient, MailConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MailClient::new(MailConfig::from_env()?);
//! for summary in client.list_recent_emails("INBOX", 10).await? {
//!     println!("{} {}", summary.id, summary.subject);
//! }
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```
//!
//! Results serialize with `serde`; [`Request`] and [`Response`] carry
//! the named-argument contract for remote callers.

mod address;
mod client;
mod compose;
mod config;
mod error;
mod flag;
mod folder;
mod imap;
mod message;
mod parser;
mod request;
mod session;
mod smtp;
mod tls;

pub use address::{Address, validate, validate_all};
pub use client::{DEFAULT_LIMIT, MailClient};
pub use compose::{ComposedMessage, compose};
pub use config::{MailConfig, Security, ServerConfig, Timeouts, TlsVerification};
pub use error::{Error, Operation, OperationError, Result};
pub use flag::Flag;
pub use folder::{FolderName, SEPARATOR};
pub use message::{
    Attachment, Delivery, EmailDraft, MessageContent, MessageSummary, MoveOutcome,
    OutgoingMessage, OutgoingMessageBuilder,
};
pub use request::{Request, Response};
