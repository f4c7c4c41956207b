//! Mailbox and message operations
//!
//! [`MailClient`] is the entry point. Arguments are validated before
//! any connection is opened; each operation then runs on the
//! account's IMAP session (or one SMTP transaction for sends) and
//! reports failures as an [`OperationError`] naming the operation and
//! its target.

use crate::address;
use crate::compose::compose;
use crate::config::MailConfig;
use crate::error::{Error, Operation, OperationError, Result};
use crate::flag::Flag;
use crate::folder::{FolderName, SEPARATOR};
use crate::imap::{self, ImapConnection};
use crate::message::{
    Attachment, Delivery, EmailDraft, MessageContent, MessageSummary, MoveOutcome,
    OutgoingMessage,
};
use crate::parser::{
    RawMessage, parse_folder_list, parse_listing, parse_message, parse_message_id,
    parse_search_result, parse_summary,
};
use crate::session::SessionManager;
use crate::smtp;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Number of summaries `list_recent_emails` returns by default.
pub const DEFAULT_LIMIT: usize = 50;

/// Mailbox operations for one account.
///
/// Operations on one client are serialized on a single IMAP session;
/// use separate clients for parallel work.
pub struct MailClient {
    config: Arc<MailConfig>,
    imap: SessionManager,
}

impl MailClient {
    #[must_use]
    pub fn new(config: MailConfig) -> Self {
        let config = Arc::new(config);
        Self {
            imap: SessionManager::new(Arc::clone(&config)),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &MailConfig {
        &self.config
    }

    /// Selectable folders in server order.
    ///
    /// # Errors
    ///
    /// Connection and authentication failures.
    pub async fn list_folders(&self) -> std::result::Result<Vec<FolderName>, OperationError> {
        self.imap
            .run(Operation::ListFolders, async |conn: &mut ImapConnection| {
                Ok(parse_folder_list(&conn.list().await?))
            })
            .await
            .map_err(|e| OperationError::new(Operation::ListFolders, e))
    }

    /// Create a folder. Nested names (`Parent/Child`) need an
    /// existing parent.
    ///
    /// # Errors
    ///
    /// `DuplicateFolder` if it exists, `FolderNotFound` if the parent
    /// does not.
    pub async fn create_folder(&self, name: &str) -> std::result::Result<(), OperationError> {
        self.create(name)
            .await
            .map_err(|e| OperationError::new(Operation::CreateFolder, e).folder(name))
    }

    /// Delete an empty-of-system-folders folder.
    ///
    /// # Errors
    ///
    /// `ProtectedFolder` for INBOX, special-use folders and folders
    /// containing one; `FolderNotFound` if it does not exist.
    pub async fn delete_folder(&self, name: &str) -> std::result::Result<(), OperationError> {
        self.remove_folder(name)
            .await
            .map_err(|e| OperationError::new(Operation::DeleteFolder, e).folder(name))
    }

    /// The `limit` most recently arrived messages, newest first.
    ///
    /// A message that cannot be parsed is returned as a placeholder
    /// carrying an error marker.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `limit` is 0, `FolderNotFound`.
    pub async fn list_recent_emails(
        &self,
        folder: &str,
        limit: usize,
    ) -> std::result::Result<Vec<MessageSummary>, OperationError> {
        self.recent(folder, limit)
            .await
            .map_err(|e| OperationError::new(Operation::ListRecentEmails, e).folder(folder))
    }

    /// Messages whose subject, sender or body contain `query`, newest
    /// first.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty query, `FolderNotFound`.
    pub async fn search_email(
        &self,
        folder: &str,
        query: &str,
    ) -> std::result::Result<Vec<MessageSummary>, OperationError> {
        self.search(folder, query)
            .await
            .map_err(|e| OperationError::new(Operation::SearchEmail, e).folder(folder))
    }

    /// Fetch and decode one message without marking it seen.
    ///
    /// # Errors
    ///
    /// `MessageNotFound`, `FolderNotFound`, `AttachmentTooLarge` when
    /// the message exceeds the configured download limit.
    pub async fn read_email(
        &self,
        folder: &str,
        message_id: &str,
    ) -> std::result::Result<MessageContent, OperationError> {
        self.read(folder, message_id).await.map_err(|e| {
            OperationError::new(Operation::ReadEmail, e)
                .folder(folder)
                .message_id(message_id)
        })
    }

    /// Validate, compose and submit a draft. The sender is the
    /// configured account.
    ///
    /// Each call opens its own SMTP connection and closes it after the
    /// transaction; unlike the IMAP session, nothing is kept between
    /// sends.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` naming the first bad recipient and
    /// `InvalidAttachment` / `AttachmentTooLarge`, all before
    /// connecting; `SendRejected` when the relay refuses the message.
    pub async fn send_email(
        &self,
        draft: &EmailDraft,
    ) -> std::result::Result<Delivery, OperationError> {
        self.send(draft)
            .await
            .map_err(|e| OperationError::new(Operation::SendEmail, e))
    }

    /// Submit an already built message as is.
    ///
    /// # Errors
    ///
    /// Same as [`MailClient::send_email`] minus validation.
    pub async fn send_message(
        &self,
        message: &OutgoingMessage,
    ) -> std::result::Result<Delivery, OperationError> {
        self.deliver(message)
            .await
            .map_err(|e| OperationError::new(Operation::SendEmail, e))
    }

    /// Move a message to `target_folder`.
    ///
    /// Uses `UID MOVE` when the server supports it, otherwise copies,
    /// then deletes and expunges the original, then checks it is gone.
    /// If the copy succeeded but the original could not be removed the
    /// result is [`MoveOutcome::CopiedNotRemoved`], not an error.
    ///
    /// # Errors
    ///
    /// `MessageNotFound`, `FolderNotFound` (source or target).
    pub async fn move_email(
        &self,
        folder: &str,
        message_id: &str,
        target_folder: &str,
    ) -> std::result::Result<MoveOutcome, OperationError> {
        self.relocate(folder, message_id, target_folder)
            .await
            .map_err(|e| {
                OperationError::new(Operation::MoveEmail, e)
                    .folder(folder)
                    .message_id(message_id)
            })
    }

    /// Permanently delete a message.
    ///
    /// # Errors
    ///
    /// `MessageNotFound`, `FolderNotFound`.
    pub async fn delete_email(
        &self,
        folder: &str,
        message_id: &str,
    ) -> std::result::Result<(), OperationError> {
        self.expunge(folder, message_id).await.map_err(|e| {
            OperationError::new(Operation::DeleteEmail, e)
                .folder(folder)
                .message_id(message_id)
        })
    }

    /// Set or clear a flag. Marking an already marked message is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// `MessageNotFound`, `FolderNotFound`.
    pub async fn mark_email(
        &self,
        folder: &str,
        message_id: &str,
        flag: Flag,
    ) -> std::result::Result<(), OperationError> {
        self.mark(folder, message_id, flag).await.map_err(|e| {
            OperationError::new(Operation::MarkEmail, e)
                .folder(folder)
                .message_id(message_id)
        })
    }

    /// Log out of the IMAP session. The next operation reconnects.
    pub async fn disconnect(&self) {
        self.imap.disconnect().await;
    }

    // -- private helpers --

    async fn create(&self, name: &str) -> Result<()> {
        let folder = FolderName::new(name)?;
        self.imap
            .run(Operation::CreateFolder, async |conn: &mut ImapConnection| {
                let listing = parse_listing(&conn.list().await?);
                if listing.iter().any(|f| f.name == folder) {
                    return Err(Error::DuplicateFolder {
                        folder: folder.to_string(),
                    });
                }
                if let Some(parent) = folder.parent()
                    && !listing.iter().any(|f| f.name == parent)
                {
                    return Err(Error::FolderNotFound {
                        folder: parent.to_string(),
                    });
                }
                conn.create(&folder).await
            })
            .await
    }

    async fn remove_folder(&self, name: &str) -> Result<()> {
        let folder = FolderName::new(name)?;
        if folder.is_inbox() {
            return Err(Error::ProtectedFolder {
                folder: folder.to_string(),
            });
        }
        let prefix = format!("{folder}{SEPARATOR}");

        self.imap
            .run(Operation::DeleteFolder, async |conn: &mut ImapConnection| {
                let listing = parse_listing(&conn.list().await?);
                let entry = listing.iter().find(|f| f.name == folder).ok_or_else(|| {
                    Error::FolderNotFound {
                        folder: folder.to_string(),
                    }
                })?;
                let protected_child = listing
                    .iter()
                    .any(|f| f.is_protected() && f.name.as_str().starts_with(&prefix));
                if entry.is_protected() || protected_child {
                    return Err(Error::ProtectedFolder {
                        folder: folder.to_string(),
                    });
                }
                conn.delete(&folder).await
            })
            .await
    }

    async fn recent(&self, folder: &str, limit: usize) -> Result<Vec<MessageSummary>> {
        if limit == 0 {
            return Err(Error::InvalidArgument(
                "limit must be greater than zero".into(),
            ));
        }
        let folder = FolderName::new(folder)?;

        self.imap
            .run(
                Operation::ListRecentEmails,
                async |conn: &mut ImapConnection| {
                    conn.select(&folder).await?;
                    let uids = parse_search_result(conn.uid_search("ALL").await?);
                    let recent = &uids[uids.len().saturating_sub(limit)..];
                    let raws = conn.fetch_summaries(recent).await?;
                    Ok(newest_first(&raws))
                },
            )
            .await
    }

    async fn search(&self, folder: &str, query: &str) -> Result<Vec<MessageSummary>> {
        let criteria = imap::text_search(query)?;
        let folder = FolderName::new(folder)?;

        let summaries = self
            .imap
            .run(Operation::SearchEmail, async |conn: &mut ImapConnection| {
                conn.select(&folder).await?;
                let uids = parse_search_result(conn.uid_search(&criteria).await?);
                let raws = conn.fetch_summaries(&uids).await?;
                Ok(newest_first(&raws))
            })
            .await?;
        info!("Search in {} matched {} message(s)", folder, summaries.len());
        Ok(summaries)
    }

    async fn read(&self, folder: &str, message_id: &str) -> Result<MessageContent> {
        let uid = parse_message_id(folder, message_id)?;
        let folder = FolderName::new(folder)?;

        self.imap
            .run(Operation::ReadEmail, async |conn: &mut ImapConnection| {
                conn.select(&folder).await?;
                let raw = conn
                    .fetch_message(uid)
                    .await?
                    .ok_or_else(|| not_found(&folder, uid))?;
                parse_message(&raw)
                    .map_err(|reason| Error::Protocol(format!("UID {uid}: {reason}")))
            })
            .await
    }

    async fn send(&self, draft: &EmailDraft) -> Result<Delivery> {
        let message = self.prepare(draft).await?;
        self.deliver(&message).await
    }

    async fn prepare(&self, draft: &EmailDraft) -> Result<OutgoingMessage> {
        let from = address::validate(&self.config.user)?;
        let mut builder = OutgoingMessage::builder(from)
            .to(address::validate_all(&draft.to)?)
            .cc(address::validate_all(&draft.cc)?)
            .bcc(address::validate_all(&draft.bcc)?)
            .subject(draft.subject.as_str())
            .body(draft.body.as_str());
        if let Some(html) = &draft.body_html {
            builder = builder.body_html(html.as_str());
        }
        for path in &draft.attachments {
            let attachment = load_attachment(path, self.config.max_message_bytes).await?;
            builder = builder.attachment(attachment);
        }
        builder.build()
    }

    async fn deliver(&self, message: &OutgoingMessage) -> Result<Delivery> {
        let composed = compose(message);
        smtp::send(&self.config, &composed).await
    }

    async fn relocate(&self, folder: &str, message_id: &str, target: &str) -> Result<MoveOutcome> {
        let uid = parse_message_id(folder, message_id)?;
        let source = FolderName::new(folder)?;
        let target = FolderName::new(target)?;
        if source == target {
            return Err(Error::InvalidArgument(format!(
                "message is already in {target}"
            )));
        }

        self.imap
            .run(Operation::MoveEmail, async |conn: &mut ImapConnection| {
                let listing = parse_listing(&conn.list().await?);
                if !listing.iter().any(|f| f.name == target && f.selectable) {
                    return Err(Error::FolderNotFound {
                        folder: target.to_string(),
                    });
                }
                conn.select(&source).await?;
                if !conn.contains(uid).await? {
                    return Err(not_found(&source, uid));
                }

                if conn.supports_move() {
                    conn.move_to(uid, &target).await?;
                    info!("Moved UID {} from {} to {}", uid, source, target);
                    return Ok(MoveOutcome::Moved);
                }

                conn.copy(uid, &target).await?;
                if let Err(e) = conn.remove(uid).await {
                    warn!("UID {} copied to {} but not removed: {}", uid, target, e);
                    return Ok(MoveOutcome::CopiedNotRemoved {
                        reason: e.to_string(),
                    });
                }
                Ok(match conn.contains(uid).await {
                    Ok(false) => {
                        info!("Moved UID {} from {} to {}", uid, source, target);
                        MoveOutcome::Moved
                    }
                    Ok(true) => MoveOutcome::CopiedNotRemoved {
                        reason: format!("UID {uid} is still present in {source} after expunge"),
                    },
                    Err(e) => MoveOutcome::CopiedNotRemoved {
                        reason: format!("could not confirm removal: {e}"),
                    },
                })
            })
            .await
    }

    async fn expunge(&self, folder: &str, message_id: &str) -> Result<()> {
        let uid = parse_message_id(folder, message_id)?;
        let folder = FolderName::new(folder)?;

        self.imap
            .run(Operation::DeleteEmail, async |conn: &mut ImapConnection| {
                conn.select(&folder).await?;
                if !conn.contains(uid).await? {
                    return Err(not_found(&folder, uid));
                }
                conn.remove(uid).await?;
                info!("Deleted UID {} from {}", uid, folder);
                Ok(())
            })
            .await
    }

    async fn mark(&self, folder: &str, message_id: &str, flag: Flag) -> Result<()> {
        let uid = parse_message_id(folder, message_id)?;
        let folder = FolderName::new(folder)?;

        self.imap
            .run(Operation::MarkEmail, async |conn: &mut ImapConnection| {
                conn.select(&folder).await?;
                if !conn.contains(uid).await? {
                    return Err(not_found(&folder, uid));
                }
                conn.store(uid, flag).await
            })
            .await
    }
}

fn not_found(folder: &FolderName, uid: u32) -> Error {
    Error::MessageNotFound {
        folder: folder.to_string(),
        id: uid.to_string(),
    }
}

/// Newest `Date` first; undated messages last; ties by UID, newest
/// first.
fn newest_first(raws: &[RawMessage]) -> Vec<MessageSummary> {
    let mut keyed: Vec<(u32, MessageSummary)> =
        raws.iter().map(|raw| (raw.uid, parse_summary(raw))).collect();
    keyed.sort_by(|(uid_a, a), (uid_b, b)| b.date.cmp(&a.date).then(uid_b.cmp(uid_a)));
    keyed.into_iter().map(|(_, summary)| summary).collect()
}

/// Read an attachment from disk, refusing files over `limit` bytes.
async fn load_attachment(path: &Path, limit: u64) -> Result<Attachment> {
    let shown = path.display().to_string();
    let invalid = |reason: String| Error::InvalidAttachment {
        filename: shown.clone(),
        reason,
    };

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| invalid("path has no usable file name".into()))?;
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    if !metadata.is_file() {
        return Err(invalid("not a regular file".into()));
    }
    if metadata.len() > limit {
        return Err(Error::AttachmentTooLarge {
            size: metadata.len(),
            limit,
        });
    }

    let payload = tokio::fs::read(path)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    if payload.len() as u64 > limit {
        return Err(Error::AttachmentTooLarge {
            size: payload.len() as u64,
            limit,
        });
    }
    Attachment::new(filename, content_type_for(filename), payload)
}

fn content_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "htm" | "html" => "text/html",
        "csv" => "text/csv",
        "ics" => "text/calendar",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
