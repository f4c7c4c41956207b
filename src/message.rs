//! Message records returned by and handed to the client

use crate::address::Address;
use crate::error::{Error, Result};
use crate::flag::Flag;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;

/// One line of a folder listing or search result.
///
/// `id` is the server UID, meaningful only inside the folder it was
/// fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    pub flags: Vec<Flag>,
    pub size_bytes: Option<u64>,
    /// Set when the message could not be parsed; the other fields are
    /// then best-effort.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageSummary {
    /// A summary for a message that failed to parse.
    pub(crate) fn placeholder(id: String, error: impl Into<String>) -> Self {
        Self {
            id,
            subject: String::new(),
            from: String::new(),
            to: Vec::new(),
            date: None,
            flags: Vec::new(),
            size_bytes: None,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        self.error.is_some()
    }
}

/// A fully fetched message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageContent {
    #[serde(flatten)]
    pub summary: MessageSummary,
    pub cc: Vec<String>,
    pub body_text: String,
    pub body_html: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// A decoded attachment.
///
/// `size_bytes` always equals `payload.len()` and `filename` never
/// contains a path separator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    filename: String,
    content_type: String,
    size_bytes: u64,
    #[serde(serialize_with = "as_base64")]
    payload: Vec<u8>,
    corrupt: bool,
}

impl Attachment {
    /// Build an attachment, rejecting unsafe file names.
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Result<Self> {
        let filename = filename.into();
        check_filename(&filename)?;
        let content_type = content_type.into();
        if !is_media_type(&content_type) {
            return Err(Error::InvalidAttachment {
                filename,
                reason: format!("invalid content type {content_type:?}"),
            });
        }
        Ok(Self {
            filename,
            content_type,
            size_bytes: payload.len() as u64,
            payload,
            corrupt: false,
        })
    }

    /// An attachment decoded from a fetched message.
    ///
    /// `filename` must already be sanitized. When `corrupt` is set the
    /// payload holds whatever bytes the decoder recovered.
    pub(crate) fn fetched(
        filename: String,
        content_type: String,
        payload: Vec<u8>,
        corrupt: bool,
    ) -> Self {
        Self {
            filename,
            content_type,
            size_bytes: payload.len() as u64,
            payload,
            corrupt,
        }
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub const fn is_corrupt(&self) -> bool {
        self.corrupt
    }
}

fn check_filename(filename: &str) -> Result<()> {
    let reason = if filename.trim().is_empty() {
        Some("file name is empty")
    } else if filename.contains(['/', '\\']) {
        Some("file name contains a path separator")
    } else if filename == "." || filename == ".." {
        Some("file name is a relative path component")
    } else if filename.chars().any(char::is_control) {
        Some("file name contains a control character")
    } else {
        None
    };
    reason.map_or(Ok(()), |reason| {
        Err(Error::InvalidAttachment {
            filename: filename.to_string(),
            reason: reason.to_string(),
        })
    })
}

/// `type/subtype` made of RFC 2045 token characters.
fn is_media_type(value: &str) -> bool {
    let token = |s: &str| {
        !s.is_empty()
            && s.chars().all(|c| {
                c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`{|}~".contains(c)
            })
    };
    value
        .split_once('/')
        .is_some_and(|(kind, sub)| token(kind) && token(sub))
}

/// Reduce an untrusted name (from a MIME header) to a safe file name.
pub(crate) fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "attachment".to_string()
    } else {
        cleaned.to_string()
    }
}

fn as_base64<S: Serializer>(payload: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(payload))
}

/// A message ready to be composed and sent.
///
/// Built once through [`OutgoingMessage::builder`] and consumed by
/// value by `send_email`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub(crate) from: Address,
    pub(crate) to: Vec<Address>,
    pub(crate) cc: Vec<Address>,
    pub(crate) bcc: Vec<Address>,
    pub(crate) subject: String,
    pub(crate) body: String,
    pub(crate) body_html: Option<String>,
    pub(crate) attachments: Vec<Attachment>,
    pub(crate) date: DateTime<Utc>,
}

impl OutgoingMessage {
    #[must_use]
    pub fn builder(from: Address) -> OutgoingMessageBuilder {
        OutgoingMessageBuilder {
            from,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            body: String::new(),
            body_html: None,
            attachments: Vec::new(),
            date: None,
        }
    }

    #[must_use]
    pub const fn sender(&self) -> &Address {
        &self.from
    }

    #[must_use]
    pub fn to(&self) -> &[Address] {
        &self.to
    }

    #[must_use]
    pub fn cc(&self) -> &[Address] {
        &self.cc
    }

    #[must_use]
    pub fn bcc(&self) -> &[Address] {
        &self.bcc
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Every envelope recipient: to, then cc, then bcc, deduplicated.
    #[must_use]
    pub fn recipients(&self) -> Vec<&Address> {
        let mut out: Vec<&Address> = Vec::new();
        for addr in self.to.iter().chain(&self.cc).chain(&self.bcc) {
            if !out.contains(&addr) {
                out.push(addr);
            }
        }
        out
    }
}

/// Builder for [`OutgoingMessage`].
#[derive(Debug)]
#[must_use]
pub struct OutgoingMessageBuilder {
    from: Address,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    subject: String,
    body: String,
    body_html: Option<String>,
    attachments: Vec<Attachment>,
    date: Option<DateTime<Utc>>,
}

impl OutgoingMessageBuilder {
    pub fn to(mut self, to: Vec<Address>) -> Self {
        self.to = to;
        self
    }

    pub fn cc(mut self, cc: Vec<Address>) -> Self {
        self.cc = cc;
        self
    }

    pub fn bcc(mut self, bcc: Vec<Address>) -> Self {
        self.bcc = bcc;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn body_html(mut self, html: impl Into<String>) -> Self {
        self.body_html = Some(html.into());
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Fix the `Date` header. Defaults to the time of `build`.
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Finish the message.
    ///
    /// Fails when there is no recipient at all or the subject carries
    /// a line break.
    pub fn build(self) -> Result<OutgoingMessage> {
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(Error::InvalidArgument("message has no recipients".into()));
        }
        if self.subject.contains(['\r', '\n']) {
            return Err(Error::InvalidArgument(
                "subject must not contain line breaks".into(),
            ));
        }
        Ok(OutgoingMessage {
            from: self.from,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            subject: self.subject,
            body: self.body,
            body_html: self.body_html,
            attachments: self.attachments,
            date: self.date.unwrap_or_else(Utc::now),
        })
    }
}

/// Result of `move_email`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MoveOutcome {
    /// The message is in the target folder and gone from the source.
    Moved,
    /// The copy landed in the target folder but the original could
    /// not be removed; the message now exists in both folders.
    CopiedNotRemoved { reason: String },
}

impl MoveOutcome {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Moved)
    }
}

/// SMTP acceptance of a message for relay. Not a delivery guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub message_id: String,
    pub recipients: usize,
    /// The server's final reply to the DATA command.
    pub response: String,
}

/// A message as a caller describes it: raw address strings and
/// attachment paths. [`crate::MailClient::send_email`] validates it
/// and turns it into an [`OutgoingMessage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EmailDraft {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub attachments: Vec<PathBuf>,
}
