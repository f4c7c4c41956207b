//! FETCH responses: summaries and full messages

use crate::flag::Flag;
use crate::message::{Attachment, MessageContent, MessageSummary, sanitize_filename};
use chrono::{DateTime, Utc};
use mail_parser::{Address, Message, MessageParser, MimeHeaders, PartType};
use tracing::warn;

/// What the IMAP layer extracted from one FETCH response.
///
/// `bytes` holds the header block for summaries and the full RFC 5322
/// message for reads.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawMessage {
    pub uid: u32,
    pub flags: Vec<Flag>,
    pub size: Option<u64>,
    pub internal_date: Option<DateTime<Utc>>,
    pub bytes: Option<Vec<u8>>,
}

/// Build a summary; a message that cannot be parsed yields a
/// placeholder carrying the reason instead of an error.
pub(crate) fn parse_summary(raw: &RawMessage) -> MessageSummary {
    match parse(raw) {
        Ok(message) => summarize(raw, &message),
        Err(reason) => {
            warn!("UID {}: {}", raw.uid, reason);
            let mut summary = MessageSummary::placeholder(raw.uid.to_string(), reason);
            summary.flags.clone_from(&raw.flags);
            summary.size_bytes = raw.size;
            summary.date = raw.internal_date;
            summary
        }
    }
}

/// Split a full message into text, HTML and attachments.
///
/// An attachment whose transfer encoding is broken is returned with
/// its `corrupt` marker set; the rest of the message is unaffected.
pub(crate) fn parse_message(raw: &RawMessage) -> Result<MessageContent, String> {
    let message = parse(raw)?;
    let summary = summarize(raw, &message);

    let body_text = message
        .body_text(0)
        .map(|text| text.into_owned())
        .unwrap_or_default();
    let body_html = message.html_part(0).and_then(|part| match &part.body {
        PartType::Html(html) => Some(html.to_string()),
        _ => None,
    });

    let attachments = message
        .attachments()
        .map(|part| {
            let filename = sanitize_filename(part.attachment_name().unwrap_or("attachment"));
            let content_type = part.content_type().map_or_else(
                || "application/octet-stream".to_string(),
                |ct| format!("{}/{}", ct.ctype(), ct.subtype().unwrap_or("octet-stream")),
            );
            if part.is_encoding_problem {
                warn!("UID {}: attachment {:?} could not be decoded", raw.uid, filename);
            }
            Attachment::fetched(
                filename,
                content_type,
                part.contents().to_vec(),
                part.is_encoding_problem,
            )
        })
        .collect();

    Ok(MessageContent {
        cc: address_list(message.cc()),
        summary,
        body_text,
        body_html,
        attachments,
    })
}

fn parse(raw: &RawMessage) -> Result<Message<'_>, String> {
    let bytes = raw
        .bytes
        .as_deref()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| "server returned no message data".to_string())?;
    MessageParser::default()
        .parse(bytes)
        .ok_or_else(|| "message is not valid RFC 5322".to_string())
}

fn summarize(raw: &RawMessage, message: &Message<'_>) -> MessageSummary {
    let date = message
        .date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))
        .or(raw.internal_date);

    MessageSummary {
        id: raw.uid.to_string(),
        subject: message.subject().unwrap_or_default().to_string(),
        from: address_list(message.from()).into_iter().next().unwrap_or_default(),
        to: address_list(message.to()),
        date,
        flags: raw.flags.clone(),
        size_bytes: raw.size,
        error: None,
    }
}

fn address_list(addr: Option<&Address<'_>>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    addr.iter()
        .filter_map(|a| {
            let email = a.address.as_deref()?;
            Some(match a.name.as_deref() {
                Some(name) if !name.is_empty() => format!("{name} <{email}>"),
                _ => email.to_string(),
            })
        })
        .collect()
}
