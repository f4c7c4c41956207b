//! RFC 5322 / MIME composition
//!
//! [`compose`] is a pure function of the [`OutgoingMessage`]: the
//! Message-ID and the MIME boundaries are derived from a SHA-256
//! digest of the content and the `Date` header comes from the message
//! itself, so composing twice yields the same bytes.

use crate::address::Address;
use crate::message::{Attachment, OutgoingMessage};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Base64 output is wrapped at this width (RFC 2045 allows 76).
const BASE64_LINE: usize = 76;
/// Soft limit for folded header lines.
const HEADER_LINE: usize = 76;
/// RFC 5322 hard limit for a body line, excluding CRLF.
const MAX_LINE: usize = 998;

/// A message rendered for the SMTP transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    /// The `Message-ID` header value, angle brackets included.
    pub message_id: String,
    /// Envelope sender (`MAIL FROM`).
    pub sender: Address,
    /// Envelope recipients (`RCPT TO`): to, cc and bcc.
    pub recipients: Vec<Address>,
    /// Wire-ready message with CRLF line endings.
    pub payload: Vec<u8>,
}

/// Render `message` as a MIME message.
///
/// Bcc recipients are only added to [`ComposedMessage::recipients`];
/// they never appear in the payload.
#[must_use]
pub fn compose(message: &OutgoingMessage) -> ComposedMessage {
    let digest = content_digest(message);
    let message_id = format!("<{}@{}>", &digest[..32], message.from.domain());

    let mut out = String::new();
    header(&mut out, "Date", &message.date.to_rfc2822());
    header(&mut out, "From", &message.from.to_string());
    if !message.to.is_empty() {
        header(&mut out, "To", &fold_addresses("To", &message.to));
    }
    if !message.cc.is_empty() {
        header(&mut out, "Cc", &fold_addresses("Cc", &message.cc));
    }
    header(&mut out, "Subject", &encode_header_text(&message.subject));
    header(&mut out, "Message-ID", &message_id);
    header(&mut out, "MIME-Version", "1.0");

    let body = body_entity(message, &digest);
    if message.attachments.is_empty() {
        out.push_str(&body);
    } else {
        let boundary = format!("=_mixed_{}", &digest[32..48]);
        header(
            &mut out,
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{boundary}\""),
        );
        out.push_str("\r\n");
        let _ = write!(out, "--{boundary}\r\n{body}\r\n");
        for attachment in &message.attachments {
            let _ = write!(out, "--{boundary}\r\n{}\r\n", attachment_entity(attachment));
        }
        let _ = write!(out, "--{boundary}--\r\n");
    }

    ComposedMessage {
        message_id,
        sender: message.from.clone(),
        recipients: message.recipients().into_iter().cloned().collect(),
        payload: out.into_bytes(),
    }
}

/// The text entity: `text/plain` alone, or `multipart/alternative`
/// when an HTML body is present. Starts with its own headers.
fn body_entity(message: &OutgoingMessage, digest: &str) -> String {
    let Some(html) = &message.body_html else {
        return text_entity("text/plain", &message.body);
    };

    let boundary = format!("=_alt_{}", &digest[48..64]);
    let mut out = String::new();
    header(
        &mut out,
        "Content-Type",
        &format!("multipart/alternative; boundary=\"{boundary}\""),
    );
    out.push_str("\r\n");
    let _ = write!(out, "--{boundary}\r\n{}\r\n", text_entity("text/plain", &message.body));
    let _ = write!(out, "--{boundary}\r\n{}\r\n", text_entity("text/html", html));
    let _ = write!(out, "--{boundary}--");
    out
}

fn text_entity(content_type: &str, text: &str) -> String {
    let normalized = normalize_newlines(text);
    let mut out = String::new();
    header(&mut out, "Content-Type", &format!("{content_type}; charset=utf-8"));
    if normalized.is_ascii() && normalized.split("\r\n").all(|l| l.len() <= MAX_LINE) {
        header(&mut out, "Content-Transfer-Encoding", "7bit");
        out.push_str("\r\n");
        out.push_str(&normalized);
    } else {
        header(&mut out, "Content-Transfer-Encoding", "base64");
        out.push_str("\r\n");
        out.push_str(&wrap_base64(normalized.as_bytes()));
    }
    out
}

fn attachment_entity(attachment: &Attachment) -> String {
    let filename = attachment.filename();
    let (name_param, filename_param) = if filename.is_ascii() {
        let quoted = quote_param(filename);
        (format!("name={quoted}"), format!("filename={quoted}"))
    } else {
        (
            format!("name=\"{}\"", encode_header_text(filename)),
            format!("filename*=UTF-8''{}", percent_encode(filename)),
        )
    };

    let mut out = String::new();
    header(
        &mut out,
        "Content-Type",
        &format!("{}; {name_param}", attachment.content_type()),
    );
    header(&mut out, "Content-Disposition", &format!("attachment; {filename_param}"));
    header(&mut out, "Content-Transfer-Encoding", "base64");
    out.push_str("\r\n");
    out.push_str(&wrap_base64(attachment.payload()));
    out
}

fn header(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, "{name}: {value}\r\n");
}

/// Join addresses, folding onto continuation lines near 76 columns.
fn fold_addresses(name: &str, addresses: &[Address]) -> String {
    let mut out = String::new();
    let mut column = name.len() + 2;
    for (i, addr) in addresses.iter().enumerate() {
        let text = addr.to_string();
        if i > 0 {
            out.push(',');
            column += 1;
            if column + 1 + text.len() > HEADER_LINE {
                out.push_str("\r\n");
                column = 0;
            }
            out.push(' ');
            column += 1;
        }
        out.push_str(&text);
        column += text.len();
    }
    out
}

/// RFC 2047 `B` encoding for non-ASCII header text.
fn encode_header_text(text: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return text.to_string();
    }
    // 45 input bytes keep each encoded word under 75 characters.
    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in text.chars() {
        if chunk.len() + c.len_utf8() > 45 {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }
    words.join("\r\n ")
}

fn encoded_word(chunk: &str) -> String {
    format!("=?UTF-8?B?{}?=", STANDARD.encode(chunk.as_bytes()))
}

fn quote_param(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// RFC 2231 percent-encoding of a parameter value.
fn percent_encode(value: &str) -> String {
    let mut out = String::new();
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

fn wrap_base64(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE * 2 + 2);
    for line in encoded.as_bytes().chunks(BASE64_LINE) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push_str("\r\n");
    }
    out
}

fn normalize_newlines(text: &str) -> String {
    let mut out = text.replace("\r\n", "\n").replace('\r', "\n").replace('\n', "\r\n");
    if !out.ends_with("\r\n") {
        out.push_str("\r\n");
    }
    out
}

/// Hex SHA-256 over every field that ends up in the payload.
fn content_digest(message: &OutgoingMessage) -> String {
    let mut hasher = Sha256::new();
    let mut field = |bytes: &[u8]| {
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    };
    field(message.from.to_string().as_bytes());
    for addr in message.to.iter().chain(&message.cc) {
        field(addr.to_string().as_bytes());
    }
    field(message.subject.as_bytes());
    field(message.body.as_bytes());
    field(message.body_html.as_deref().unwrap_or_default().as_bytes());
    for attachment in &message.attachments {
        field(attachment.filename().as_bytes());
        field(attachment.content_type().as_bytes());
        field(attachment.payload());
    }
    field(message.date.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())
}
