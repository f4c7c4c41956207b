//! Folder names
//!
//! Servers disagree on the hierarchy separator (`/`, `.`) and encode
//! non-ASCII names in modified UTF-7. A [`FolderName`] is always the
//! decoded, `/`-separated form; the IMAP layer converts it back to the
//! server's spelling right before a command is issued.
//!
//! That conversion is not always invertible: a server using `.` may
//! hold a folder with a literal `/` in its name, or list a name that
//! is not valid modified UTF-7 at all. [`ServerNames`] keeps the exact
//! spelling of every listed folder so commands address it unchanged.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Separator used in every [`FolderName`] regardless of server.
pub const SEPARATOR: char = '/';

/// A non-empty, normalized mailbox name.
///
/// `INBOX` is matched case-insensitively (RFC 3501) and always
/// spelled in upper case.
///
/// # Examples
///
/// ```
/// use mailbox_ops::FolderName;
///
/// let folder = FolderName::new("inbox").unwrap();
/// assert_eq!(folder.as_str(), "INBOX");
/// assert!(folder.is_inbox());
///
/// let nested = FolderName::new("/Work/Projects/").unwrap();
/// assert_eq!(nested.as_str(), "Work/Projects");
/// assert_eq!(nested.parent().unwrap().as_str(), "Work");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FolderName(String);

impl FolderName {
    /// Validate and normalize a caller-supplied name.
    ///
    /// Leading and trailing separators are dropped; empty segments,
    /// control characters and the IMAP wildcards `*` / `%` are
    /// rejected.
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_matches(SEPARATOR);
        if trimmed.is_empty() {
            return Err(Error::InvalidArgument("folder name is empty".into()));
        }
        if trimmed.chars().any(|c| c.is_control() || c == '*' || c == '%') {
            return Err(Error::InvalidArgument(format!(
                "folder name {raw:?} contains a control or wildcard character"
            )));
        }
        if trimmed.split(SEPARATOR).any(|seg| seg.trim().is_empty()) {
            return Err(Error::InvalidArgument(format!(
                "folder name {raw:?} has an empty path segment"
            )));
        }
        Ok(Self::canonical(trimmed))
    }

    /// Decode a name as the server reported it in a LIST response.
    pub(crate) fn from_server(raw: &str, delimiter: Option<&str>) -> Self {
        let decoded = decode_mailbox(raw);
        let normalized = match delimiter {
            Some(d) if !d.is_empty() && d != "/" => decoded.replace(d, "/"),
            _ => decoded,
        };
        Self::canonical(&normalized)
    }

    /// Encode for use in a command to a server with `delimiter`.
    pub(crate) fn to_server(&self, delimiter: Option<&str>) -> String {
        let spelled = match delimiter {
            Some(d) if !d.is_empty() && d != "/" => self.0.replace(SEPARATOR, d),
            _ => self.0.clone(),
        };
        utf7_imap::encode_utf7_imap(spelled)
    }

    fn canonical(name: &str) -> Self {
        if name.eq_ignore_ascii_case("INBOX") {
            Self("INBOX".to_string())
        } else {
            Self(name.to_string())
        }
    }

    /// Last path segment.
    fn leaf(&self) -> &str {
        self.0.rsplit_once(SEPARATOR).map_or(&self.0, |(_, leaf)| leaf)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.0 == "INBOX"
    }

    /// The enclosing folder, if this one is nested.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once(SEPARATOR)
            .map(|(parent, _)| Self::canonical(parent))
    }
}

/// Modified UTF-7 decoding that leaves `raw` as is when any `&...-`
/// run is not valid modified base64 (`AT&T-Bills` is a legal name on
/// servers that do not enforce RFC 3501 5.1.3).
fn decode_mailbox(raw: &str) -> String {
    if encoded_runs(raw).all(is_modified_base64) {
        utf7_imap::decode_utf7_imap(raw.to_string())
    } else {
        raw.to_string()
    }
}

/// The text between each `&` and the next `-`.
fn encoded_runs(raw: &str) -> impl Iterator<Item = &str> {
    let mut rest = raw;
    std::iter::from_fn(move || {
        let after = &rest[rest.find('&')? + 1..];
        let end = after.find('-')?;
        rest = &after[end + 1..];
        Some(&after[..end])
    })
}

/// Whether `run` decodes to whole UTF-16 code units. Empty runs are
/// the `&-` escape.
fn is_modified_base64(run: &str) -> bool {
    if run.is_empty() {
        return true;
    }
    if !run
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b',')
    {
        return false;
    }
    let mut padded = run.replace(',', "/");
    while !padded.len().is_multiple_of(4) {
        padded.push('=');
    }
    STANDARD
        .decode(padded)
        .is_ok_and(|bytes| bytes.len().is_multiple_of(2))
}

/// Folder spellings as the server last listed them.
///
/// Names the server has not listed yet are derived from a listed
/// parent when there is one, and from [`FolderName`]'s own encoding
/// otherwise.
#[derive(Debug, Default)]
pub(crate) struct ServerNames {
    delimiter: Option<String>,
    known: HashMap<FolderName, String>,
}

impl ServerNames {
    pub(crate) fn new(delimiter: Option<String>) -> Self {
        Self {
            delimiter,
            known: HashMap::new(),
        }
    }

    pub(crate) fn delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }

    /// Replace what is known with a fresh listing. When two server
    /// names decode to the same folder the first one is kept.
    pub(crate) fn learn(&mut self, listing: impl IntoIterator<Item = (FolderName, String)>) {
        self.known.clear();
        for (name, raw) in listing {
            self.known.entry(name).or_insert(raw);
        }
    }

    pub(crate) fn is_known(&self, folder: &FolderName) -> bool {
        self.known.contains_key(folder)
    }

    /// The mailbox name to put on the wire for `folder`.
    pub(crate) fn encode(&self, folder: &FolderName) -> String {
        if let Some(raw) = self.known.get(folder) {
            return raw.clone();
        }
        let delimiter = self.delimiter();
        if let (Some(parent), Some(d)) = (folder.parent(), delimiter)
            && let Some(raw_parent) = self.known.get(&parent)
        {
            let leaf = utf7_imap::encode_utf7_imap(folder.leaf().to_string());
            return format!("{raw_parent}{d}{leaf}");
        }
        folder.to_server(delimiter)
    }
}

impl FromStr for FolderName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for FolderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FolderName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for FolderName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
