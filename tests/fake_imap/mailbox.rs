//! Test data model for the fake IMAP server
//!
//! Provides a builder-style API for constructing mailbox state:
//!
//! ```ignore
//! let mailbox = MailboxBuilder::new()
//!     .folder("INBOX")
//!         .email(1, false, raw_rfc5322_bytes)
//!         .email(2, true, raw_rfc5322_bytes)
//!     .folder("Trash")
//!         .attribute("\\Trash")
//!     .build();
//! ```
//!
//! Folder names are stored the way the server spells them, i.e. with
//! the server's hierarchy delimiter and in modified UTF-7.

/// A complete mailbox: a collection of named folders, each holding
/// zero or more test emails.
#[derive(Debug, Clone)]
pub struct Mailbox {
    pub folders: Vec<Folder>,
}

impl Mailbox {
    /// Look up a folder by name (case-sensitive except INBOX).
    pub fn get_folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| same_name(&f.name, name))
    }

    pub fn get_folder_mut(&mut self, name: &str) -> Option<&mut Folder> {
        self.folders.iter_mut().find(|f| same_name(&f.name, name))
    }

    /// Subjects of the messages in `folder`, in mailbox order.
    pub fn subjects(&self, folder: &str) -> Vec<String> {
        self.get_folder(folder)
            .map(|f| f.emails.iter().map(TestEmail::subject).collect())
            .unwrap_or_default()
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a == b || (a.eq_ignore_ascii_case("INBOX") && b.eq_ignore_ascii_case("INBOX"))
}

/// A single IMAP folder (e.g. "INBOX", "Sent", "Trash").
#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    /// LIST attributes such as `\Noselect` or `\Trash`.
    pub attributes: Vec<String>,
    pub emails: Vec<TestEmail>,
}

impl Folder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            emails: Vec::new(),
        }
    }

    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case("\\Noselect"))
    }

    pub fn max_uid(&self) -> u32 {
        self.emails.iter().map(|e| e.uid).max().unwrap_or(0)
    }

    pub fn find(&self, uid: u32) -> Option<&TestEmail> {
        self.emails.iter().find(|e| e.uid == uid)
    }
}

/// A test email stored in a folder.
///
/// - `uid`: IMAP UID, unique per folder and never reused.
/// - `seen` / `flagged` / `deleted` / `answered`: the system flags.
/// - `internal_date`: arrival time in IMAP `date-time` syntax.
/// - `raw`: the complete RFC 5322 message (headers + body).
#[derive(Debug, Clone)]
pub struct TestEmail {
    pub uid: u32,
    pub seen: bool,
    pub flagged: bool,
    pub deleted: bool,
    pub answered: bool,
    pub internal_date: String,
    pub raw: Vec<u8>,
}

impl TestEmail {
    /// The flag list as it appears in a FETCH response.
    pub fn flag_list(&self) -> String {
        let mut flags = Vec::new();
        if self.seen {
            flags.push("\\Seen");
        }
        if self.answered {
            flags.push("\\Answered");
        }
        if self.flagged {
            flags.push("\\Flagged");
        }
        if self.deleted {
            flags.push("\\Deleted");
        }
        flags.join(" ")
    }

    /// The header block including the terminating blank line.
    pub fn header(&self) -> &[u8] {
        self.raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map_or(&self.raw[..], |pos| &self.raw[..pos + 4])
    }

    /// Value of the first header named `name` (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<String> {
        let text = String::from_utf8_lossy(self.header()).into_owned();
        text.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    pub fn subject(&self) -> String {
        self.header_value("Subject").unwrap_or_default()
    }

    /// Everything after the header block.
    pub fn body(&self) -> &[u8] {
        &self.raw[self.header().len()..]
    }
}

/// Builder for constructing a `Mailbox` step by step.
///
/// Call `.folder(name)` to start a new folder, then chain
/// `.attribute(...)` and `.email(uid, seen, raw)` calls to fill it.
/// Finish with `.build()` to get the final `Mailbox`.
pub struct MailboxBuilder {
    folders: Vec<Folder>,
}

impl MailboxBuilder {
    pub fn new() -> Self {
        Self {
            folders: Vec::new(),
        }
    }

    /// Add a new folder. Subsequent calls configure this folder.
    pub fn folder(mut self, name: &str) -> Self {
        self.folders.push(Folder::new(name));
        self
    }

    /// Add a LIST attribute to the most recently added folder.
    ///
    /// # Panics
    ///
    /// Panics if called before any `.folder()` call.
    pub fn attribute(mut self, attribute: &str) -> Self {
        self.last()
            .attributes
            .push(attribute.to_string());
        self
    }

    /// Add an email to the most recently added folder.
    ///
    /// # Panics
    ///
    /// Panics if called before any `.folder()` call.
    pub fn email(mut self, uid: u32, seen: bool, raw: &[u8]) -> Self {
        self.last().emails.push(TestEmail {
            uid,
            seen,
            flagged: false,
            deleted: false,
            answered: false,
            internal_date: "01-Jan-2024 00:00:00 +0000".to_string(),
            raw: raw.to_vec(),
        });
        self
    }

    /// Mark the most recently added email as `\Flagged`.
    pub fn flagged(mut self) -> Self {
        if let Some(email) = self.last().emails.last_mut() {
            email.flagged = true;
        }
        self
    }

    fn last(&mut self) -> &mut Folder {
        self.folders
            .last_mut()
            .expect("call .folder() before configuring it")
    }

    /// Consume the builder and return the finished `Mailbox`.
    pub fn build(self) -> Mailbox {
        Mailbox {
            folders: self.folders,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &[u8] = b"Subject: Hello\r\nFrom: a@b.test\r\n\r\nBody text";

    #[test]
    fn header_and_body_split_at_blank_line() {
        let mailbox = MailboxBuilder::new().folder("INBOX").email(1, false, RAW).build();
        let email = &mailbox.folders[0].emails[0];
        assert!(email.header().ends_with(b"\r\n\r\n"));
        assert_eq!(email.body(), b"Body text");
        assert_eq!(email.subject(), "Hello");
        assert_eq!(email.header_value("from").as_deref(), Some("a@b.test"));
    }

    #[test]
    fn inbox_lookup_ignores_case() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        assert!(mailbox.get_folder("inbox").is_some());
        assert!(mailbox.get_folder("Inbox").is_some());
    }

    #[test]
    fn attributes_and_flags() {
        let mailbox = MailboxBuilder::new()
            .folder("[Gmail]")
            .attribute("\\Noselect")
            .folder("Work")
            .email(3, true, RAW)
            .flagged()
            .build();
        assert!(!mailbox.folders[0].is_selectable());
        assert_eq!(mailbox.folders[1].emails[0].flag_list(), "\\Seen \\Flagged");
        assert_eq!(mailbox.folders[1].max_uid(), 3);
    }
}
