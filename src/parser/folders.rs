//! LIST responses

use crate::folder::FolderName;
use async_imap::types::{Name, NameAttribute};

/// RFC 6154 special-use attributes.
const SPECIAL_USE: &[&str] = &[
    "\\All",
    "\\Archive",
    "\\Drafts",
    "\\Flagged",
    "\\Junk",
    "\\Sent",
    "\\Trash",
];

/// One `* LIST` line with the wrapper syntax stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListEntry {
    pub attributes: Vec<String>,
    pub delimiter: Option<String>,
    pub name: String,
}

impl ListEntry {
    fn has_attribute(&self, attr: &str) -> bool {
        self.attributes.iter().any(|a| a.eq_ignore_ascii_case(attr))
    }

    fn is_selectable(&self) -> bool {
        !self.has_attribute("\\Noselect") && !self.has_attribute("\\NonExistent")
    }

    fn special_use(&self) -> Option<&'static str> {
        SPECIAL_USE.iter().copied().find(|attr| self.has_attribute(attr))
    }
}

impl From<&Name> for ListEntry {
    fn from(name: &Name) -> Self {
        Self {
            attributes: name.attributes().iter().map(attribute_text).collect(),
            delimiter: name.delimiter().map(str::to_string),
            name: name.name().to_string(),
        }
    }
}

fn attribute_text(attr: &NameAttribute<'_>) -> String {
    match attr {
        NameAttribute::NoInferiors => "\\Noinferiors".to_string(),
        NameAttribute::NoSelect => "\\Noselect".to_string(),
        NameAttribute::Marked => "\\Marked".to_string(),
        NameAttribute::Unmarked => "\\Unmarked".to_string(),
        NameAttribute::All => "\\All".to_string(),
        NameAttribute::Archive => "\\Archive".to_string(),
        NameAttribute::Drafts => "\\Drafts".to_string(),
        NameAttribute::Flagged => "\\Flagged".to_string(),
        NameAttribute::Junk => "\\Junk".to_string(),
        NameAttribute::Sent => "\\Sent".to_string(),
        NameAttribute::Trash => "\\Trash".to_string(),
        NameAttribute::Extension(ext) => ext.to_string(),
        #[allow(unreachable_patterns)]
        other => format!("{other:?}"),
    }
}

/// A folder as reported by the server, with everything the client
/// needs to address it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListedFolder {
    pub name: FolderName,
    /// The name exactly as it appeared in the LIST response.
    pub server_name: String,
    pub delimiter: Option<String>,
    pub selectable: bool,
    pub special_use: Option<&'static str>,
}

impl ListedFolder {
    /// INBOX and special-use folders cannot be deleted.
    pub fn is_protected(&self) -> bool {
        self.name.is_inbox() || self.special_use.is_some()
    }
}

/// Decode every entry, selectable or not, in server order.
pub(crate) fn parse_listing(entries: &[ListEntry]) -> Vec<ListedFolder> {
    let mut out: Vec<ListedFolder> = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = FolderName::from_server(&entry.name, entry.delimiter.as_deref());
        if name.as_str().is_empty() || out.iter().any(|f| f.name == name) {
            continue;
        }
        out.push(ListedFolder {
            name,
            server_name: entry.name.clone(),
            delimiter: entry.delimiter.clone(),
            selectable: entry.is_selectable(),
            special_use: entry.special_use(),
        });
    }
    out
}

/// Selectable folder names in server order; `\Noselect` and
/// `\NonExistent` entries are dropped.
pub(crate) fn parse_folder_list(entries: &[ListEntry]) -> Vec<FolderName> {
    parse_listing(entries)
        .into_iter()
        .filter(|f| f.selectable)
        .map(|f| f.name)
        .collect()
}
