//! Message flags
//!
//! [`Flag`] is the caller-facing vocabulary. The IMAP protocol only
//! knows system flags being present or absent, so the negative
//! variants (`Unseen`, `Unflagged`) are applied as removals of their
//! positive counterpart and never stored alongside it.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A message state a caller can observe or request.
///
/// # Examples
///
/// ```
/// use mailbox_ops::Flag;
///
/// let flag: Flag = "read".parse().unwrap();
/// assert_eq!(flag, Flag::Seen);
/// assert_eq!(flag.store_query(), "+FLAGS.SILENT (\\Seen)");
/// assert_eq!(Flag::Unseen.store_query(), "-FLAGS.SILENT (\\Seen)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    /// Message has been read (`\Seen` present).
    Seen,
    /// Message has not been read (`\Seen` absent).
    Unseen,
    /// Message is flagged for attention (`\Flagged` present).
    Flagged,
    /// `\Flagged` absent.
    Unflagged,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
    /// Message has been answered (`\Answered`).
    Answered,
}

impl Flag {
    /// The IMAP system flag this variant adds or removes.
    #[must_use]
    pub const fn system_flag(self) -> &'static str {
        match self {
            Self::Seen | Self::Unseen => "\\Seen",
            Self::Flagged | Self::Unflagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Answered => "\\Answered",
        }
    }

    /// Whether applying this flag removes its system flag.
    #[must_use]
    pub const fn is_removal(self) -> bool {
        matches!(self, Self::Unseen | Self::Unflagged)
    }

    /// The `UID STORE` data item that applies this flag.
    #[must_use]
    pub fn store_query(self) -> String {
        let sign = if self.is_removal() { '-' } else { '+' };
        format!("{sign}FLAGS.SILENT ({})", self.system_flag())
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Seen => "seen",
            Self::Unseen => "unseen",
            Self::Flagged => "flagged",
            Self::Unflagged => "unflagged",
            Self::Deleted => "deleted",
            Self::Answered => "answered",
        }
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let name = name.strip_prefix('\\').unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "seen" | "read" => Ok(Self::Seen),
            "unseen" | "unread" => Ok(Self::Unseen),
            "flagged" | "starred" => Ok(Self::Flagged),
            "unflagged" | "unstarred" => Ok(Self::Unflagged),
            "deleted" => Ok(Self::Deleted),
            "answered" => Ok(Self::Answered),
            _ => Err(Error::InvalidFlag(s.to_string())),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map the server's flag list to the caller-facing set.
///
/// The read state is always reported (`Seen` or `Unseen`);
/// `Flagged`, `Deleted` and `Answered` appear only when set.
pub(crate) fn from_imap<'a>(
    flags: impl IntoIterator<Item = async_imap::types::Flag<'a>>,
) -> Vec<Flag> {
    use async_imap::types::Flag as ImapFlag;

    let mut out = Vec::new();
    let mut seen = false;
    for flag in flags {
        match flag {
            ImapFlag::Seen => seen = true,
            ImapFlag::Flagged => out.push(Flag::Flagged),
            ImapFlag::Deleted => out.push(Flag::Deleted),
            ImapFlag::Answered => out.push(Flag::Answered),
            _ => {}
        }
    }
    out.push(if seen { Flag::Seen } else { Flag::Unseen });
    out.sort_unstable();
    out.dedup();
    out
}
