//! Response parsers
//!
//! One sub-module per response shape. Each turns the typed records
//! the IMAP client library produces into this crate's own records, so
//! provider quirks (delimiters, encodings, missing headers) are
//! handled here and nowhere else.

mod folders;
mod message;
mod search;

pub(crate) use folders::{ListEntry, ListedFolder, parse_folder_list, parse_listing};
pub(crate) use message::{RawMessage, parse_message, parse_summary};
pub(crate) use search::{parse_message_id, parse_search_result};
