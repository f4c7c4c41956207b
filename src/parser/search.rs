//! SEARCH responses and message identifiers

use crate::error::{Error, Result};

/// Order a `UID SEARCH` result.
///
/// The client library hands the result over as an unordered set;
/// UIDs are assigned in ascending arrival order, so sorting restores
/// the server's mailbox order.
pub(crate) fn parse_search_result(uids: impl IntoIterator<Item = u32>) -> Vec<u32> {
    let mut out: Vec<u32> = uids.into_iter().filter(|uid| *uid != 0).collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Parse a caller-supplied message id.
///
/// Anything that is not a positive UID cannot name a message in the
/// folder, so it is reported as not found.
pub(crate) fn parse_message_id(folder: &str, id: &str) -> Result<u32> {
    id.trim()
        .parse::<u32>()
        .ok()
        .filter(|uid| *uid > 0)
        .ok_or_else(|| Error::MessageNotFound {
            folder: folder.to_string(),
            id: id.to_string(),
        })
}
