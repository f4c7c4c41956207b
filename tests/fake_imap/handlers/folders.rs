//! CREATE and DELETE command handlers.
//!
//! The fake mirrors the two refusals clients care about: creating a
//! name that already exists and deleting one that does not. Deleting
//! INBOX is always refused (RFC 3501 Section 6.3.4).

use crate::fake_imap::io::complete;
use crate::fake_imap::mailbox::{Folder, Mailbox};
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_create<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    name: &str,
    mailbox: &Mutex<Mailbox>,
    stream: &mut BufReader<S>,
) {
    let created = {
        let mut mb = mailbox.lock().unwrap();
        if mb.get_folder(name).is_some() {
            false
        } else {
            mb.folders.push(Folder::new(name));
            true
        }
    };

    if created {
        complete(stream, tag, "OK", "CREATE completed").await;
    } else {
        complete(stream, tag, "NO", "[ALREADYEXISTS] Mailbox already exists").await;
    }
}

pub async fn handle_delete<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    name: &str,
    mailbox: &Mutex<Mailbox>,
    stream: &mut BufReader<S>,
) {
    if name.eq_ignore_ascii_case("INBOX") {
        complete(stream, tag, "NO", "Cannot delete INBOX").await;
        return;
    }

    let deleted = {
        let mut mb = mailbox.lock().unwrap();
        let before = mb.folders.len();
        mb.folders.retain(|f| f.name != name);
        mb.folders.len() < before
    };

    if deleted {
        complete(stream, tag, "OK", "DELETE completed").await;
    } else {
        complete(stream, tag, "NO", "[NONEXISTENT] No such mailbox").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::testing::{drain, pipe};
    use crate::fake_imap::mailbox::MailboxBuilder;

    #[tokio::test]
    async fn create_then_duplicate() {
        let mailbox = Mutex::new(MailboxBuilder::new().folder("INBOX").build());

        let (client, mut server) = pipe();
        handle_create("A1", "Projects", &mailbox, &mut server).await;
        handle_create("A2", "Projects", &mailbox, &mut server).await;
        let output = drain(client, server).await;

        assert!(output.contains("A1 OK CREATE completed"));
        assert!(output.contains("A2 NO [ALREADYEXISTS]"));
        assert!(mailbox.lock().unwrap().get_folder("Projects").is_some());
    }

    #[tokio::test]
    async fn delete_missing_and_inbox_refused() {
        let mailbox = Mutex::new(MailboxBuilder::new().folder("INBOX").folder("Old").build());

        let (client, mut server) = pipe();
        handle_delete("A1", "Old", &mailbox, &mut server).await;
        handle_delete("A2", "Old", &mailbox, &mut server).await;
        handle_delete("A3", "INBOX", &mailbox, &mut server).await;
        let output = drain(client, server).await;

        assert!(output.contains("A1 OK DELETE completed"));
        assert!(output.contains("A2 NO [NONEXISTENT]"));
        assert!(output.contains("A3 NO Cannot delete INBOX"));
        assert_eq!(mailbox.lock().unwrap().folders.len(), 1);
    }
}
