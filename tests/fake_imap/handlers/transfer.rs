//! UID COPY and UID MOVE command handlers.
//!
//! COPY clones messages into the destination; MOVE (RFC 6851) also
//! expunges them from the selected folder and reports each removal
//! with `* N EXPUNGE`. Copies get fresh UIDs in the destination,
//! reported in a `COPYUID` response code (RFC 4315):
//!
//! ```text
//! A0007 OK [COPYUID 1 4 12] COPY completed
//! ```

use crate::fake_imap::io::{complete, write_line};
use crate::fake_imap::mailbox::Mailbox;
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// What a transfer did: `(source uid, destination uid)` pairs and the
/// sequence numbers expunged from the source, in report order.
struct Transferred {
    mapping: Vec<(u32, u32)>,
    expunged: Vec<usize>,
}

fn transfer(
    mailbox: &Mutex<Mailbox>,
    source: &str,
    dest: &str,
    uids: impl Fn(u32) -> Vec<u32>,
    remove: bool,
) -> Result<Transferred, &'static str> {
    let mut mb = mailbox.lock().unwrap();
    match mb.get_folder(dest) {
        None => return Err("[TRYCREATE] Destination folder not found"),
        Some(folder) if !folder.is_selectable() => return Err("Destination is not selectable"),
        Some(_) => {}
    }
    let Some(src) = mb.get_folder(source) else {
        return Err("Source folder not found");
    };

    let wanted = uids(src.max_uid());
    let picked: Vec<(usize, _)> = src
        .emails
        .iter()
        .enumerate()
        .filter(|(_, e)| wanted.contains(&e.uid))
        .map(|(idx, e)| (idx, e.clone()))
        .collect();

    let dst = mb.get_folder_mut(dest).ok_or("Destination folder not found")?;
    let mut next = dst.max_uid() + 1;
    let mut mapping = Vec::new();
    for (_, email) in &picked {
        let mut copy = email.clone();
        copy.uid = next;
        copy.deleted = false;
        mapping.push((email.uid, next));
        dst.emails.push(copy);
        next += 1;
    }

    let mut expunged = Vec::new();
    if remove {
        let src = mb.get_folder_mut(source).ok_or("Source folder not found")?;
        for (offset, (idx, _)) in picked.iter().enumerate() {
            expunged.push(idx + 1 - offset);
        }
        src.emails.retain(|e| !wanted.contains(&e.uid));
    }

    Ok(Transferred { mapping, expunged })
}

fn copyuid(mapping: &[(u32, u32)]) -> String {
    let join = |pick: fn(&(u32, u32)) -> u32| {
        mapping
            .iter()
            .map(|m| pick(m).to_string())
            .collect::<Vec<_>>()
            .join(",")
    };
    format!("[COPYUID 1 {} {}]", join(|m| m.0), join(|m| m.1))
}

/// Handle the UID COPY command.
pub async fn handle_uid_copy<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    uids: impl Fn(u32) -> Vec<u32>,
    dest_folder: &str,
    mailbox: &Mutex<Mailbox>,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        complete(stream, tag, "BAD", "No folder selected").await;
        return;
    };
    match transfer(mailbox, folder_name, dest_folder, uids, false) {
        Ok(done) => {
            let text = format!("{} COPY completed", copyuid(&done.mapping));
            complete(stream, tag, "OK", &text).await;
        }
        Err(reason) => complete(stream, tag, "NO", reason).await,
    }
}

/// Handle the UID MOVE command.
pub async fn handle_uid_move<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    uids: impl Fn(u32) -> Vec<u32>,
    dest_folder: &str,
    mailbox: &Mutex<Mailbox>,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        complete(stream, tag, "BAD", "No folder selected").await;
        return;
    };
    let done = match transfer(mailbox, folder_name, dest_folder, uids, true) {
        Ok(done) => done,
        Err(reason) => {
            complete(stream, tag, "NO", reason).await;
            return;
        }
    };

    let code = format!("* OK {} Moved\r\n", copyuid(&done.mapping));
    if write_line(stream, &code).await.is_err() {
        return;
    }
    for seq in &done.expunged {
        if write_line(stream, &format!("* {seq} EXPUNGE\r\n")).await.is_err() {
            return;
        }
    }
    complete(stream, tag, "OK", "MOVE completed").await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::testing::{drain, pipe};
    use crate::fake_imap::mailbox::MailboxBuilder;

    const RAW: &[u8] = b"From: a@b.com\r\nSubject: Test\r\n\r\nBody";

    fn mailbox() -> Mutex<Mailbox> {
        Mutex::new(
            MailboxBuilder::new()
                .folder("INBOX")
                .email(1, false, RAW)
                .email(2, true, RAW)
                .email(3, false, RAW)
                .folder("Archive")
                .email(10, true, RAW)
                .build(),
        )
    }

    fn uids(folder: &str, mb: &Mutex<Mailbox>) -> Vec<u32> {
        mb.lock()
            .unwrap()
            .get_folder(folder)
            .unwrap()
            .emails
            .iter()
            .map(|e| e.uid)
            .collect()
    }

    #[tokio::test]
    async fn copy_keeps_source_and_assigns_new_uid() {
        let mb = mailbox();
        let (client, mut server) = pipe();
        handle_uid_copy("A1", |_| vec![2], "Archive", &mb, Some("INBOX"), &mut server).await;
        let output = drain(client, server).await;

        assert_eq!(output, "A1 OK [COPYUID 1 2 11] COPY completed\r\n");
        assert_eq!(uids("INBOX", &mb), vec![1, 2, 3]);
        assert_eq!(uids("Archive", &mb), vec![10, 11]);
    }

    #[tokio::test]
    async fn move_expunges_from_source() {
        let mb = mailbox();
        let (client, mut server) = pipe();
        handle_uid_move("A1", |_| vec![2], "Archive", &mb, Some("INBOX"), &mut server).await;
        let output = drain(client, server).await;

        assert!(output.contains("* 2 EXPUNGE\r\n"));
        assert!(output.ends_with("A1 OK MOVE completed\r\n"));
        assert_eq!(uids("INBOX", &mb), vec![1, 3]);
        assert_eq!(uids("Archive", &mb), vec![10, 11]);
    }

    #[tokio::test]
    async fn missing_destination_is_trycreate() {
        let mb = mailbox();
        let (client, mut server) = pipe();
        handle_uid_move("A1", |_| vec![1], "Nowhere", &mb, Some("INBOX"), &mut server).await;
        let output = drain(client, server).await;

        assert_eq!(output, "A1 NO [TRYCREATE] Destination folder not found\r\n");
        assert_eq!(uids("INBOX", &mb), vec![1, 2, 3]);
    }
}
