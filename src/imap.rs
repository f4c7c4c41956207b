//! IMAP connection
//!
//! [`ImapConnection`] is one authenticated session plus what was learned
//! about the server at login (capabilities, hierarchy delimiter). Every
//! command runs under the configured timeout; protocol failures are
//! mapped to the crate's [`Error`] taxonomy here and nowhere else.

use crate::config::{MailConfig, Security};
use crate::error::{Error, Result};
use crate::flag::{self, Flag};
use crate::folder::{FolderName, ServerNames};
use crate::parser::{ListEntry, RawMessage, parse_listing};
use crate::tls;
use async_imap::Session;
use async_imap::error::Error as ImapError;
use async_imap::types::{Fetch, Name};
use chrono::Utc;
use futures::TryStreamExt;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

/// A TLS-wrapped IMAP session.
pub(crate) type ImapSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

const SUMMARY_ITEMS: &str = "(UID FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[HEADER])";
const MESSAGE_ITEMS: &str = "(UID FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[])";

/// The extensions this client makes use of.
#[derive(Debug, Clone, Copy, Default)]
struct Capabilities {
    r#move: bool,
    uidplus: bool,
}

pub(crate) struct ImapConnection {
    session: ImapSession,
    capabilities: Capabilities,
    names: ServerNames,
    command_timeout: Duration,
    max_message_bytes: u64,
}

/// Open a TLS session, authenticate and probe the server.
///
/// With [`Security::StartTls`] the greeting and `STARTTLS` exchange
/// happen in clear text; nothing else does.
pub(crate) async fn connect(config: &MailConfig) -> Result<ImapConnection> {
    let server = &config.imap;
    let addr = server.address();
    debug!("Connecting to IMAP server at {}", addr);

    let connector = tls::connector(config.tls)?;
    let server_name = tls::server_name(&server.host)?;

    let tls_stream = within(config.timeouts.connect, "IMAP connect", async {
        let mut tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::Connection(format!("TCP connect to {addr} failed: {e}")))?;

        if server.security == Security::StartTls {
            let mut client = async_imap::Client::new(tcp.compat());
            client
                .run_command_and_check_ok("STARTTLS", None)
                .await
                .map_err(|e| Error::Connection(format!("STARTTLS failed: {e}")))?;
            tcp = client.into_inner().into_inner();
        }

        connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::Connection(format!("TLS handshake with {addr} failed: {e}")))
    })
    .await?;

    let client = async_imap::Client::new(tls_stream.compat());
    let session = within(config.timeouts.command, "LOGIN", async {
        client
            .login(&config.user, &config.password)
            .await
            .map_err(|(e, _)| login_error(&config.user, e))
    })
    .await?;
    info!("Logged in to {} as {}", addr, config.user);

    let mut conn = ImapConnection {
        session,
        capabilities: Capabilities::default(),
        names: ServerNames::default(),
        command_timeout: config.timeouts.command,
        max_message_bytes: config.max_message_bytes,
    };
    conn.probe().await?;
    Ok(conn)
}

impl ImapConnection {
    /// Record CAPABILITY and the hierarchy delimiter (`LIST "" ""`).
    async fn probe(&mut self) -> Result<()> {
        let session = &mut self.session;
        let (capabilities, delimiter) = within(self.command_timeout, "CAPABILITY", async {
            let caps = session
                .capabilities()
                .await
                .map_err(|e| imap_error("CAPABILITY", e))?;
            let capabilities = Capabilities {
                r#move: caps.has_str("MOVE"),
                uidplus: caps.has_str("UIDPLUS"),
            };

            let root: Vec<Name> = session
                .list(Some(""), None)
                .await
                .map_err(|e| imap_error("LIST", e))?
                .try_collect()
                .await
                .map_err(|e| imap_error("LIST", e))?;
            let delimiter = root.first().and_then(|n| n.delimiter()).map(str::to_string);
            Ok((capabilities, delimiter))
        })
        .await?;

        debug!(
            "Server capabilities: MOVE={} UIDPLUS={}, delimiter {:?}",
            capabilities.r#move,
            capabilities.uidplus,
            delimiter
        );
        self.capabilities = capabilities;
        self.names = ServerNames::new(delimiter);
        Ok(())
    }

    /// Whether the server advertised `MOVE` (RFC 6851).
    pub(crate) const fn supports_move(&self) -> bool {
        self.capabilities.r#move
    }

    /// Cheap liveness check for a reused session.
    pub(crate) async fn noop(&mut self) -> Result<()> {
        let session = &mut self.session;
        within(self.command_timeout, "NOOP", async {
            session.noop().await.map_err(|e| imap_error("NOOP", e))
        })
        .await
    }

    pub(crate) async fn list(&mut self) -> Result<Vec<ListEntry>> {
        let session = &mut self.session;
        let names: Vec<Name> = within(self.command_timeout, "LIST", async {
            session
                .list(Some(""), Some("*"))
                .await
                .map_err(|e| imap_error("LIST", e))?
                .try_collect()
                .await
                .map_err(|e| imap_error("LIST", e))
        })
        .await?;
        debug!("LIST returned {} entries", names.len());
        let entries: Vec<ListEntry> = names.iter().map(ListEntry::from).collect();
        self.names.learn(
            parse_listing(&entries)
                .into_iter()
                .map(|f| (f.name, f.server_name)),
        );
        Ok(entries)
    }

    /// SELECT (read-write). A `NO` means the folder does not exist.
    ///
    /// A folder this connection has not listed yet is addressed by its
    /// derived spelling first; if the server refuses that, one LIST
    /// settles the real spelling.
    pub(crate) async fn select(&mut self, folder: &FolderName) -> Result<u32> {
        let guessed = self.names.encode(folder);
        if self.names.is_known(folder) {
            return self.select_as(folder, &guessed).await;
        }
        match self.select_as(folder, &guessed).await {
            Err(Error::FolderNotFound { .. }) => {
                self.list().await?;
                let listed = self.names.encode(folder);
                if self.names.is_known(folder) && listed != guessed {
                    debug!("{} is spelled {:?} on the server", folder, listed);
                    self.select_as(folder, &listed).await
                } else {
                    Err(Error::FolderNotFound {
                        folder: folder.to_string(),
                    })
                }
            }
            other => other,
        }
    }

    async fn select_as(&mut self, folder: &FolderName, encoded: &str) -> Result<u32> {
        debug!("SELECT {}", folder);
        let session = &mut self.session;
        let mailbox = within(self.command_timeout, "SELECT", async {
            session.select(encoded).await.map_err(|e| match e {
                ImapError::No(_) | ImapError::Bad(_) => Error::FolderNotFound {
                    folder: folder.to_string(),
                },
                other => imap_error("SELECT", other),
            })
        })
        .await?;
        Ok(mailbox.exists)
    }

    pub(crate) async fn create(&mut self, folder: &FolderName) -> Result<()> {
        let encoded = self.names.encode(folder);
        info!("CREATE {}", folder);
        let session = &mut self.session;
        within(self.command_timeout, "CREATE", async {
            session
                .create(&encoded)
                .await
                .map_err(|e| imap_error("CREATE", e))
        })
        .await
    }

    pub(crate) async fn delete(&mut self, folder: &FolderName) -> Result<()> {
        let encoded = self.names.encode(folder);
        info!("DELETE {}", folder);
        let session = &mut self.session;
        within(self.command_timeout, "DELETE", async {
            session
                .delete(&encoded)
                .await
                .map_err(|e| imap_error("DELETE", e))
        })
        .await
    }

    /// `UID SEARCH` in the selected folder; `criteria` is sent as is.
    pub(crate) async fn uid_search(&mut self, criteria: &str) -> Result<HashSet<u32>> {
        debug!("UID SEARCH {}", criteria);
        let session = &mut self.session;
        within(self.command_timeout, "UID SEARCH", async {
            session
                .uid_search(criteria)
                .await
                .map_err(|e| imap_error("UID SEARCH", e))
        })
        .await
    }

    /// Whether `uid` names a message in the selected folder.
    pub(crate) async fn contains(&mut self, uid: u32) -> Result<bool> {
        Ok(self.uid_search(&format!("UID {uid}")).await?.contains(&uid))
    }

    /// Headers, flags, size and arrival date for each UID.
    ///
    /// UIDs that vanished between SEARCH and FETCH are simply absent
    /// from the result.
    pub(crate) async fn fetch_summaries(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: HashSet<u32> = uids.iter().copied().collect();
        let fetches = self.uid_fetch(&uid_set(uids), SUMMARY_ITEMS).await?;
        Ok(fetches
            .iter()
            .filter_map(|f| raw_message(f, false))
            .filter(|raw| wanted.contains(&raw.uid))
            .collect())
    }

    /// The complete message, or `None` if `uid` does not exist.
    ///
    /// The size is checked first so an oversized message is never
    /// downloaded.
    pub(crate) async fn fetch_message(&mut self, uid: u32) -> Result<Option<RawMessage>> {
        let set = uid.to_string();
        let sizes = self.uid_fetch(&set, "(UID RFC822.SIZE)").await?;
        let Some(size) = sizes.iter().find(|f| f.uid == Some(uid)).map(|f| f.size) else {
            return Ok(None);
        };
        if let Some(size) = size.map(u64::from)
            && size > self.max_message_bytes
        {
            warn!("UID {} is {} bytes, over the download limit", uid, size);
            return Err(Error::AttachmentTooLarge {
                size,
                limit: self.max_message_bytes,
            });
        }

        let fetches = self.uid_fetch(&set, MESSAGE_ITEMS).await?;
        Ok(fetches
            .iter()
            .filter(|f| f.uid == Some(uid))
            .find_map(|f| raw_message(f, true)))
    }

    async fn uid_fetch(&mut self, set: &str, items: &str) -> Result<Vec<Fetch>> {
        debug!("UID FETCH {} {}", set, items);
        let session = &mut self.session;
        within(self.command_timeout, "UID FETCH", async {
            session
                .uid_fetch(set, items)
                .await
                .map_err(|e| imap_error("UID FETCH", e))?
                .try_collect()
                .await
                .map_err(|e| imap_error("UID FETCH", e))
        })
        .await
    }

    pub(crate) async fn store(&mut self, uid: u32, flag: Flag) -> Result<()> {
        let query = flag.store_query();
        debug!("UID STORE {} {}", uid, query);
        let session = &mut self.session;
        within(self.command_timeout, "UID STORE", async {
            let _: Vec<Fetch> = session
                .uid_store(uid.to_string(), &query)
                .await
                .map_err(|e| imap_error("UID STORE", e))?
                .try_collect()
                .await
                .map_err(|e| imap_error("UID STORE", e))?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn copy(&mut self, uid: u32, target: &FolderName) -> Result<()> {
        let encoded = self.names.encode(target);
        debug!("UID COPY {} {}", uid, target);
        let session = &mut self.session;
        within(self.command_timeout, "UID COPY", async {
            session
                .uid_copy(uid.to_string(), &encoded)
                .await
                .map_err(|e| match e {
                    ImapError::No(_) => Error::FolderNotFound {
                        folder: target.to_string(),
                    },
                    other => imap_error("UID COPY", other),
                })
        })
        .await
    }

    /// Atomic `UID MOVE` (RFC 6851). Only valid when `MOVE` is advertised.
    pub(crate) async fn move_to(&mut self, uid: u32, target: &FolderName) -> Result<()> {
        let encoded = self.names.encode(target);
        debug!("UID MOVE {} {}", uid, target);
        let session = &mut self.session;
        within(self.command_timeout, "UID MOVE", async {
            session
                .uid_mv(uid.to_string(), &encoded)
                .await
                .map_err(|e| match e {
                    ImapError::No(_) => Error::FolderNotFound {
                        folder: target.to_string(),
                    },
                    other => imap_error("UID MOVE", other),
                })
        })
        .await
    }

    /// Flag `uid` as deleted and expunge it.
    ///
    /// With `UIDPLUS` only this message is expunged; otherwise a plain
    /// `EXPUNGE` also removes anything else already marked deleted.
    pub(crate) async fn remove(&mut self, uid: u32) -> Result<()> {
        self.store(uid, Flag::Deleted).await?;

        let uidplus = self.capabilities.uidplus;
        let session = &mut self.session;
        within(self.command_timeout, "EXPUNGE", async {
            let expunged: Vec<u32> = if uidplus {
                session
                    .uid_expunge(uid.to_string())
                    .await
                    .map_err(|e| imap_error("UID EXPUNGE", e))?
                    .try_collect::<Vec<u32>>()
                    .await
            } else {
                session
                    .expunge()
                    .await
                    .map_err(|e| imap_error("EXPUNGE", e))?
                    .try_collect::<Vec<u32>>()
                    .await
            }
            .map_err(|e| imap_error("EXPUNGE", e))?;
            debug!("Expunged {} message(s)", expunged.len());
            Ok(())
        })
        .await
    }

    /// Best-effort LOGOUT; the connection is dropped either way.
    pub(crate) async fn logout(mut self) {
        let limit = self.command_timeout;
        if tokio::time::timeout(limit, self.session.logout())
            .await
            .is_err()
        {
            debug!("LOGOUT timed out");
        }
    }
}

/// Text search over subject, sender and body.
///
/// The query is sent as a quoted string; non-ASCII queries declare
/// `CHARSET UTF-8`.
pub(crate) fn text_search(query: &str) -> Result<String> {
    let query = query.trim();
    if query.is_empty() {
        return Err(Error::InvalidArgument("search query is empty".into()));
    }
    if query.contains(['\r', '\n']) {
        return Err(Error::InvalidArgument(
            "search query must be a single line".into(),
        ));
    }
    let quoted = quote(query);
    let charset = if query.is_ascii() {
        ""
    } else {
        "CHARSET UTF-8 "
    };
    Ok(format!(
        "{charset}OR OR SUBJECT {quoted} FROM {quoted} BODY {quoted}"
    ))
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Compact UID set, e.g. `1:3,7`.
fn uid_set(uids: &[u32]) -> String {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for uid in sorted {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == uid => *end = uid,
            _ => ranges.push((uid, uid)),
        }
    }
    ranges
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}:{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn raw_message(fetch: &Fetch, full: bool) -> Option<RawMessage> {
    let uid = fetch.uid?;
    let bytes = if full { fetch.body() } else { fetch.header() };
    Some(RawMessage {
        uid,
        flags: flag::from_imap(fetch.flags()),
        size: fetch.size.map(u64::from),
        internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
        bytes: bytes.map(<[u8]>::to_vec),
    })
}

fn login_error(user: &str, err: ImapError) -> Error {
    match err {
        ImapError::No(reason) | ImapError::Bad(reason) => Error::Authentication {
            user: user.to_string(),
            reason,
        },
        other => imap_error("LOGIN", other),
    }
}

fn imap_error(command: &str, err: ImapError) -> Error {
    match err {
        ImapError::Io(e) => Error::Connection(format!("{command}: {e}")),
        ImapError::ConnectionLost => Error::Connection(format!("{command}: connection lost")),
        other => Error::Protocol(format!("{command}: {other}")),
    }
}

/// Run `fut` with a deadline; expiry is a connection failure.
async fn within<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Connection(format!("{what} timed out after {}s", limit.as_secs_f32())))?
}
