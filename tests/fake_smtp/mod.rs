//! In-process fake SMTP relay for integration testing
//!
//! Speaks the submission subset `lettre` uses over implicit TLS
//! (RFC 8314):
//!
//! ```text
//!   Server:  220 fake.test ESMTP
//!   Client:  EHLO host
//!   Server:  250-fake.test
//!   Server:  250 AUTH PLAIN LOGIN
//!   Client:  AUTH PLAIN <base64("\0user\0password")>
//!   Server:  235 2.7.0 Authentication successful
//!   Client:  MAIL FROM:<sender>
//!   Client:  RCPT TO:<recipient>        (once per recipient)
//!   Client:  DATA
//!   Server:  354 End data with <CR><LF>.<CR><LF>
//!   Client:  <dot-stuffed message> .
//!   Server:  250 2.0.0 Ok: queued
//!   Client:  QUIT
//! ```
//!
//! Accepted messages are recorded with their envelope so tests can
//! check what actually went over the wire.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

pub const USER: &str = "user@example.com";
pub const PASSWORD: &str = "correct horse";

/// One accepted message.
#[derive(Debug, Clone, Default)]
pub struct Received {
    pub from: String,
    pub recipients: Vec<String>,
    pub data: String,
}

#[derive(Debug, Clone, Default)]
pub struct SmtpOptions {
    /// `RCPT TO` for this address is refused with `550`.
    pub reject_recipient: Option<String>,
}

struct State {
    options: SmtpOptions,
    received: Mutex<Vec<Received>>,
}

pub struct FakeSmtpServer {
    port: u16,
    state: Arc<State>,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeSmtpServer {
    pub async fn start() -> Self {
        Self::start_with(SmtpOptions::default()).await
    }

    pub async fn start_with(options: SmtpOptions) -> Self {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
            .expect("generate self-signed cert");
        let cert_der = cert.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config");
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let state = Arc::new(State {
            options,
            received: Mutex::new(Vec::new()),
        });
        let shared = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                let acceptor = acceptor.clone();
                let shared = shared.clone();
                tokio::spawn(async move {
                    if let Ok(tls) = acceptor.accept(stream).await {
                        handle_smtp_session(BufReader::new(tls), &shared).await;
                    }
                });
            }
        });

        Self {
            port,
            state,
            handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Messages accepted so far.
    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().unwrap().clone()
    }
}

impl Drop for FakeSmtpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn reply<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    line: &str,
) -> std::io::Result<()> {
    stream.get_mut().write_all(line.as_bytes()).await?;
    stream.get_mut().write_all(b"\r\n").await?;
    stream.get_mut().flush().await
}

/// The address between `<` and `>` of a MAIL/RCPT argument.
fn path_address(arg: &str) -> String {
    arg.split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map_or_else(|| arg.trim().to_string(), |(addr, _)| addr.to_string())
}

/// `\0user\0password` in base64, as sent by `AUTH PLAIN`.
fn plain_credentials(encoded: &str) -> Option<(String, String)> {
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let mut parts = text.split('\0').skip(1);
    Some((parts.next()?.to_string(), parts.next()?.to_string()))
}

async fn read_data<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
) -> Option<String> {
    let mut data = String::new();
    loop {
        let mut line = String::new();
        match stream.read_line(&mut line).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        if line == ".\r\n" {
            return Some(data);
        }
        data.push_str(line.strip_prefix('.').unwrap_or(&line));
    }
}

async fn handle_smtp_session<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: BufReader<S>,
    state: &State,
) {
    if reply(&mut stream, "220 fake.test ESMTP ready").await.is_err() {
        return;
    }

    let mut authenticated = false;
    let mut current = Received::default();
    loop {
        let mut line = String::new();
        match stream.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = line.trim_end();
        let (verb, arg) = line.split_once(' ').unwrap_or((line, ""));
        let verb = verb.to_ascii_uppercase();

        let response = match verb.as_str() {
            "EHLO" | "HELO" => "250-fake.test\r\n250 AUTH PLAIN LOGIN".to_string(),
            "AUTH" => {
                let (mechanism, initial) = arg.split_once(' ').unwrap_or((arg, ""));
                let accepted = mechanism.eq_ignore_ascii_case("PLAIN")
                    && plain_credentials(initial)
                        .is_some_and(|(user, pass)| user == USER && pass == PASSWORD);
                authenticated = accepted;
                if accepted {
                    "235 2.7.0 Authentication successful".to_string()
                } else {
                    "535 5.7.8 Authentication credentials invalid".to_string()
                }
            }
            "MAIL" if !authenticated => "530 5.7.0 Authentication required".to_string(),
            "MAIL" => {
                current = Received {
                    from: path_address(arg),
                    ..Received::default()
                };
                "250 2.1.0 Ok".to_string()
            }
            "RCPT" => {
                let address = path_address(arg);
                if state.options.reject_recipient.as_deref() == Some(address.as_str()) {
                    format!("550 5.1.1 <{address}>: Recipient address rejected")
                } else {
                    current.recipients.push(address);
                    "250 2.1.5 Ok".to_string()
                }
            }
            "DATA" if current.recipients.is_empty() => "554 5.5.1 No valid recipients".to_string(),
            "DATA" => {
                if reply(&mut stream, "354 End data with <CR><LF>.<CR><LF>")
                    .await
                    .is_err()
                {
                    break;
                }
                let Some(data) = read_data(&mut stream).await else {
                    break;
                };
                current.data = data;
                state
                    .received
                    .lock()
                    .unwrap()
                    .push(std::mem::take(&mut current));
                "250 2.0.0 Ok: queued".to_string()
            }
            "RSET" => {
                current = Received::default();
                "250 2.0.0 Ok".to_string()
            }
            "NOOP" => "250 2.0.0 Ok".to_string(),
            "QUIT" => {
                let _ = reply(&mut stream, "221 2.0.0 Bye").await;
                break;
            }
            _ => "502 5.5.2 Command not recognized".to_string(),
        };
        if reply(&mut stream, &response).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_and_credentials() {
        assert_eq!(path_address("FROM:<a@b.test> SIZE=10"), "a@b.test");
        assert_eq!(path_address("TO:<c@d.test>"), "c@d.test");

        let encoded = STANDARD.encode("\0me@x.test\0pw");
        assert_eq!(
            plain_credentials(&encoded),
            Some(("me@x.test".to_string(), "pw".to_string()))
        );
        assert_eq!(plain_credentials("!!!"), None);
    }
}
