//! Account and connection configuration
//!
//! A [`MailConfig`] is built once at startup and never mutated; the
//! client keeps it behind an `Arc` and hands references to every
//! session it opens.

use crate::error::{Error, Result};
use std::env;
use std::fmt;
use std::time::Duration;

const DEFAULT_IMAP_PORT: u16 = 993;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_MESSAGE_BYTES: u64 = 25 * 1024 * 1024;

/// How the TLS layer is established on a connection.
///
/// Both modes end in an encrypted stream; there is no plaintext mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// TLS from the first byte (IMAPS 993, SMTPS 465).
    Tls,
    /// Plain greeting, then a mandatory STARTTLS upgrade.
    StartTls,
}

impl Security {
    /// The conventional mode for a well-known port.
    #[must_use]
    pub const fn for_imap_port(port: u16) -> Self {
        if port == 143 { Self::StartTls } else { Self::Tls }
    }

    #[must_use]
    pub const fn for_smtp_port(port: u16) -> Self {
        if port == 465 { Self::Tls } else { Self::StartTls }
    }

    fn parse(key: &str, value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tls" | "ssl" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            other => Err(Error::Config(format!(
                "Invalid {key}: {other:?} (expected tls or starttls)"
            ))),
        }
    }
}

/// Certificate verification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsVerification {
    /// Verify against the bundled web PKI roots.
    #[default]
    Verify,
    /// Accept any certificate (local bridges, self-signed test servers).
    AcceptInvalidCerts,
}

/// Host, port and TLS mode of one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub security: Security,
}

impl ServerConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, security: Security) -> Self {
        Self {
            host: host.into(),
            port,
            security,
        }
    }

    pub(crate) fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upper bounds on every network wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP connect, TLS handshake and authentication.
    pub connect: Duration,
    /// Each command round-trip.
    pub command: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            command: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Configuration for one mail account.
#[derive(Clone)]
pub struct MailConfig {
    /// Login name; also used as the sender address.
    pub user: String,
    /// Account or app password. Never logged.
    pub password: String,
    pub imap: ServerConfig,
    pub smtp: ServerConfig,
    pub timeouts: Timeouts,
    /// Largest message `read_email` will download, and largest single
    /// attachment `send_email` will read from disk.
    pub max_message_bytes: u64,
    pub tls: TlsVerification,
    /// Pause before the single retry of a read-only operation.
    pub retry_backoff: Duration,
}

impl MailConfig {
    /// Configuration with default ports, timeouts and limits.
    #[must_use]
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        imap_host: impl Into<String>,
        smtp_host: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            imap: ServerConfig::new(
                imap_host,
                DEFAULT_IMAP_PORT,
                Security::for_imap_port(DEFAULT_IMAP_PORT),
            ),
            smtp: ServerConfig::new(
                smtp_host,
                DEFAULT_SMTP_PORT,
                Security::for_smtp_port(DEFAULT_SMTP_PORT),
            ),
            timeouts: Timeouts::default(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            tls: TlsVerification::default(),
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Load configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `EMAIL_USER`
    /// - `EMAIL_PASSWORD`
    /// - `IMAP_HOST`
    /// - `SMTP_HOST`
    ///
    /// Optional (with defaults):
    /// - `IMAP_PORT` (default: `993`)
    /// - `SMTP_PORT` (default: `587`)
    /// - `IMAP_SECURITY` / `SMTP_SECURITY` (`tls` or `starttls`,
    ///   default derived from the port)
    /// - `MAIL_TIMEOUT_SECS` (default: `30`)
    /// - `MAIL_MAX_MESSAGE_BYTES` (default: 25 MiB)
    /// - `MAIL_ACCEPT_INVALID_CERTS` (default: `false`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`MailConfig::from_env`] over an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{key} not set")))
        };

        let imap_port = parse_port(&lookup, "IMAP_PORT", DEFAULT_IMAP_PORT)?;
        let smtp_port = parse_port(&lookup, "SMTP_PORT", DEFAULT_SMTP_PORT)?;

        let imap_security = match lookup("IMAP_SECURITY") {
            Some(v) => Security::parse("IMAP_SECURITY", &v)?,
            None => Security::for_imap_port(imap_port),
        };
        let smtp_security = match lookup("SMTP_SECURITY") {
            Some(v) => Security::parse("SMTP_SECURITY", &v)?,
            None => Security::for_smtp_port(smtp_port),
        };

        let timeout = match lookup("MAIL_TIMEOUT_SECS") {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| Error::Config(format!("Invalid MAIL_TIMEOUT_SECS: {v:?}")))?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let max_message_bytes = match lookup("MAIL_MAX_MESSAGE_BYTES") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("Invalid MAIL_MAX_MESSAGE_BYTES: {e}")))?,
            None => DEFAULT_MAX_MESSAGE_BYTES,
        };

        let tls = match lookup("MAIL_ACCEPT_INVALID_CERTS").as_deref().map(str::trim) {
            Some("1" | "true" | "yes") => TlsVerification::AcceptInvalidCerts,
            _ => TlsVerification::Verify,
        };

        Ok(Self {
            user: required("EMAIL_USER")?,
            password: required("EMAIL_PASSWORD")?,
            imap: ServerConfig::new(required("IMAP_HOST")?, imap_port, imap_security),
            smtp: ServerConfig::new(required("SMTP_HOST")?, smtp_port, smtp_security),
            timeouts: Timeouts {
                connect: timeout,
                command: timeout,
            },
            max_message_bytes,
            tls,
            retry_backoff: Duration::from_millis(500),
        })
    }
}

fn parse_port(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u16) -> Result<u16> {
    lookup(key).map_or(Ok(default), |v| {
        v.trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {key}: {e}")))
    })
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("imap", &self.imap)
            .field("smtp", &self.smtp)
            .field("timeouts", &self.timeouts)
            .field("max_message_bytes", &self.max_message_bytes)
            .field("tls", &self.tls)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}
