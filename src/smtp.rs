//! SMTP submission
//!
//! One transaction per send: connect, authenticate, hand over the
//! composed payload, quit. The server accepting the message for relay
//! is the only thing reported; delivery is out of our hands.

use crate::compose::ComposedMessage;
use crate::config::{MailConfig, Security, TlsVerification};
use crate::error::{Error, Result};
use crate::message::Delivery;
use crate::tls;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{debug, info, warn};

fn transport(config: &MailConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    tls::install_default_provider();

    let server = &config.smtp;
    let parameters = TlsParameters::builder(server.host.clone())
        .dangerous_accept_invalid_certs(config.tls == TlsVerification::AcceptInvalidCerts)
        .build()
        .map_err(|e| Error::Config(format!("SMTP TLS setup failed: {e}")))?;
    let tls = match server.security {
        Security::Tls => Tls::Wrapper(parameters),
        Security::StartTls => Tls::Required(parameters),
    };

    Ok(
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(server.host.as_str())
            .port(server.port)
            .tls(tls)
            .credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
            .authentication(vec![Mechanism::Plain, Mechanism::Login])
            .timeout(Some(config.timeouts.command))
            .build(),
    )
}

/// Submit `message` to the configured relay.
pub(crate) async fn send(config: &MailConfig, message: &ComposedMessage) -> Result<Delivery> {
    let recipients = message
        .recipients
        .iter()
        .map(crate::address::Address::to_lettre)
        .collect::<Result<Vec<_>>>()?;
    let envelope = Envelope::new(Some(message.sender.to_lettre()?), recipients)
        .map_err(|e| Error::InvalidArgument(format!("cannot build envelope: {e}")))?;

    let transport = transport(config)?;
    debug!(
        "Submitting {} ({} bytes) to {} for {} recipient(s)",
        message.message_id,
        message.payload.len(),
        config.smtp.address(),
        message.recipients.len()
    );

    let response = transport
        .send_raw(&envelope, &message.payload)
        .await
        .map_err(|e| classify(&config.user, &e))?;

    let reply = format!(
        "{} {}",
        response.code(),
        response
            .message()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    );
    info!("{} accepted: {}", message.message_id, reply);
    Ok(Delivery {
        message_id: message.message_id.clone(),
        recipients: message.recipients.len(),
        response: reply,
    })
}

/// Reply codes 530-539 are authentication failures (RFC 4954); any
/// other negative reply is a refusal of the message itself.
fn classify(user: &str, err: &lettre::transport::smtp::Error) -> Error {
    warn!("SMTP submission failed: {}", err);
    if let Some(code) = err.status() {
        if code.to_string().starts_with("53") {
            return Error::Authentication {
                user: user.to_string(),
                reason: err.to_string(),
            };
        }
        return Error::SendRejected(err.to_string());
    }
    if err.is_client() {
        return Error::Protocol(err.to_string());
    }
    Error::Connection(err.to_string())
}
