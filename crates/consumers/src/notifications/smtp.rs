//! SMTP delivery with lettre.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{EmailMessage, Mailer};
use crate::error::MailerError;

/// How the connection to the mail server is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (usually port 587).
    StartTls,
    /// TLS from the first byte (usually port 465).
    Tls,
    /// No encryption, for a relay on a trusted network.
    Plain,
}

impl SmtpSecurity {
    pub fn parse(value: &str) -> Option<SmtpSecurity> {
        match value.trim().to_ascii_lowercase().as_str() {
            "starttls" => Some(SmtpSecurity::StartTls),
            "tls" | "ssl" => Some(SmtpSecurity::Tls),
            "none" | "plain" => Some(SmtpSecurity::Plain),
            _ => None,
        }
    }
}

/// Where and how to reach the mail server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub security: SmtpSecurity,
}

/// Sends notifications through an SMTP server.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Builds the transport. No connection is made until the first send.
    pub fn new(settings: &SmtpSettings, from: &str) -> Result<Self, MailerError> {
        let from: Mailbox = from
            .parse()
            .map_err(|e| MailerError::InvalidMessage(format!("sender {from}: {e}")))?;

        let builder = match settings.security {
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                    .map_err(|e| MailerError::Transport(format!("SMTP relay error: {e}")))?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                .map_err(|e| MailerError::Transport(format!("SMTP relay error: {e}")))?,
            SmtpSecurity::Plain => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            }
        };
        let mut builder = builder.port(settings.port);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        tracing::info!(
            host = %settings.host,
            port = settings.port,
            security = ?settings.security,
            "SMTP mailer configured"
        );
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build(&self, message: &EmailMessage) -> Result<Message, MailerError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| MailerError::InvalidMessage(format!("recipient {}: {e}", message.to)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| MailerError::InvalidMessage(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailerError> {
        let email = self.build(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| MailerError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_relay() -> SmtpSettings {
        SmtpSettings {
            host: "localhost".to_string(),
            port: 2525,
            username: None,
            password: None,
            security: SmtpSecurity::Plain,
        }
    }

    fn message(to: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "Payment Confirmed - Order #7".to_string(),
            body: "Dear Customer,\nThank you.".to_string(),
        }
    }

    #[test]
    fn security_names_parse() {
        assert_eq!(SmtpSecurity::parse("STARTTLS"), Some(SmtpSecurity::StartTls));
        assert_eq!(SmtpSecurity::parse("ssl"), Some(SmtpSecurity::Tls));
        assert_eq!(SmtpSecurity::parse("none"), Some(SmtpSecurity::Plain));
        assert_eq!(SmtpSecurity::parse("smoke-signals"), None);
    }

    #[test]
    fn invalid_sender_is_refused() {
        let err = SmtpMailer::new(&local_relay(), "not an address").err().unwrap();
        assert!(matches!(err, MailerError::InvalidMessage(_)));
    }

    #[test]
    fn message_carries_sender_recipient_and_subject() {
        let mailer = SmtpMailer::new(&local_relay(), "Shop <no-reply@shop.local>").unwrap();
        let email = mailer.build(&message("minh@example.com")).unwrap();

        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("From: Shop <no-reply@shop.local>"));
        assert!(raw.contains("To: minh@example.com"));
        assert!(raw.contains("Subject: Payment Confirmed - Order #7"));
        assert!(raw.contains("Dear Customer,"));
    }

    #[test]
    fn malformed_recipient_is_an_invalid_message() {
        let mailer = SmtpMailer::new(&local_relay(), "no-reply@shop.local").unwrap();
        let err = mailer.build(&message("minh at example")).unwrap_err();
        assert!(matches!(err, MailerError::InvalidMessage(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let settings = SmtpSettings {
            port: 1,
            ..local_relay()
        };
        let mailer = SmtpMailer::new(&settings, "no-reply@shop.local").unwrap();

        let err = mailer.send(&message("minh@example.com")).await.unwrap_err();
        assert!(matches!(err, MailerError::Transport(_)));
    }
}
