use crate::config::SmtpConfig;
use crate::error::NotifyError;
use crate::notify::EmailTransport;
use async_trait::async_trait;
use lettre::message::{Mailbox, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Sends HTML mail through an authenticated SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(smtp: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&smtp.from)?;
        let creds = Credentials::new(smtp.username.clone(), smtp.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.server)
            .map_err(|e| NotifyError::Smtp(e.to_string()))?
            .port(smtp.port)
            .credentials(creds)
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl EmailTransport for SmtpMailer {
    #[tracing::instrument(skip(self, html))]
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(to)?)
            .subject(subject)
            .header(lettre::message::header::MIME_VERSION_1_0)
            .singlepart(SinglePart::html(html.to_string()))
            .map_err(|e| NotifyError::EmailBuild(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        Ok(())
    }
}

/// Stand-in used when no SMTP relay is configured. Every send fails with
/// [`NotifyError::EmailDisabled`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledMailer;

#[async_trait]
impl EmailTransport for DisabledMailer {
    async fn send_email(&self, _to: &str, _subject: &str, _html: &str) -> Result<(), NotifyError> {
        Err(NotifyError::EmailDisabled)
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| NotifyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_parsing() {
        assert!(parse_mailbox("Ops <ops@example.com>").is_ok());
        assert!(matches!(
            parse_mailbox("not-an-address"),
            Err(NotifyError::InvalidAddress { .. })
        ));
    }

    #[tokio::test]
    async fn disabled_mailer_refuses() {
        let result = DisabledMailer
            .send_email("ops@example.com", "subject", "<p>body</p>")
            .await;
        assert!(matches!(result, Err(NotifyError::EmailDisabled)));
    }

    #[test]
    fn smtp_mailer_rejects_bad_from() {
        let smtp = SmtpConfig {
            server: "smtp.example.com".into(),
            port: 587,
            username: "u".into(),
            password: "p".into(),
            from: "nope".into(),
        };
        assert!(SmtpMailer::from_config(&smtp).is_err());
    }
}
