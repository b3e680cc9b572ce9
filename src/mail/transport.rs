use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use super::compose::{Body, Letter};
use super::error::MailError;
use crate::google_oauth::GoogleOauthService;
use crate::logging::redact;
use crate::types::SmtpSettings;

const SMTP_TIMEOUT: Duration = Duration::from_secs(20);
const IMPLICIT_TLS_PORT: u16 = 465;

/// Delivers a [`Letter`] through the configured relay.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, settings: &SmtpSettings, letter: Letter) -> Result<(), MailError>;
}

/// lettre-backed SMTP delivery, password or XOAUTH2.
#[derive(Clone)]
pub struct SmtpMailer {
    oauth: GoogleOauthService,
}

impl SmtpMailer {
    pub fn new(oauth: GoogleOauthService) -> Self {
        Self { oauth }
    }

    async fn credentials(
        &self,
        settings: &SmtpSettings,
    ) -> Result<(Credentials, Vec<Mechanism>), MailError> {
        if settings.should_use_oauth2() {
            let (client_id, client_secret) =
                settings.oauth_client().ok_or(MailError::NoCredentials)?;
            let refresh_token = settings
                .google_refresh_token
                .as_deref()
                .ok_or(MailError::NoCredentials)?;
            let access_token = self
                .oauth
                .access_token(client_id, client_secret, refresh_token)
                .await
                .map_err(|e| MailError::OAuth(redact(&e.to_string())))?;
            debug!("using XOAUTH2 for SMTP");
            return Ok((
                Credentials::new(settings.email.clone(), access_token),
                vec![Mechanism::Xoauth2],
            ));
        }

        let password = settings
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or(MailError::NoCredentials)?;
        Ok((
            Credentials::new(settings.email.clone(), password),
            vec![Mechanism::Plain, Mechanism::Login],
        ))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, settings: &SmtpSettings, letter: Letter) -> Result<(), MailError> {
        let subject = letter.subject.clone();
        let message = build_message(settings, letter)?;
        let (credentials, mechanisms) = self.credentials(settings).await?;

        let builder = if settings.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)?
        };
        let transport = builder
            .port(settings.port)
            .credentials(credentials)
            .authentication(mechanisms)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        transport.send(message).await?;
        info!(server = %settings.server, subject = %subject, "email sent");
        Ok(())
    }
}

/// Address a letter from the sender to the recipient in `settings`.
pub fn build_message(settings: &SmtpSettings, letter: Letter) -> Result<Message, MailError> {
    let from: Mailbox = settings.email.parse()?;
    let to: Mailbox = settings.recipient_email.parse()?;
    let builder = Message::builder().from(from).to(to).subject(letter.subject);

    let message = match letter.body {
        Body::Text(text) => builder.header(ContentType::TEXT_PLAIN).body(text)?,
        Body::Html { html, inline } if inline.is_empty() => {
            builder.singlepart(SinglePart::html(html))?
        }
        Body::Html { html, inline } => {
            let mut related = MultiPart::related().singlepart(SinglePart::html(html));
            for image in inline {
                let content_type = ContentType::parse(&image.content_type)
                    .map_err(|e| MailError::Attachment(e.to_string()))?;
                related = related.singlepart(
                    Attachment::new_inline(image.content_id).body(image.bytes, content_type),
                );
            }
            builder.multipart(related)?
        }
    };
    Ok(message)
}
