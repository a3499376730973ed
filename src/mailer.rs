use anyhow::Context;
use axum::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use tracing::info;

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<()>;
}

/// SMTP-backed mail delivery.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(cfg.username.clone(), cfg.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .context("smtp transport")?
            .credentials(creds)
            .port(cfg.port)
            .build();
        let from = cfg.from.parse().context("parse SMTP_FROM mailbox")?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse()
                .with_context(|| format!("parse recipient mailbox {}", to))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .context("build email")?;

        self.transport.send(message).await.context("smtp send")?;
        info!(to, subject, "email sent");
        Ok(())
    }
}

/// Subject and HTML body of the account-verification email. The link embeds
/// the user's single-use verification token.
pub fn verification_email(base_url: &str, token: &str) -> (String, String) {
    let link = format!("{}/verify/{}", base_url.trim_end_matches('/'), token);
    (
        "Verify email".to_string(),
        format!(
            r#"<a target="_blank" href="{}">Click verify email</a>"#,
            link
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_email_embeds_link() {
        let (subject, html) = verification_email("https://phonebook.app", "tok123");
        assert_eq!(subject, "Verify email");
        assert!(html.contains("https://phonebook.app/verify/tok123"));
        assert!(html.contains("href="));
    }

    #[test]
    fn verification_email_trims_trailing_slash() {
        let (_, html) = verification_email("https://phonebook.app/", "tok123");
        assert!(html.contains("https://phonebook.app/verify/tok123"));
        assert!(!html.contains(".app//verify"));
    }
}
