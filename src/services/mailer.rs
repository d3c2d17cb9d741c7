use async_trait::async_trait;
use futures::lock::Mutex;
use lettre::message::{Mailbox, MultiPart};
use lettre::Message;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub const OTP_SUBJECT: &str = "Your NYSC Corper Verification Code";
pub const RESET_SUBJECT: &str = "Reset your NYSC Corper password";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("delivery to {0} failed")]
    Delivery(String),
}

pub type MailResult<T> = Result<T, MailError>;

fn otp_text(otp: &str, ttl_minutes: i64) -> String {
    format!(
        "Welcome to NYSC service!\n\n\
         Your verification code (OTP) is: {otp}\n\n\
         This code expires in {ttl_minutes} minutes.\n\
         Do not share this code with anyone.\n\n\
         Thanks,\nNYSC App Team"
    )
}

fn otp_html(otp: &str, ttl_minutes: i64) -> String {
    format!(
        "<html>\n<body>\n\
         <h2>Welcome to NYSC Service!</h2>\n\
         <p>Your verification code is:</p>\n\
         <h1 style=\"font-size: 32px; letter-spacing: 8px;\">{otp}</h1>\n\
         <p>This code expires in {ttl_minutes} minutes.</p>\n\
         <p>Do not share this code with anyone.</p>\n\
         <br>\n<p>Thanks,<br>NYSC App Team</p>\n\
         </body>\n</html>"
    )
}

fn reset_text(link: &str) -> String {
    format!("Click this link to reset your password: {}", link)
}

fn reset_html(link: &str) -> String {
    format!(
        "<html>\n<body>\n\
         <p>Click this link to reset your password:</p>\n\
         <p><a href=\"{link}\">{link}</a></p>\n\
         </body>\n</html>"
    )
}

fn build(from: &str, to: &str, subject: &str, text: String, html: String) -> MailResult<Message> {
    let from: Mailbox = from.parse()?;
    let to: Mailbox = to.parse()?;
    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .multipart(MultiPart::alternative_plain_html(text, html))?;
    Ok(message)
}

/// Verification code email sent after sign-up and on resend.
pub fn otp_message(from: &str, to: &str, otp: &str, ttl_minutes: i64) -> MailResult<Message> {
    build(from, to, OTP_SUBJECT, otp_text(otp, ttl_minutes), otp_html(otp, ttl_minutes))
}

pub fn password_reset_message(from: &str, to: &str, link: &str) -> MailResult<Message> {
    build(from, to, RESET_SUBJECT, reset_text(link), reset_html(link))
}

/// Outgoing mail. Delivery failures are reported, never retried here.
#[async_trait]
pub trait Mailer {
    async fn send(&self, message: Message) -> MailResult<()>;
}

/// Writes every message to the log instead of delivering it.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: Message) -> MailResult<()> {
        let headers = message.headers();
        info!(
            from = headers.get_raw("From").unwrap_or_default(),
            to = headers.get_raw("To").unwrap_or_default(),
            subject = headers.get_raw("Subject").unwrap_or_default(),
            "Outgoing email (not delivered)"
        );
        debug!("{}", String::from_utf8_lossy(&message.formatted()));
        Ok(())
    }
}

/// Keeps sent messages in memory so tests can inspect them.
#[derive(Clone, Default)]
pub struct RecorderMailer {
    pub sent: Arc<Mutex<Vec<Message>>>,
    errors: Arc<Mutex<HashSet<String>>>,
}

impl RecorderMailer {
    /// Makes sending to `to` fail from now on.
    pub async fn fail_for(&self, to: &str) {
        self.errors.lock().await.insert(to.to_string());
    }

    pub async fn last_to(&self, to: &str) -> Option<Message> {
        let sent = self.sent.lock().await;
        sent.iter()
            .rev()
            .find(|m| m.headers().get_raw("To") == Some(to))
            .cloned()
    }
}

#[async_trait]
impl Mailer for RecorderMailer {
    async fn send(&self, message: Message) -> MailResult<()> {
        let to = message.headers().get_raw("To").unwrap_or_default().to_string();
        if self.errors.lock().await.contains(&to) {
            return Err(MailError::Delivery(to));
        }
        self.sent.lock().await.push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FROM: &str = "no-reply@corperrides.ng";

    #[test]
    fn otp_email_body() {
        let text = otp_text("123456", 10);
        assert!(text.contains("Your verification code (OTP) is: 123456"));
        assert!(text.contains("This code expires in 10 minutes."));
        assert!(otp_html("123456", 10).contains(">123456</h1>"));

        let message = otp_message(FROM, "ada@example.com", "123456", 10).unwrap();
        assert_eq!(message.headers().get_raw("To"), Some("ada@example.com"));
        assert_eq!(message.headers().get_raw("Subject"), Some(OTP_SUBJECT));

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Content-Type: multipart/alternative"));
        assert!(formatted.contains("Your verification code (OTP) is: 123456"));
    }

    #[test]
    fn reset_email_carries_link() {
        assert_eq!(
            reset_text("http://localhost:3000/reset-password?token=abc"),
            "Click this link to reset your password: http://localhost:3000/reset-password?token=abc"
        );

        let message = password_reset_message(FROM, "ada@example.com", "https://r.ng/t?k=abc").unwrap();
        assert_eq!(message.headers().get_raw("Subject"), Some(RESET_SUBJECT));
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Click this link to reset your password: https://r.ng/t?k=abc"));
        assert!(formatted.contains("Content-Type: text/html"));
    }

    #[test]
    fn bad_address_is_an_error() {
        let err = otp_message(FROM, "not an address", "123456", 10).unwrap_err();
        assert!(matches!(err, MailError::Address(_)));
    }

    #[tokio::test]
    async fn recorder_keeps_messages() {
        let mailer = RecorderMailer::default();
        for (to, otp) in [("a@example.com", "111111"), ("b@example.com", "222222"), ("a@example.com", "333333")] {
            mailer.send(otp_message(FROM, to, otp, 10).unwrap()).await.unwrap();
        }

        let last = mailer.last_to("a@example.com").await.unwrap();
        assert!(String::from_utf8(last.formatted()).unwrap().contains("333333"));
        assert!(mailer.last_to("c@example.com").await.is_none());
    }

    #[tokio::test]
    async fn recorder_fails_on_request() {
        let mailer = RecorderMailer::default();
        mailer.fail_for("b@example.com").await;

        let err = mailer.send(otp_message(FROM, "b@example.com", "1", 10).unwrap()).await.unwrap_err();
        assert_eq!(err.to_string(), "delivery to b@example.com failed");
        assert!(mailer.last_to("b@example.com").await.is_none());
    }

    #[tokio::test]
    async fn log_mailer_never_fails() {
        let message = password_reset_message(FROM, "x@example.com", "link").unwrap();
        assert!(LogMailer.send(message).await.is_ok());
    }
}
