use crate::backup::function_path;
use crate::backup::notifications::Notification;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use bon::Builder;
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Display;
use validator::Validate;

/// SMTP delivery of the run mails.
///
/// Credentials are optional, a local relay usually accepts mail from the
/// backup server without them.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct SmtpNotificationConfig {
    #[validate(length(min = 1))]
    #[builder(into)]
    host: String,
    port: Option<u16>,
    smtp_mode: SmtpMode,
    from: Mailbox,
    #[validate(length(min = 1))]
    #[builder(into)]
    to: Vec<Mailbox>,
    #[builder(into)]
    username: Option<String>,
    #[validate(nested)]
    password: Option<RedactedString>,
}

/// SMTP connection security modes
///
/// - `Unsecured`: Plain text connection, for a relay on a trusted network
/// - `Ssl`: SSL/TLS encrypted connection from start
/// - `StartTls`: Start with plain text, then upgrade to TLS
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SmtpMode {
    Unsecured,
    Ssl,
    StartTls,
}

impl SmtpNotificationConfig {
    fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials::new(
                username.clone(),
                password.inner().to_string(),
            )),
            _ => None,
        }
    }
}

impl Notification for SmtpNotificationConfig {
    #[named]
    fn send<D1: Display, D2: Display>(&self, topic: D1, msg: D2) -> Result<()> {
        tracing::debug!(
            "Sending smtp email notification from {:?} to {:?}",
            self.from,
            self.to
        );
        let email = self
            .to
            .iter()
            .fold(Message::builder(), |email, send_to| email.to(send_to.clone()))
            .from(self.from.clone())
            .subject(topic.to_string())
            .header(ContentType::TEXT_PLAIN)
            .body(msg.to_string())
            .map_err(Error::from)
            .with_msg(format!(
                "Fail to build notification email from {:?} to {:?}",
                self.from, self.to
            ))?;

        let mut mailer = match self.smtp_mode {
            SmtpMode::Unsecured => Ok(SmtpTransport::builder_dangerous(self.host.as_str())),
            SmtpMode::Ssl => SmtpTransport::relay(self.host.as_str()),
            SmtpMode::StartTls => SmtpTransport::starttls_relay(self.host.as_str()),
        }
        .map_err(Error::from)
        .with_msg(format!(
            "Failed to build smtp client for host: {:?} with mode {:?}",
            self.host, self.smtp_mode
        ))?;
        if let Some(port) = self.port {
            mailer = mailer.port(port);
        }
        if let Some(credentials) = self.credentials() {
            mailer = mailer.credentials(credentials);
        }

        let response = mailer
            .build()
            .send(&email)
            .map_err(Error::from)
            .with_debug_object_and_fn_name(self.host.clone(), function_path!())?;
        if response.is_positive() {
            Ok(())
        } else {
            Err(Error::SmtpSend(response.message().join(" ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailbox(address: &str) -> Mailbox {
        address.parse().unwrap()
    }

    #[test]
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    fn test_smtp_notification_send() {
        // Skip if running in CI or without network
        if std::env::var("CI").is_ok() {
            return;
        }

        let server = maik::MockServer::builder().no_verify_credentials().build();

        let config = SmtpNotificationConfig::builder()
            .host(server.host().to_string())
            .port(server.port())
            .smtp_mode(SmtpMode::Unsecured)
            .from(mailbox("backup@example.com"))
            .to(vec![mailbox("admin@example.com")])
            .build();

        server.start();
        std::thread::sleep(std::time::Duration::from_millis(100));

        let result = config.send("Backup status", "foo.test : backup completed successfully");

        std::thread::sleep(std::time::Duration::from_millis(200));

        if result.is_ok() {
            let assertion = maik::MailAssertion::new()
                .recipients_are(["admin@example.com"])
                .body_is("foo.test : backup completed successfully");
            assert!(server.assert(assertion));
        }
    }

    #[test]
    fn test_smtp_notification_validation() {
        let valid_config = SmtpNotificationConfig::builder()
            .host("smtp.example.com")
            .smtp_mode(SmtpMode::StartTls)
            .from(mailbox("backup@example.com"))
            .to(vec![mailbox("admin@example.com")])
            .username("backup")
            .password(RedactedString::builder().inner("long enough secret").build())
            .build();
        assert!(valid_config.validate().is_ok());

        let no_recipient = SmtpNotificationConfig::builder()
            .host("smtp.example.com")
            .smtp_mode(SmtpMode::Ssl)
            .from(mailbox("backup@example.com"))
            .to(Vec::<Mailbox>::new())
            .build();
        assert!(no_recipient.validate().is_err());
    }

    #[test]
    fn test_credentials_need_both_parts() {
        let config = SmtpNotificationConfig::builder()
            .host("localhost")
            .smtp_mode(SmtpMode::Unsecured)
            .from(mailbox("backup@example.com"))
            .to(vec![mailbox("admin@example.com")])
            .username("backup")
            .build();

        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let config: SmtpNotificationConfig = serde_yml::from_str(
            "host: mail.example.com\nport: 25\nsmtp_mode: Unsecured\n\
             from: backup@example.com\nto: [admin@example.com, ops@example.com]\n",
        )
        .unwrap();

        assert_eq!(config.port(), &Some(25));
        assert_eq!(config.to().len(), 2);
        assert!(config.password().is_none());
    }
}
