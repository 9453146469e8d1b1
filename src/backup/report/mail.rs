//! Mail delivery of the run's logs.
//!
//! [`MailLayer`] is a `tracing` layer buffering what should be mailed:
//! progress records at INFO and above go to the status mail, detailed records
//! at WARN and above to the error mail. The summary record is not mailed
//! itself, its fields fill the `$WORD` placeholders of the subjects.
//! [`MailOutbox::flush`] sends each non-empty mail once.

use crate::backup::notifications::Notification;
use crate::backup::report::{DETAIL_TARGET, PROGRESS_TARGET, SUBSTITUTE_WORDS, SUMMARY_TARGET};
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::WithMsg;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

pub const UNDEFINED: &str = "<undefined>";

#[derive(Debug, Default)]
struct MailBuffer {
    status: Vec<String>,
    errors: Vec<String>,
    substitutions: BTreeMap<String, String>,
}

/// Replaces every `$WORD` of [`SUBSTITUTE_WORDS`] in `template`.
pub fn substitute(template: &str, substitutions: &BTreeMap<String, String>) -> String {
    SUBSTITUTE_WORDS.iter().fold(template.to_string(), |subject, word| {
        let value = substitutions
            .get(*word)
            .map(String::as_str)
            .unwrap_or(UNDEFINED);
        subject.replace(&format!("${word}"), value)
    })
}

#[derive(Debug, Clone)]
pub struct MailLayer {
    buffer: Arc<Mutex<MailBuffer>>,
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.insert(field, format!("{value:?}"));
    }
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for MailLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        let level = *metadata.level();

        let mailed_as_status = target == PROGRESS_TARGET && level <= Level::INFO;
        let mailed_as_error = target == DETAIL_TARGET && level <= Level::WARN;
        if target != SUMMARY_TARGET && !mailed_as_status && !mailed_as_error {
            return;
        }

        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);

        if target == SUMMARY_TARGET {
            for (name, value) in collector.fields {
                if SUBSTITUTE_WORDS.contains(&name.as_str()) {
                    buffer.substitutions.insert(name, value);
                }
            }
            return;
        }

        let line = format!(
            "{} {:<5} {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            level,
            collector.message.unwrap_or_default()
        );
        if mailed_as_status {
            buffer.status.push(line);
        } else {
            buffer.errors.push(line);
        }
    }
}

/// Sends the mails buffered by its [`MailLayer`] through `notifier`.
#[derive(Debug)]
pub struct MailOutbox<N: Notification> {
    notifier: N,
    subject_status: String,
    subject_error: String,
    buffer: Arc<Mutex<MailBuffer>>,
}

impl<N: Notification> MailOutbox<N> {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        notifier: N,
        subject_status: S1,
        subject_error: S2,
    ) -> Self {
        Self {
            notifier,
            subject_status: subject_status.into(),
            subject_error: subject_error.into(),
            buffer: Arc::default(),
        }
    }

    /// The layer feeding this outbox; install it in the subscriber.
    pub fn layer(&self) -> MailLayer {
        MailLayer {
            buffer: self.buffer.clone(),
        }
    }

    /// Sends the status mail and the error mail, skipping empty ones, then
    /// clears the buffers. Both are attempted even if the first one fails.
    pub fn flush(&self) -> Result<()> {
        let (status, errors, substitutions) = {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            (
                std::mem::take(&mut buffer.status),
                std::mem::take(&mut buffer.errors),
                buffer.substitutions.clone(),
            )
        };

        let errors = [
            (&self.subject_status, status),
            (&self.subject_error, errors),
        ]
        .into_iter()
        .filter(|(_, lines)| !lines.is_empty())
        .filter_map(|(subject, lines)| {
            let subject = substitute(subject, &substitutions);
            self.notifier
                .send(&subject, lines.join("\n"))
                .with_msg(format!("Failed to send mail {subject:?}"))
                .err()
        })
        .collect();

        convert_error_vec(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::report::{Reporter, TracingReporter};
    use crate::backup::result_error::error::Error;
    use std::fmt::Display;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::registry;

    #[derive(Debug, Default, Clone)]
    struct RecordingNotifier {
        sent: Arc<Mutex<Vec<(String, String)>>>,
        fail: bool,
    }

    impl Notification for RecordingNotifier {
        fn send<D1: Display, D2: Display>(&self, topic: D1, msg: D2) -> Result<()> {
            if self.fail {
                return Err(Error::SmtpSend("421 try again later".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((topic.to_string(), msg.to_string()));
            Ok(())
        }
    }

    fn outbox(notifier: RecordingNotifier) -> MailOutbox<RecordingNotifier> {
        MailOutbox::new(notifier, "Backup $STATUS: $SUCCEEDED/$TOTAL", "Backup errors ($FAILED)")
    }

    #[test]
    fn test_substitute() {
        let substitutions = BTreeMap::from([
            ("TOTAL".to_string(), "13".to_string()),
            ("SKIPPED".to_string(), "4".to_string()),
        ]);

        assert_eq!(
            substitute("Success $SUCCEEDED / $TOTAL", &substitutions),
            "Success <undefined> / 13"
        );
        assert_eq!(substitute("no placeholder", &substitutions), "no placeholder");
    }

    #[test]
    fn test_layer_buffers_by_channel() {
        let notifier = RecordingNotifier::default();
        let outbox = outbox(notifier.clone());
        let subscriber = registry().with(outbox.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: PROGRESS_TARGET, "foo.test              : starting backup");
            tracing::debug!(target: PROGRESS_TARGET, "too verbose for the status mail");
            tracing::error!(target: DETAIL_TARGET, "backup of foo.test returned 255");
            tracing::info!(target: DETAIL_TARGET, "not an error");
            tracing::error!(target: "somewhere::else", "not ours");
            tracing::info!(
                target: SUMMARY_TARGET,
                SUCCEEDED = 2usize,
                FAILED = 1usize,
                TOTAL = 3usize,
                STATUS = "failure",
                FOO = 6usize,
                "run summary"
            );
        });
        outbox.flush().unwrap();

        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        let (status_subject, status_body) = &sent[0];
        assert_eq!(status_subject, "Backup failure: 2/3");
        assert!(status_body.contains("starting backup"));
        assert!(!status_body.contains("too verbose"));
        assert!(!status_body.contains("run summary"));
        let (error_subject, error_body) = &sent[1];
        assert_eq!(error_subject, "Backup errors (1)");
        assert!(error_body.contains("returned 255"));
        assert!(!error_body.contains("not an error"));
        assert!(!error_body.contains("not ours"));
    }

    #[test]
    fn test_aborted_run_error_reaches_error_mail() {
        let notifier = RecordingNotifier::default();
        let outbox = outbox(notifier.clone());
        let error = Error::UnknownHost("xxx.test".to_string());

        tracing::subscriber::with_default(registry().with(outbox.layer()), || {
            TracingReporter.detail(Level::ERROR, &error.to_string());
        });
        outbox.flush().unwrap();

        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "Backup errors (<undefined>)");
        assert!(sent[0].1.contains("\"xxx.test\" not present in config, aborting"));
    }

    #[test]
    fn test_flush_empty_sends_nothing() {
        let notifier = RecordingNotifier::default();
        let outbox = outbox(notifier.clone());

        outbox.flush().unwrap();

        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_flush_without_summary_leaves_placeholders_undefined() {
        let notifier = RecordingNotifier::default();
        let outbox = outbox(notifier.clone());

        tracing::subscriber::with_default(registry().with(outbox.layer()), || {
            tracing::warn!(target: DETAIL_TARGET, "failed to take lock on file /tmp/x.lock");
        });
        outbox.flush().unwrap();

        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "Backup errors (<undefined>)");
        assert!(sent[0].1.contains("WARN"));
    }

    #[test]
    fn test_flush_failure_is_reported_and_buffer_cleared() {
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let outbox = outbox(notifier);

        tracing::subscriber::with_default(registry().with(outbox.layer()), || {
            tracing::info!(target: PROGRESS_TARGET, "starting backup");
            tracing::error!(target: DETAIL_TARGET, "backup failed");
        });

        match outbox.flush() {
            Err(Error::LotsOfError(errors)) => assert_eq!(errors.len(), 2),
            _ => panic!("Expected both mails to fail"),
        }
        assert!(outbox.flush().is_ok());
    }
}
