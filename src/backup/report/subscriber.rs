use crate::backup::backup_config::LoggingConfig;
use crate::backup::notifications::smtp::SmtpNotificationConfig;
use crate::backup::report::mail::MailOutbox;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

/// Installs the global subscriber: INFO and above on stderr, everything down
/// to DEBUG in the log file, and the mail layer when mail is configured.
///
/// The returned outbox must be flushed once the run is over.
pub fn init(config: &LoggingConfig) -> Result<Option<MailOutbox<SmtpNotificationConfig>>> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.filename())
        .map_err(Error::from)
        .with_msg(format!("Unable to open log file {:?}", config.filename()))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::INFO);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .with_filter(LevelFilter::DEBUG);

    let outbox = config.mail().as_ref().map(|mail| {
        MailOutbox::new(
            mail.smtp().clone(),
            mail.subject_status().as_str(),
            mail.subject_error().as_str(),
        )
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(outbox.as_ref().map(MailOutbox::layer))
        .try_init()?;

    Ok(outbox)
}
