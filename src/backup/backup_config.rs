use crate::backup::host::{Host, HostDefaults, HostEntry};
use crate::backup::include::load_yaml_with_includes;
use crate::backup::notifications::smtp::SmtpNotificationConfig;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::transport::TunnelConfig;
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/backup/config.yml";
pub const DEFAULT_LOG_FILE: &str = "./backup.log";
pub const DEFAULT_SUBJECT_STATUS: &str = "Backup status";
pub const DEFAULT_SUBJECT_ERROR: &str = "Backup errors";

#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupConfig {
    #[serde(default, rename = "default")]
    #[builder(default)]
    #[validate(nested)]
    host_defaults: HostDefaults,
    #[serde(default)]
    #[builder(default)]
    #[validate(custom(function = validate_host_entries))]
    hosts: Vec<HostEntry>,
    #[validate(nested)]
    logging: Option<LoggingConfig>,
    #[serde(default)]
    #[builder(default)]
    #[validate(nested)]
    transport: TunnelConfig,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct LoggingConfig {
    #[serde(default = "default_log_file")]
    #[builder(default = default_log_file(), into)]
    filename: PathBuf,
    #[validate(nested)]
    mail: Option<MailConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Two mails per run: the progress of every host, and the errors if any.
/// Subjects may use `$SUCCEEDED`, `$FAILED`, `$SKIPPED`, `$TOTAL`, `$RUNTIME`
/// and `$STATUS`.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct MailConfig {
    #[serde(default = "default_subject_status")]
    #[builder(default = default_subject_status(), into)]
    subject_status: String,
    #[serde(default = "default_subject_error")]
    #[builder(default = default_subject_error(), into)]
    subject_error: String,
    #[validate(nested)]
    smtp: SmtpNotificationConfig,
}

fn validate_host_entries(entries: &[HostEntry]) -> std::result::Result<(), ValidationError> {
    for entry in entries {
        if let Err(errors) = entry.validate() {
            return Err(ValidationError::new("InvalidHost").with_message(errors.to_string().into()));
        }
    }
    Ok(())
}

fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

fn default_subject_status() -> String {
    DEFAULT_SUBJECT_STATUS.to_string()
}

fn default_subject_error() -> String {
    DEFAULT_SUBJECT_ERROR.to_string()
}

impl BackupConfig {
    /// Reads a configuration file, `!include` tags resolved, and validates it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let value = load_yaml_with_includes(path)?;
        let config: Self = serde_yml::from_value(value)
            .map_err(Error::from)
            .with_msg(format!("badly formatted file {path:?}"))?;
        config
            .validate()
            .map_err(Error::from)
            .with_msg(format!("invalid configuration {path:?}"))?;
        Ok(config)
    }

    /// The `logging` section, or the default one when the file has none.
    pub fn logging_or_default(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Every configured host, in file order, defaults applied.
    pub fn resolve_hosts(&self) -> Result<Vec<Host>> {
        self.hosts
            .iter()
            .map(|entry| entry.resolve(&self.host_defaults))
            .collect()
    }
}

/// Restricts `hosts` to `only`, or removes `exclude` from them, keeping the
/// configured order. Naming a host that is not configured is an error so a
/// typo cannot silently change what gets backed up.
pub fn select_hosts(hosts: Vec<Host>, only: &[String], exclude: &[String]) -> Result<Vec<Host>> {
    if let Some(unknown) = only
        .iter()
        .chain(exclude.iter())
        .find(|name| !hosts.iter().any(|h| h.hostname() == *name))
    {
        return Err(Error::UnknownHost(unknown.clone()));
    }

    Ok(hosts
        .into_iter()
        .filter(|h| only.is_empty() || only.contains(h.hostname()))
        .filter(|h| !exclude.contains(h.hostname()))
        .collect())
}
