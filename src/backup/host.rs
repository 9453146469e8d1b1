//! Hosts to back up, as written in the configuration and once resolved
//! against the configured defaults.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::validate::{validate_hostname, validate_lock_template};
use bon::Builder;
use derive_more::From;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, skip_serializing_none, DisplayFromStr, PickFirst};
use std::path::PathBuf;
use std::result;
use validator::{Validate, ValidationErrors};

pub const DEFAULT_PORT: u16 = 22;

/// Placeholder replaced by the hostname in the default lock template.
pub const LOCK_TEMPLATE_PLACEHOLDER: &str = "{}";

/// A host ready to be backed up. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Builder, Getters, CopyGetters)]
pub struct Host {
    #[builder(into)]
    #[getset(get = "pub")]
    hostname: String,
    #[builder(default = DEFAULT_PORT)]
    #[getset(get_copy = "pub")]
    port: u16,
    #[builder(into)]
    #[getset(get = "pub")]
    lock: PathBuf,
}

/// Values applied to every host that does not set them itself.
#[serde_as]
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate, Builder)]
#[serde(deny_unknown_fields)]
pub struct HostDefaults {
    /// Lock file path, `{}` standing for the hostname.
    #[validate(custom(function = validate_lock_template))]
    #[builder(into)]
    pub lock: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub port: Option<u16>,
}

#[serde_as]
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate, Builder)]
#[serde(deny_unknown_fields)]
pub struct HostSpec {
    #[validate(custom(function = validate_hostname))]
    #[builder(into)]
    pub hostname: String,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub port: Option<u16>,
    #[builder(into)]
    pub lock: Option<PathBuf>,
}

/// A `hosts:` entry, either a bare hostname or a mapping.
#[derive(Clone, Debug, PartialEq, Eq, From, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostEntry {
    Name(String),
    Spec(HostSpec),
}

impl Validate for HostEntry {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            Self::Name(hostname) => {
                let mut errors = ValidationErrors::new();
                if let Err(e) = validate_hostname(hostname) {
                    errors.add("hostname", e);
                    return Err(errors);
                }
                Ok(())
            }
            Self::Spec(spec) => spec.validate(),
        }
    }
}

impl HostEntry {
    /// Merges the defaults into this entry, the entry's own values winning.
    pub fn resolve(&self, defaults: &HostDefaults) -> Result<Host> {
        let (hostname, port, lock) = match self {
            Self::Name(hostname) => (hostname.as_str(), None, None),
            Self::Spec(spec) => (spec.hostname.as_str(), spec.port, spec.lock.as_deref()),
        };

        let lock = match (lock, defaults.lock.as_deref()) {
            (Some(lock), _) => lock.to_path_buf(),
            (None, Some(template)) => lock_from_template(template, hostname),
            (None, None) => return Err(Error::MissingLock(hostname.to_string())),
        };

        Ok(Host::builder()
            .hostname(hostname)
            .port(port.or(defaults.port).unwrap_or(DEFAULT_PORT))
            .lock(lock)
            .build())
    }
}

fn lock_from_template(template: &str, hostname: &str) -> PathBuf {
    PathBuf::from(template.replace(LOCK_TEMPLATE_PLACEHOLDER, hostname))
}
