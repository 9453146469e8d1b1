//! The remote side of a backup: one ssh session per host that opens a
//! reverse tunnel back to this machine, the host then pulling what it needs
//! through it.

pub mod process;

use crate::backup::host::Host;
use bon::Builder;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;
use validator::Validate;

pub use process::{CommandOutput, CommandRunner, CommandStatus, SystemCommandRunner};

pub const DEFAULT_PROGRAM: &str = "ssh";
pub const DEFAULT_REMOTE_USER: &str = "root";
pub const DEFAULT_REMOTE_FORWARD_PORT: u16 = 64064;
pub const DEFAULT_LOCAL_SERVICE_PORT: u16 = 22;
pub const DEFAULT_SERVER_ALIVE_INTERVAL: u32 = 10;
pub const DEFAULT_SERVER_ALIVE_COUNT_MAX: u32 = 30;
/// 23 hours plus 10 minutes for the checkpoints done on the remote side.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(23 * 3600 + 600);

/// How the transport is invoked. Every field has a default matching the
/// remote side's expectations, so the `transport:` section is usually absent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct TunnelConfig {
    #[serde(default = "default_program")]
    #[builder(default = default_program(), into)]
    #[validate(length(min = 1))]
    program: String,
    #[serde(default = "default_remote_user")]
    #[builder(default = default_remote_user(), into)]
    #[validate(length(min = 1))]
    remote_user: String,
    #[serde(default = "default_remote_forward_port")]
    #[builder(default = DEFAULT_REMOTE_FORWARD_PORT)]
    remote_forward_port: u16,
    #[serde(default = "default_local_service_port")]
    #[builder(default = DEFAULT_LOCAL_SERVICE_PORT)]
    local_service_port: u16,
    #[serde(default = "default_server_alive_interval")]
    #[builder(default = DEFAULT_SERVER_ALIVE_INTERVAL)]
    server_alive_interval: u32,
    #[serde(default = "default_server_alive_count_max")]
    #[builder(default = DEFAULT_SERVER_ALIVE_COUNT_MAX)]
    server_alive_count_max: u32,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn default_program() -> String {
    DEFAULT_PROGRAM.to_string()
}

fn default_remote_user() -> String {
    DEFAULT_REMOTE_USER.to_string()
}

fn default_remote_forward_port() -> u16 {
    DEFAULT_REMOTE_FORWARD_PORT
}

fn default_local_service_port() -> u16 {
    DEFAULT_LOCAL_SERVICE_PORT
}

fn default_server_alive_interval() -> u32 {
    DEFAULT_SERVER_ALIVE_INTERVAL
}

fn default_server_alive_count_max() -> u32 {
    DEFAULT_SERVER_ALIVE_COUNT_MAX
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// A fully built command line, program first.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct TransportCommand {
    program: String,
    args: Vec<String>,
}

impl TransportCommand {
    pub fn new<S: Into<String>, I: IntoIterator<Item = S>>(program: S, args: I) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Reverse tunnel to `host`, keepalive probing so a dead peer is noticed
    /// after `interval * count_max` seconds, never prompting for anything.
    pub fn for_host(host: &Host, tunnel: &TunnelConfig) -> Self {
        let args = [
            "-o".to_string(),
            format!("ServerAliveInterval={}", tunnel.server_alive_interval),
            "-o".to_string(),
            format!("ServerAliveCountMax={}", tunnel.server_alive_count_max),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-p".to_string(),
            host.port().to_string(),
            "-R".to_string(),
            format!(
                "{}:localhost:{}",
                tunnel.remote_forward_port, tunnel.local_service_port
            ),
            "-l".to_string(),
            tunnel.remote_user.clone(),
            host.hostname().clone(),
        ];
        Self::new(tunnel.program.clone(), args)
    }
}

impl Display for TransportCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            std::iter::once(&self.program).chain(self.args.iter()).join(" ")
        )
    }
}
