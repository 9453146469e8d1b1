use clap::{Args, Parser, Subcommand};
use qb_backup::backup::backup_config::{select_hosts, BackupConfig, DEFAULT_CONFIG_PATH};
use qb_backup::backup::backuper::Backuper;
use qb_backup::backup::executor::HostBackupExecutor;
use qb_backup::backup::report::{subscriber, Reporter, SharedReporter, TracingReporter};
use qb_backup::backup::result_error::result::Result;
use qb_backup::backup::transport::SystemCommandRunner;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use tracing::{info, warn, Level};

/// Back up a fleet of hosts, one after the other
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the backup of the configured hosts
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Location of config file
    #[arg(short = 'c', long = "conf", value_name = "FILENAME", default_value = DEFAULT_CONFIG_PATH)]
    conf: PathBuf,
    /// Back up only these hosts
    #[arg(long, num_args = 1.., value_name = "HOST", conflicts_with = "exclude")]
    only: Vec<String>,
    /// Back up every host but these
    #[arg(long, num_args = 1.., value_name = "HOST")]
    exclude: Vec<String>,
    /// Quit on the first error
    #[arg(short, long)]
    failfast: bool,
}

fn main() {
    let Command::Run(args) = Cli::parse().command;

    let config = match BackupConfig::load(&args.conf) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            exit(1);
        }
    };

    let outbox = match subscriber::init(&config.logging_or_default()) {
        Ok(outbox) => outbox,
        Err(e) => {
            eprintln!("Logging setup failed: {e}");
            exit(1);
        }
    };
    if config.logging().is_none() {
        warn!("No logging configuration given, default is applied");
    }
    info!("Successfully read configuration from {:?}", args.conf);

    let reporter: SharedReporter = Arc::new(TracingReporter);
    let rc = match run(&config, &args, &reporter) {
        Ok(rc) => rc,
        Err(e) => {
            // detail channel, so it also reaches the error mail
            reporter.detail(Level::ERROR, &e.to_string());
            1
        }
    };

    if let Some(outbox) = outbox {
        if let Err(e) = outbox.flush() {
            eprintln!("Mail delivery failed: {e}");
        }
    }

    exit(rc);
}

fn run(config: &BackupConfig, args: &RunArgs, reporter: &SharedReporter) -> Result<i32> {
    let hosts = select_hosts(config.resolve_hosts()?, &args.only, &args.exclude)?;

    let executor = HostBackupExecutor::new(
        SystemCommandRunner,
        config.transport().clone(),
        reporter.clone(),
    );
    let summary = Backuper::builder()
        .hosts(hosts)
        .failfast(args.failfast)
        .executor(executor)
        .reporter(reporter.clone())
        .build()
        .run()?;

    Ok(summary.return_code())
}
