//! # qb_backup
//!
//! Sequential backup of a fleet of remote hosts.
//!
//! ## Features
//!
//! - **One host at a time**: each host gets an ssh session opening a reverse
//!   tunnel, the host pulls its backup through it
//! - **Lock per host**: a run never overlaps another run on the same host
//! - **Failfast**: optionally stop at the first failing host
//! - **Reporting**: detailed log file, terse progress on stderr, and two
//!   summary mails (progress, errors) with `$TOTAL`-style subject placeholders
//!
//! ## Quick Start
//!
//! ```no_run
//! use qb_backup::backup::backup_config::BackupConfig;
//! use qb_backup::backup::backuper::Backuper;
//! use qb_backup::backup::executor::HostBackupExecutor;
//! use qb_backup::backup::report::TracingReporter;
//! use qb_backup::backup::transport::SystemCommandRunner;
//! use std::sync::Arc;
//!
//! let config = BackupConfig::load("/etc/backup/config.yml")?;
//! let reporter = Arc::new(TracingReporter);
//! let executor = HostBackupExecutor::new(
//!     SystemCommandRunner,
//!     config.transport().clone(),
//!     reporter.clone(),
//! );
//! let summary = Backuper::builder()
//!     .hosts(config.resolve_hosts()?)
//!     .executor(executor)
//!     .reporter(reporter)
//!     .build()
//!     .run()?;
//! std::process::exit(summary.return_code());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
