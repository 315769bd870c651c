//! dbhost-admin - Remote MySQL host administration over SSH
//!
//! This crate runs administration tasks against a database host over an
//! SSH connection authenticated with a private key. Every operation opens
//! its own session and closes it before returning.
//!
//! # Features
//!
//! - Stream a remote command's stdout and stderr line by line (`exec`)
//! - Run commands under `sudo` with the password fed on stdin (`sudo-exec`)
//! - Inspect and change mysqld's bind address
//! - Create application and backup MySQL users
//! - Dump databases remotely, or locally and upload the dump with `scp`
//!
//! # Example Usage (CLI)
//!
//! ```bash
//! dbhost-admin --host=10.0.0.5 --key=~/.ssh/id_ed25519 exec uptime
//! dbhost-admin --host=10.0.0.5 --key=~/.ssh/id_ed25519 \
//!   --sudo-password=secret open-bind-address
//! ```

pub mod admin;
pub mod config;
pub mod error;
pub mod mysql;
pub mod ssh;
pub mod transfer;

// Re-exports for convenience
pub use admin::{OperationOutcome, OperationReport, RemoteAdmin};
pub use config::{Args, Config};
pub use error::{AdminError, Result};
pub use ssh::{
    connect, derive_identity, load_identity, run_command, run_elevated, ExitOutcome, ExitPolicy,
    OutputOrder, OutputSink, RunOptions, Session, SigningIdentity, TransportTarget,
};
pub use transfer::Uploader;
