//! Remote command execution over SSH
//!
//! Leaf-first: [`auth`] turns key bytes into a signing identity, [`session`]
//! opens an authenticated session with it, [`command`] streams one command's
//! output over a fresh channel, and [`elevation`] runs a buffered command
//! under sudo.

pub mod auth;
pub mod channel;
pub mod command;
pub mod config;
pub mod elevation;
pub mod handler;
pub mod sanitize;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use auth::{derive_identity, load_identity, SigningIdentity};
pub use channel::{ChannelEvent, ExecChannel, ExecSession, RusshChannel};
pub use command::{
    run_command, CollectedOutput, ExitOutcome, ExitPolicy, OutputLine, OutputOrder, OutputSink,
    PrintSink, RunOptions, StreamKind,
};
pub use config::{HostKeyPolicy, TransportTarget};
pub use elevation::{escape_for_shell, run_elevated, wrap_sudo_command};
pub use handler::SshHandler;
pub use sanitize::sanitize_command;
pub use session::{connect, Session};
