//! SSH client handler implementation
//!
//! Implements the `russh::client::Handler` trait; its only job is deciding
//! whether to trust the server's host key.

use russh::keys::known_hosts::{check_known_hosts, check_known_hosts_path};
use tracing::{debug, warn};

use super::config::HostKeyPolicy;

/// SSH client handler for russh
#[derive(Debug, Clone)]
pub struct SshHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl SshHandler {
    /// Create a handler checking keys for `host:port` under `policy`
    pub fn new(host: impl Into<String>, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
        }
    }
}

impl russh::client::Handler for SshHandler {
    type Error = anyhow::Error;

    /// Verify the server's host key
    ///
    /// # Security Note
    /// Under [`HostKeyPolicy::AcceptAny`] every key is accepted, so a
    /// man-in-the-middle can impersonate the server. Operators opt into
    /// this explicitly.
    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let path = match &self.policy {
            HostKeyPolicy::AcceptAny => return Ok(true),
            HostKeyPolicy::KnownHosts { path } => path,
        };

        let checked = match path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match checked {
            Ok(true) => {
                debug!("Host key for {}:{} matches known_hosts", self.host, self.port);
                Ok(true)
            }
            Ok(false) => {
                warn!(
                    "Host key for {}:{} is not in known_hosts, rejecting",
                    self.host, self.port
                );
                Ok(false)
            }
            Err(e) => {
                warn!(
                    "Host key check for {}:{} failed: {}",
                    self.host, self.port, e
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_creation() {
        let handler = SshHandler::new("localhost", 22, HostKeyPolicy::AcceptAny);
        let debug = format!("{:?}", handler);
        assert!(debug.contains("SshHandler"));
        assert!(debug.contains("AcceptAny"));
    }
}
