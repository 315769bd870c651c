//! SSH transport target
//!
//! Where to connect, as whom, how long to wait, and how far to trust the
//! server's host key.

use std::path::PathBuf;
use std::time::Duration;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Account the deployment logs in as unless told otherwise
pub const DEFAULT_USERNAME: &str = "ubuntu";

/// Bound on both the TCP dial and the SSH handshake
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How the server's host key is checked during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept any host key. The transport is authenticated but the server
    /// is not verified.
    AcceptAny,
    /// Require the key to be present in a known_hosts file
    /// (`~/.ssh/known_hosts` when no path is given)
    KnownHosts { path: Option<PathBuf> },
}

impl HostKeyPolicy {
    /// Whether host key verification is skipped
    pub fn is_insecure(&self) -> bool {
        matches!(self, HostKeyPolicy::AcceptAny)
    }
}

/// Remote endpoint of a transport session; immutable once built
#[derive(Debug, Clone)]
pub struct TransportTarget {
    host: String,
    port: u16,
    username: String,
    connect_timeout: Duration,
    host_key_policy: HostKeyPolicy,
}

impl TransportTarget {
    /// Target `host:22` as the default account with a 10 second timeout,
    /// accepting any host key
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: DEFAULT_USERNAME.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            host_key_policy: HostKeyPolicy::AcceptAny,
        }
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the remote account
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the dial/handshake timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the host key policy
    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn host_key_policy(&self) -> &HostKeyPolicy {
        &self.host_key_policy
    }

    /// `host:port` as dialed
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
