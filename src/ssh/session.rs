//! SSH session factory
//!
//! Dials a [`TransportTarget`], negotiates SSH, authenticates with a
//! [`SigningIdentity`] and hands back a [`Session`]. One session serves one
//! logical operation; whoever opens it closes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::auth::SigningIdentity;
use super::channel::{ExecSession, RusshChannel};
use super::config::TransportTarget;
use super::handler::SshHandler;
use crate::error::{AdminError, ConnectErrorKind, ExecErrorKind, Result};

/// An authenticated SSH connection to one target
pub struct Session {
    target: TransportTarget,
    handle: Handle<SshHandler>,
    closed: AtomicBool,
}

/// Open an authenticated session to `target`
///
/// The TCP dial and the SSH handshake (including authentication) are each
/// bounded by the target's connect timeout.
///
/// # Returns
/// * `Ok(Session)` - Open session; the caller must [`close`](ExecSession::close) it
/// * `Err(AdminError::Connect { kind: DialFailed, .. })` - Dial refused or timed out
/// * `Err(AdminError::Connect { kind: HandshakeFailed, .. })` - Negotiation,
///   host key check or authentication failed
pub async fn connect(target: &TransportTarget, identity: &SigningIdentity) -> Result<Session> {
    let connect_timeout = target.connect_timeout();

    if target.host_key_policy().is_insecure() {
        warn!(
            "Host key verification is disabled for {}; the server's identity is not checked",
            target.address()
        );
    }

    info!("Connecting to SSH server {}...", target.address());

    let stream = match timeout(
        connect_timeout,
        TcpStream::connect((target.host(), target.port())),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            error!("Dial to {} failed: {}", target.address(), e);
            return Err(AdminError::connect(ConnectErrorKind::DialFailed, e.to_string()));
        }
        Err(_) => {
            error!(
                "Dial to {} timed out after {}ms",
                target.address(),
                connect_timeout.as_millis()
            );
            return Err(AdminError::connect(
                ConnectErrorKind::DialFailed,
                format!("Connection timeout after {}ms", connect_timeout.as_millis()),
            ));
        }
    };

    let handshake = async {
        let ssh_config = Arc::new(client::Config::default());
        let handler = SshHandler::new(
            target.host(),
            target.port(),
            target.host_key_policy().clone(),
        );

        let mut handle = client::connect_stream(ssh_config, stream, handler)
            .await
            .map_err(|e| AdminError::connect(ConnectErrorKind::HandshakeFailed, format!("{:#}", e)))?;

        authenticate(&mut handle, target.username(), identity).await?;
        Ok::<_, AdminError>(handle)
    };

    let handle = match timeout(connect_timeout, handshake).await {
        Ok(Ok(handle)) => handle,
        Ok(Err(e)) => {
            error!("SSH handshake with {} failed: {}", target.address(), e);
            return Err(e);
        }
        Err(_) => {
            error!(
                "SSH handshake with {} timed out after {}ms",
                target.address(),
                connect_timeout.as_millis()
            );
            return Err(AdminError::connect(
                ConnectErrorKind::HandshakeFailed,
                format!("Handshake timeout after {}ms", connect_timeout.as_millis()),
            ));
        }
    };

    info!(
        "Successfully connected to {}@{}",
        target.username(),
        target.address()
    );

    Ok(Session {
        target: target.clone(),
        handle,
        closed: AtomicBool::new(false),
    })
}

/// Public key authentication, the only method offered
async fn authenticate(
    handle: &mut Handle<SshHandler>,
    username: &str,
    identity: &SigningIdentity,
) -> Result<()> {
    debug!(
        "Attempting key authentication for user '{}' with {}",
        username,
        identity.fingerprint()
    );

    // RSA keys need the strongest hash the server supports; None otherwise
    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .map_err(|e| AdminError::connect(ConnectErrorKind::HandshakeFailed, e.to_string()))?
        .flatten();

    let auth_result = handle
        .authenticate_publickey(username, PrivateKeyWithHashAlg::new(identity.key(), hash_alg))
        .await
        .map_err(|e| AdminError::connect(ConnectErrorKind::HandshakeFailed, e.to_string()))?;

    if auth_result.success() {
        info!("Key authentication successful");
        Ok(())
    } else {
        Err(AdminError::connect(
            ConnectErrorKind::HandshakeFailed,
            format!("Key authentication rejected for user '{}'", username),
        ))
    }
}

impl Session {
    /// Target this session is bound to
    pub fn target(&self) -> &TransportTarget {
        &self.target
    }

    /// Whether [`close`](ExecSession::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecSession for Session {
    type Channel = RusshChannel;

    async fn open_channel(&self) -> Result<RusshChannel> {
        if self.is_closed() {
            return Err(AdminError::exec(
                ExecErrorKind::ChannelOpenFailed,
                "SSH session already closed",
            ));
        }

        let channel = self.handle.channel_open_session().await.map_err(|e| {
            AdminError::exec(
                ExecErrorKind::ChannelOpenFailed,
                format!("Failed to open channel: {}", e),
            )
        })?;

        Ok(RusshChannel::new(channel))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
        {
            debug!("Disconnect from {} reported: {}", self.target.address(), e);
        }

        info!("SSH connection to {} closed", self.target.address());
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.target.host())
            .field("port", &self.target.port())
            .field("username", &self.target.username())
            .field("closed", &self.is_closed())
            .finish()
    }
}
