//! Error types for dbhost-admin

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Stage at which opening a transport session failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    /// TCP dial failed, was refused, or timed out
    DialFailed,
    /// SSH negotiation, host key check, or public key authentication failed
    HandshakeFailed,
}

impl fmt::Display for ConnectErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectErrorKind::DialFailed => write!(f, "dial failed"),
            ConnectErrorKind::HandshakeFailed => write!(f, "handshake failed"),
        }
    }
}

/// Step of a remote command invocation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    /// The session refused to open an execution channel
    ChannelOpenFailed,
    /// The channel's input endpoint could not be written or closed
    PipeSetupFailed,
    /// The exec request was rejected or could not be sent
    StartFailed,
    /// An output pump or line reader task died before draining its stream
    StreamFailed,
}

impl fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecErrorKind::ChannelOpenFailed => write!(f, "channel open failed"),
            ExecErrorKind::PipeSetupFailed => write!(f, "pipe setup failed"),
            ExecErrorKind::StartFailed => write!(f, "start failed"),
            ExecErrorKind::StreamFailed => write!(f, "stream failed"),
        }
    }
}

/// Main error type for dbhost-admin
#[derive(Debug, Error)]
pub enum AdminError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A local file could not be read or found
    #[error("Failed to access {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Private key could not be parsed or decrypted
    #[error("Authentication failed: {reason}: {cause}")]
    Authentication { reason: String, cause: String },

    /// Transport session could not be established
    #[error("SSH connection error ({kind}): {message}")]
    Connect {
        kind: ConnectErrorKind,
        message: String,
    },

    /// A step of remote command execution failed
    #[error("Remote execution error ({kind}): {message}")]
    Exec { kind: ExecErrorKind, message: String },

    /// The remote command exited unsuccessfully
    #[error("Remote command failed: {}", describe_exit(.status, .signal))]
    RemoteNonZeroExit {
        status: Option<u32>,
        signal: Option<String>,
    },

    /// A sudo-wrapped command failed; carries everything it wrote to stderr
    #[error("Elevated command failed: {source}")]
    ElevatedCommandFailed {
        stderr: String,
        #[source]
        source: Box<AdminError>,
    },

    /// A local helper process (scp, mysqldump) failed
    #[error("External process `{program}` failed: {message}")]
    ExternalProcess { program: String, message: String },

    /// Command execution exceeded the caller's deadline
    #[error("Command timeout after {0}ms")]
    Timeout(u64),

    /// Low-level SSH protocol error
    #[error("SSH transport error: {0}")]
    Transport(String),

    /// Invalid parameters provided
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

fn describe_exit(status: &Option<u32>, signal: &Option<String>) -> String {
    match (status, signal) {
        (_, Some(signal)) => format!("killed by signal {}", signal),
        (Some(code), None) => format!("exit status {}", code),
        (None, None) => "exited without reporting a status".to_string(),
    }
}

/// Result type alias using AdminError
pub type Result<T> = std::result::Result<T, AdminError>;

impl AdminError {
    /// Create a file access error for `path`
    pub fn file(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        AdminError::FileAccess {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create an authentication error
    pub fn auth(reason: impl Into<String>, cause: impl Into<String>) -> Self {
        AdminError::Authentication {
            reason: reason.into(),
            cause: cause.into(),
        }
    }

    /// Create a connection error of the given kind
    pub fn connect(kind: ConnectErrorKind, message: impl Into<String>) -> Self {
        AdminError::Connect {
            kind,
            message: message.into(),
        }
    }

    /// Create an execution error of the given kind
    pub fn exec(kind: ExecErrorKind, message: impl Into<String>) -> Self {
        AdminError::Exec {
            kind,
            message: message.into(),
        }
    }

    /// Create an external process error
    pub fn external(program: impl Into<String>, message: impl Into<String>) -> Self {
        AdminError::ExternalProcess {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a transport error from anything displayable
    pub fn transport(err: impl fmt::Display) -> Self {
        AdminError::Transport(err.to_string())
    }

    /// Create an invalid params error from a string
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        AdminError::InvalidParams(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        AdminError::Config(msg.into())
    }

    /// Kind of a connection failure, if this is one
    pub fn connect_kind(&self) -> Option<ConnectErrorKind> {
        match self {
            AdminError::Connect { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Kind of an execution failure, if this is one
    pub fn exec_kind(&self) -> Option<ExecErrorKind> {
        match self {
            AdminError::Exec { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
