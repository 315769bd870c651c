//! Remote administration operations
//!
//! [`RemoteAdmin`] ties the pieces together: every operation loads the key,
//! opens its own session, does its work and closes the session again before
//! returning, whether it succeeded or not.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::mysql::{
    self, parse_bind_address, BackupReport, BindAddressChange, DumpRequest, MysqlUser,
};
use crate::ssh::{
    connect, load_identity, run_command, run_elevated, sanitize_command, CollectedOutput,
    ExecSession, ExitOutcome, OutputLine, OutputSink, RunOptions, Session, TransportTarget,
};
use crate::transfer::{dump_local_database, Uploader};

/// What an operation produced
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum OperationOutcome {
    Exec {
        #[serde(flatten)]
        exit: ExitOutcome,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        lines: Vec<OutputLine>,
    },
    SudoExec {
        output: String,
    },
    ShowBindAddress {
        bind_address: Option<String>,
        output: String,
    },
    SetBindAddress(BindAddressChange),
    CreateUser {
        user: String,
        host: String,
        database: String,
        output: String,
    },
    CreateBackupUser {
        user: String,
        host: String,
        database: String,
        output: String,
    },
    Backup(BackupReport),
    Upload {
        path: PathBuf,
    },
    DumpAndUpload {
        database: String,
        dump: PathBuf,
    },
}

/// Summary of one completed operation against one host
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub host: String,
    #[serde(flatten)]
    pub outcome: OperationOutcome,
}

impl fmt::Display for OperationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            OperationOutcome::Exec { exit, .. } => match (exit.exit_status, &exit.exit_signal) {
                (_, Some(signal)) => write!(f, "Command killed by signal {}", signal),
                (Some(status), None) => write!(f, "Command exited with status {}", status),
                (None, None) => write!(f, "Command exited without a status"),
            },
            OperationOutcome::SudoExec { output } => write!(f, "{}", output.trim_end()),
            OperationOutcome::ShowBindAddress {
                bind_address,
                output,
            } => match bind_address {
                Some(address) => write!(f, "bind_address on {}: {}", self.host, address),
                None => write!(f, "{}", output.trim_end()),
            },
            OperationOutcome::SetBindAddress(_) => {
                write!(f, "bind-address updated and mysql restarted on {}", self.host)
            }
            OperationOutcome::CreateUser {
                user,
                host,
                database,
                ..
            } => write!(f, "Created user '{}'@'{}' on {}", user, host, database),
            OperationOutcome::CreateBackupUser {
                user,
                host,
                database,
                ..
            } => write!(f, "Created backup user '{}'@'{}' for {}", user, host, database),
            OperationOutcome::Backup(report) => {
                write!(f, "Backup written to {} on {}", report.file, self.host)
            }
            OperationOutcome::Upload { path } => {
                write!(f, "Uploaded {} to {}", path.display(), self.host)
            }
            OperationOutcome::DumpAndUpload { database, dump } => write!(
                f,
                "Dumped {} to {} and uploaded it to {}",
                database,
                dump.display(),
                self.host
            ),
        }
    }
}

/// Administration client for one database host
#[derive(Clone)]
pub struct RemoteAdmin {
    target: TransportTarget,
    key_path: PathBuf,
    passphrase: Option<String>,
    run_options: RunOptions,
    max_chars: Option<usize>,
}

impl fmt::Debug for RemoteAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAdmin")
            .field("target", &self.target)
            .field("key_path", &self.key_path)
            .field("run_options", &self.run_options)
            .field("max_chars", &self.max_chars)
            .finish_non_exhaustive()
    }
}

impl RemoteAdmin {
    pub fn new(target: TransportTarget, key_path: impl Into<PathBuf>) -> Self {
        Self {
            target,
            key_path: key_path.into(),
            passphrase: None,
            run_options: RunOptions::default(),
            max_chars: None,
        }
    }

    /// Passphrase of an encrypted private key
    pub fn with_passphrase(mut self, passphrase: Option<String>) -> Self {
        self.passphrase = passphrase.filter(|p| !p.is_empty());
        self
    }

    pub fn with_run_options(mut self, options: RunOptions) -> Self {
        self.run_options = options;
        self
    }

    /// Reject ad-hoc commands longer than `max_chars` characters
    pub fn with_max_chars(mut self, max_chars: Option<usize>) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn target(&self) -> &TransportTarget {
        &self.target
    }

    /// Load the key and open a fresh authenticated session
    pub async fn open_session(&self) -> Result<Session> {
        let identity = load_identity(&self.key_path, self.passphrase.as_deref()).await?;
        connect(&self.target, &identity).await
    }

    /// Open a session, run `operation` on it, close it
    async fn with_session<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<Session>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = Arc::new(self.open_session().await?);
        let result = operation(Arc::clone(&session)).await;
        session.close().await;
        result
    }

    fn report(&self, outcome: OperationOutcome) -> OperationReport {
        OperationReport {
            host: self.target.host().to_string(),
            outcome,
        }
    }

    /// Run an ad-hoc command, streaming its output to `sink`
    pub async fn exec(&self, command: &str, sink: &mut dyn OutputSink) -> Result<OperationReport> {
        let command = sanitize_command(command, self.max_chars)?;
        let session = self.open_session().await?;
        let exit = run_command(session, &command, &self.run_options, sink).await?;
        Ok(self.report(OperationOutcome::Exec {
            exit,
            lines: Vec::new(),
        }))
    }

    /// Run an ad-hoc command and keep its output lines in the report
    pub async fn exec_collected(&self, command: &str) -> Result<OperationReport> {
        let mut collected = CollectedOutput::new();
        let mut report = self.exec(command, &mut collected).await?;
        if let OperationOutcome::Exec { lines, .. } = &mut report.outcome {
            *lines = collected.lines;
        }
        Ok(report)
    }

    /// Run an ad-hoc command under sudo
    pub async fn sudo_exec(&self, secret: &str, command: &str) -> Result<OperationReport> {
        let command = sanitize_command(command, self.max_chars)?;
        let output = self
            .with_session(|session| async move { run_elevated(&session, secret, &command).await })
            .await?;
        Ok(self.report(OperationOutcome::SudoExec { output }))
    }

    pub async fn show_bind_address(&self, secret: &str) -> Result<OperationReport> {
        let output = self
            .with_session(|session| async move {
                mysql::show_bind_address(&session, secret).await
            })
            .await?;
        Ok(self.report(OperationOutcome::ShowBindAddress {
            bind_address: parse_bind_address(&output),
            output,
        }))
    }

    pub async fn set_bind_address(
        &self,
        secret: &str,
        current: &str,
        new: &str,
    ) -> Result<OperationReport> {
        let change = self
            .with_session(|session| async move {
                mysql::change_bind_address(&session, secret, current, new).await
            })
            .await?;
        Ok(self.report(OperationOutcome::SetBindAddress(change)))
    }

    pub async fn open_bind_address(&self, secret: &str) -> Result<OperationReport> {
        let change = self
            .with_session(|session| async move {
                mysql::open_bind_address(&session, secret).await
            })
            .await?;
        Ok(self.report(OperationOutcome::SetBindAddress(change)))
    }

    pub async fn create_user(
        &self,
        secret: &str,
        user: &MysqlUser,
        database: &str,
    ) -> Result<OperationReport> {
        let output = self
            .with_session(|session| async move {
                mysql::create_user(&session, secret, user, database).await
            })
            .await?;
        Ok(self.report(OperationOutcome::CreateUser {
            user: user.name.clone(),
            host: user.host.clone(),
            database: database.to_string(),
            output,
        }))
    }

    pub async fn create_backup_user(
        &self,
        secret: &str,
        user: &MysqlUser,
        database: &str,
    ) -> Result<OperationReport> {
        let output = self
            .with_session(|session| async move {
                mysql::create_backup_user(&session, secret, user, database).await
            })
            .await?;
        Ok(self.report(OperationOutcome::CreateBackupUser {
            user: user.name.clone(),
            host: user.host.clone(),
            database: database.to_string(),
            output,
        }))
    }

    pub async fn backup(&self, secret: &str, request: &DumpRequest) -> Result<OperationReport> {
        let report = self
            .with_session(|session| async move {
                mysql::create_backup(&session, secret, request).await
            })
            .await?;
        Ok(self.report(OperationOutcome::Backup(report)))
    }

    /// Copy a local file or directory to the host with `scp`
    pub async fn upload(&self, path: &Path) -> Result<OperationReport> {
        self.uploader().upload(path).await?;
        Ok(self.report(OperationOutcome::Upload {
            path: path.to_path_buf(),
        }))
    }

    /// Dump a database on this machine and upload the dump
    pub async fn dump_and_upload(
        &self,
        db_password: &str,
        database: &str,
        dump: &Path,
    ) -> Result<OperationReport> {
        dump_local_database(db_password, database, dump).await?;
        self.uploader().upload(dump).await?;
        info!("Shipped local dump of {} to {}", database, self.target.host());
        Ok(self.report(OperationOutcome::DumpAndUpload {
            database: database.to_string(),
            dump: dump.to_path_buf(),
        }))
    }

    fn uploader(&self) -> Uploader {
        Uploader::new(&self.key_path, self.target.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AdminError, ConnectErrorKind};
    use crate::ssh::{PrintSink, StreamKind};

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    /// A local port with nothing listening on it
    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_dialing() {
        let admin = RemoteAdmin::new(TransportTarget::new("127.0.0.1"), "/no/such/key");

        let err = admin.show_bind_address("pw").await.unwrap_err();
        assert!(matches!(err, AdminError::FileAccess { .. }));
    }

    #[tokio::test]
    async fn test_refused_connection_is_dial_failure() {
        let target = TransportTarget::new("127.0.0.1").with_port(closed_port().await);
        let admin = RemoteAdmin::new(target, fixture("id_ed25519_plain"));

        let err = admin.exec("uptime", &mut PrintSink).await.unwrap_err();
        assert_eq!(err.connect_kind(), Some(ConnectErrorKind::DialFailed));
    }

    #[tokio::test]
    async fn test_command_checked_before_connecting() {
        let admin = RemoteAdmin::new(TransportTarget::new("127.0.0.1"), "/no/such/key")
            .with_max_chars(Some(5));

        let err = admin.exec("   ", &mut PrintSink).await.unwrap_err();
        assert!(matches!(err, AdminError::InvalidParams(_)));

        let err = admin.sudo_exec("pw", "uptime -p").await.unwrap_err();
        assert!(matches!(err, AdminError::InvalidParams(_)));
    }

    #[test]
    fn test_debug_hides_passphrase() {
        let admin = RemoteAdmin::new(TransportTarget::new("h"), "k")
            .with_passphrase(Some("correct horse".to_string()));
        assert!(!format!("{:?}", admin).contains("correct horse"));
    }

    #[test]
    fn test_report_json() {
        let report = OperationReport {
            host: "db1".to_string(),
            outcome: OperationOutcome::Exec {
                exit: ExitOutcome {
                    exit_status: Some(0),
                    exit_signal: None,
                    stdout_lines: 1,
                    stderr_lines: 0,
                },
                lines: vec![OutputLine {
                    stream: StreamKind::Stdout,
                    text: "hello".to_string(),
                }],
            },
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["host"], "db1");
        assert_eq!(json["operation"], "exec");
        assert_eq!(json["exit_status"], 0);
        assert_eq!(json["lines"][0]["stream"], "stdout");
        assert_eq!(json["lines"][0]["text"], "hello");
    }

    #[test]
    fn test_report_display() {
        let report = OperationReport {
            host: "db1".to_string(),
            outcome: OperationOutcome::ShowBindAddress {
                bind_address: Some("127.0.0.1".to_string()),
                output: String::new(),
            },
        };
        assert_eq!(report.to_string(), "bind_address on db1: 127.0.0.1");

        let report = OperationReport {
            host: "db1".to_string(),
            outcome: OperationOutcome::SetBindAddress(BindAddressChange::default()),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["operation"], "set-bind-address");
        assert_eq!(json["edit_output"], "");
    }
}
