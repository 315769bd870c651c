//! Local helper processes: `scp` uploads and `mysqldump` exports
//!
//! These run on the operator's machine, not over the SSH session, and reuse
//! the same key and target the session would.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::{AdminError, Result};
use crate::ssh::{HostKeyPolicy, TransportTarget};

/// Copies local files to the target host's login directory
#[derive(Debug, Clone)]
pub struct Uploader {
    program: String,
    key_path: PathBuf,
    target: TransportTarget,
}

impl Uploader {
    pub fn new(key_path: impl Into<PathBuf>, target: TransportTarget) -> Self {
        Self {
            program: "scp".to_string(),
            key_path: key_path.into(),
            target,
        }
    }

    /// Use a different copy program (same argument conventions as `scp`)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Upload `local_path` (file or directory) to `<user>@<host>:`
    pub async fn upload(&self, local_path: &Path) -> Result<()> {
        tokio::fs::metadata(local_path)
            .await
            .map_err(|e| AdminError::file(local_path, e))?;

        let args = self.scp_args(local_path);
        debug!("Running {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AdminError::external(&self.program, format!("failed to spawn: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} exited with {}", self.program, output.status);
            return Err(AdminError::external(
                &self.program,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        info!(
            "Uploaded {} to {}",
            local_path.display(),
            self.destination()
        );
        Ok(())
    }

    pub(crate) fn scp_args(&self, local_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-r".to_string(),
            "-i".to_string(),
            self.key_path.display().to_string(),
        ];
        if self.target.port() != crate::ssh::config::DEFAULT_PORT {
            args.push("-P".to_string());
            args.push(self.target.port().to_string());
        }
        if *self.target.host_key_policy() == HostKeyPolicy::AcceptAny {
            args.push("-o".to_string());
            args.push("StrictHostKeyChecking=no".to_string());
        }
        args.push(local_path.display().to_string());
        args.push(self.destination());
        args
    }

    fn destination(&self) -> String {
        format!("{}@{}:", self.target.username(), self.target.host())
    }
}

/// Dump a database on this machine to `output` with `mysqldump -u root`
pub async fn dump_local_database(password: &str, database: &str, output: &Path) -> Result<()> {
    dump_with("mysqldump", password, database, output).await
}

pub(crate) async fn dump_with(
    program: &str,
    password: &str,
    database: &str,
    output: &Path,
) -> Result<()> {
    crate::mysql::validate_database(database)?;

    let file = tokio::fs::File::create(output)
        .await
        .map_err(|e| AdminError::file(output, e))?
        .into_std()
        .await;

    let result = run_dump(program, password, database, file).await;

    if result.is_err() {
        // A failed dump leaves an empty or truncated file behind
        if let Err(e) = tokio::fs::remove_file(output).await {
            debug!("Removing {} reported: {}", output.display(), e);
        }
        return result;
    }

    info!("Dumped local database {} to {}", database, output.display());
    Ok(())
}

async fn run_dump(
    program: &str,
    password: &str,
    database: &str,
    file: std::fs::File,
) -> Result<()> {
    let result = Command::new(program)
        .arg("-u")
        .arg("root")
        .arg(format!("-p{}", password))
        .arg(database)
        .stdin(Stdio::null())
        .stdout(Stdio::from(file))
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| AdminError::external(program, format!("failed to spawn: {}", e)))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        error!("{} exited with {}", program, result.status);
        return Err(AdminError::external(
            program,
            format!("{}: {}", result.status, stderr.trim()),
        ));
    }
    Ok(())
}
