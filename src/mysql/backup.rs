//! Remote database dumps

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

use super::{validate_account_part, validate_database};
use crate::error::Result;
use crate::ssh::{escape_for_shell, run_elevated, ExecSession};

/// Timestamp layout of dump file names
const BACKUP_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Credentials and database for a `mysqldump` run
#[derive(Clone)]
pub struct DumpRequest {
    pub db_user: String,
    pub db_password: String,
    pub database: String,
}

impl std::fmt::Debug for DumpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpRequest")
            .field("db_user", &self.db_user)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Where a dump landed and what the command printed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    /// File name, relative to the remote account's working directory
    pub file: String,
    pub output: String,
}

/// Dump file name for a backup taken at `at`
pub fn backup_file_name(at: DateTime<Local>) -> String {
    at.format(BACKUP_NAME_FORMAT).to_string()
}

/// Dump `request.database` to a timestamped file on the remote host
pub async fn create_backup<S: ExecSession>(
    session: &S,
    secret: &str,
    request: &DumpRequest,
) -> Result<BackupReport> {
    let file = backup_file_name(Local::now());
    let command = backup_command(request, &file)?;

    let output = run_elevated(session, secret, &command).await?;
    info!("Backed up {} to {}", request.database, file);

    Ok(BackupReport { file, output })
}

pub(crate) fn backup_command(request: &DumpRequest, file: &str) -> Result<String> {
    validate_account_part("user", &request.db_user)?;
    validate_database(&request.database)?;

    Ok(format!(
        "mysqldump -u {} -p'{}' {} > {}",
        request.db_user,
        escape_for_shell(&request.db_password),
        request.database,
        file
    ))
}
