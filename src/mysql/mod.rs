//! MySQL administration commands
//!
//! Each operation builds a shell command and runs it through
//! [`run_elevated`](crate::ssh::run_elevated) on a session the caller owns.
//! Values interpolated into commands are validated or escaped here.

pub mod backup;
pub mod bind;
pub mod users;

pub use backup::{backup_file_name, create_backup, BackupReport, DumpRequest};
pub use bind::{
    change_bind_address, open_bind_address, parse_bind_address, show_bind_address,
    BindAddressChange,
};
pub use users::{create_backup_user, create_user, MysqlUser};

use crate::error::{AdminError, Result};

/// Longest name MySQL accepts for users and databases
const MAX_NAME_LEN: usize = 64;

/// `mysql -u root -e "<sql>"` with the SQL escaped for double quotes
pub(crate) fn mysql_root_command(sql: &str) -> String {
    format!("mysql -u root -e \"{}\"", escape_double_quoted(sql))
}

/// Quote a value as a MySQL string literal
pub(crate) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Escape the characters a POSIX shell interprets inside double quotes
pub(crate) fn escape_double_quoted(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Validate a user name or host pattern (`%` wildcards allowed)
pub(crate) fn validate_account_part(what: &str, value: &str) -> Result<()> {
    validate_name(what, value, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '%')
    })
}

/// Validate a database name
pub(crate) fn validate_database(value: &str) -> Result<()> {
    validate_name("database", value, |c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_name(what: &str, value: &str, allowed: impl Fn(char) -> bool) -> Result<()> {
    if value.is_empty() {
        return Err(AdminError::invalid_params(format!("{} cannot be empty", what)));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(AdminError::invalid_params(format!(
            "{} is too long (max {} characters)",
            what, MAX_NAME_LEN
        )));
    }
    if let Some(bad) = value.chars().find(|c| !allowed(*c)) {
        return Err(AdminError::invalid_params(format!(
            "{} {:?} contains unsupported character {:?}",
            what, value, bad
        )));
    }
    Ok(())
}
