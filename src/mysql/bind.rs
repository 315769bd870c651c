//! Bind address inspection and rewriting
//!
//! The address mysqld listens on lives in its config file; changing it is a
//! `sed` edit, a `grep` confirming the new line is there, and a service
//! restart.

use std::net::IpAddr;

use serde::Serialize;
use tracing::{error, info};

use super::mysql_root_command;
use crate::error::{AdminError, Result};
use crate::ssh::{run_elevated, ExecSession};

/// mysqld configuration file on Ubuntu's MySQL packages
pub const MYSQLD_CONFIG_PATH: &str = "/etc/mysql/mysql.conf.d/mysqld.cnf";

/// Applies a changed bind address
pub const RESTART_COMMAND: &str = "systemctl restart mysql";

/// Loopback only, the packaged default
pub const LOOPBACK_ADDRESS: &str = "127.0.0.1";

/// Every interface
pub const ANY_ADDRESS: &str = "0.0.0.0";

/// Outputs of the two steps of a bind address change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BindAddressChange {
    pub edit_output: String,
    pub restart_output: String,
}

/// Ask the running server for its `bind_address` variable
///
/// Returns the raw `mysql` output; see [`parse_bind_address`].
pub async fn show_bind_address<S: ExecSession>(session: &S, secret: &str) -> Result<String> {
    run_elevated(session, secret, &show_bind_address_command()).await
}

/// Rewrite `bind-address = <current>` to `<new>` and restart mysqld
///
/// The edit is checked before the restart: if no `bind-address = <new>`
/// line exists afterwards (e.g. `<current>` was not configured) the change
/// fails and mysqld is left running untouched.
pub async fn change_bind_address<S: ExecSession>(
    session: &S,
    secret: &str,
    current: &str,
    new: &str,
) -> Result<BindAddressChange> {
    let edit = bind_address_edit_command(current, new)?;
    let check = bind_address_check_command(new)?;

    let edit_output = run_elevated(session, secret, &edit).await?;

    if let Err(e) = run_elevated(session, secret, &check).await {
        error!(
            "No bind-address = {} line in {} after edit, not restarting",
            new, MYSQLD_CONFIG_PATH
        );
        return Err(AdminError::ElevatedCommandFailed {
            stderr: format!(
                "no `bind-address = {}` line in {} after replacing {}",
                new, MYSQLD_CONFIG_PATH, current
            ),
            source: Box::new(e),
        });
    }

    let restart_output = run_elevated(session, secret, RESTART_COMMAND).await?;

    info!("bind-address changed from {} to {}", current, new);
    Ok(BindAddressChange {
        edit_output,
        restart_output,
    })
}

/// Open mysqld to every interface (`127.0.0.1` -> `0.0.0.0`)
pub async fn open_bind_address<S: ExecSession>(
    session: &S,
    secret: &str,
) -> Result<BindAddressChange> {
    change_bind_address(session, secret, LOOPBACK_ADDRESS, ANY_ADDRESS).await
}

pub(crate) fn show_bind_address_command() -> String {
    mysql_root_command("SHOW VARIABLES LIKE 'bind_address';")
}

/// What may follow the address on a config line: whitespace, a comment,
/// or nothing. Captured so the replacement keeps it.
const VALUE_END: &str = "\\(\\s\\|#\\|$\\)";

/// `^ bind-address = <address>` up to a value boundary, as a GNU basic regex
fn bind_address_line_pattern(address: &str) -> Result<String> {
    validate_bind_address(address)?;
    Ok(format!(
        "^\\s*bind-address\\s*=\\s*{}{}",
        address.replace('.', "\\."),
        VALUE_END
    ))
}

pub(crate) fn bind_address_sed_script(current: &str, new: &str) -> Result<String> {
    let pattern = bind_address_line_pattern(current)?;
    validate_bind_address(new)?;
    Ok(format!("s/{}/bind-address = {}\\1/", pattern, new))
}

pub(crate) fn bind_address_edit_command(current: &str, new: &str) -> Result<String> {
    Ok(format!(
        "sed -i '{}' {}",
        bind_address_sed_script(current, new)?,
        MYSQLD_CONFIG_PATH
    ))
}

pub(crate) fn bind_address_check_command(address: &str) -> Result<String> {
    Ok(format!(
        "grep -q '{}' {}",
        bind_address_line_pattern(address)?,
        MYSQLD_CONFIG_PATH
    ))
}

fn validate_bind_address(address: &str) -> Result<()> {
    if address == "localhost" || address.parse::<IpAddr>().is_ok() {
        Ok(())
    } else {
        Err(AdminError::invalid_params(format!(
            "{:?} is not an IP address",
            address
        )))
    }
}

/// Extract the value from `SHOW VARIABLES LIKE 'bind_address'` output
///
/// Handles both batch (tab separated) and table formatted output.
pub fn parse_bind_address(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut fields = line
            .split(|c: char| c == '|' || c.is_whitespace())
            .filter(|f| !f.is_empty());
        match fields.next() {
            Some("bind_address") => fields.next().map(str::to_string),
            _ => None,
        }
    })
}
