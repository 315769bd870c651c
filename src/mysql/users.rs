//! Account provisioning

use tracing::info;

use super::{mysql_root_command, sql_literal, validate_account_part, validate_database};
use crate::error::Result;
use crate::ssh::{run_elevated, ExecSession};

/// A MySQL account as `'name'@'host'` plus its password
#[derive(Clone)]
pub struct MysqlUser {
    pub name: String,
    pub password: String,
    /// Host pattern the account may connect from, e.g. `%` or `10.0.0.%`
    pub host: String,
}

impl MysqlUser {
    pub fn new(
        name: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
            host: host.into(),
        }
    }

    fn account(&self) -> String {
        format!("{}@{}", sql_literal(&self.name), sql_literal(&self.host))
    }

    fn validate(&self) -> Result<()> {
        validate_account_part("user", &self.name)?;
        validate_account_part("host", &self.host)
    }
}

impl std::fmt::Debug for MysqlUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqlUser")
            .field("name", &self.name)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Create `user` with every privilege on `database`
pub async fn create_user<S: ExecSession>(
    session: &S,
    secret: &str,
    user: &MysqlUser,
    database: &str,
) -> Result<String> {
    let command = create_user_command(user, database)?;
    let output = run_elevated(session, secret, &command).await?;
    info!("Created MySQL user {}@{} on {}", user.name, user.host, database);
    Ok(output)
}

/// Create `user` (if missing) with the privileges `mysqldump` needs on `database`
pub async fn create_backup_user<S: ExecSession>(
    session: &S,
    secret: &str,
    user: &MysqlUser,
    database: &str,
) -> Result<String> {
    let command = create_backup_user_command(user, database)?;
    let output = run_elevated(session, secret, &command).await?;
    info!(
        "Created MySQL backup user {}@{} for {}",
        user.name, user.host, database
    );
    Ok(output)
}

pub(crate) fn create_user_command(user: &MysqlUser, database: &str) -> Result<String> {
    user.validate()?;
    validate_database(database)?;

    let account = user.account();
    Ok(mysql_root_command(&format!(
        "CREATE USER {account} IDENTIFIED BY {password}; \
         GRANT ALL PRIVILEGES ON {database}.* TO {account}; \
         FLUSH PRIVILEGES;",
        account = account,
        password = sql_literal(&user.password),
        database = database,
    )))
}

pub(crate) fn create_backup_user_command(user: &MysqlUser, database: &str) -> Result<String> {
    user.validate()?;
    validate_database(database)?;

    let account = user.account();
    Ok(mysql_root_command(&format!(
        "CREATE USER IF NOT EXISTS {account} IDENTIFIED BY {password}; \
         GRANT SELECT ON {database}.* TO {account}; \
         GRANT PROCESS, LOCK TABLES, SHOW VIEW ON *.* TO {account}; \
         FLUSH PRIVILEGES;",
        account = account,
        password = sql_literal(&user.password),
        database = database,
    )))
}
