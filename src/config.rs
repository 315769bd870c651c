//! Configuration and CLI argument parsing for dbhost-admin

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::admin::RemoteAdmin;
use crate::error::{AdminError, Result};
use crate::mysql::MysqlUser;
use crate::ssh::config::CONNECT_TIMEOUT;
use crate::ssh::{ExitPolicy, HostKeyPolicy, OutputOrder, RunOptions, TransportTarget};

/// Default max characters for ad-hoc commands (None = unlimited)
pub const DEFAULT_MAX_CHARS: Option<usize> = Some(1000);

/// How the server's host key is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HostKeyMode {
    /// Accept any host key (not verified)
    AcceptAny,
    /// Require a matching known_hosts entry
    KnownHosts,
}

/// Order in which command output is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrderMode {
    /// All stdout lines, then all stderr lines
    StdoutFirst,
    /// Lines as they arrive
    Arrival,
}

/// dbhost-admin CLI Arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "dbhost-admin")]
#[command(version)]
#[command(about = "Administer a remote MySQL host over SSH")]
pub struct Args {
    /// SSH host to connect to
    #[arg(long, env = "DBHOST_ADMIN_HOST")]
    pub host: String,

    /// SSH port
    #[arg(long, default_value = "22", env = "DBHOST_ADMIN_PORT")]
    pub port: u16,

    /// SSH username
    #[arg(long, default_value = "ubuntu", env = "DBHOST_ADMIN_USER")]
    pub user: String,

    /// Path to SSH private key file
    #[arg(long, env = "DBHOST_ADMIN_KEY")]
    pub key: Option<PathBuf>,

    /// Passphrase of an encrypted private key
    #[arg(long, env = "DBHOST_ADMIN_KEY_PASSPHRASE")]
    pub key_passphrase: Option<String>,

    /// Password for `sudo` commands
    #[arg(long, env = "DBHOST_ADMIN_SUDO_PASSWORD")]
    pub sudo_password: Option<String>,

    /// Host key verification
    #[arg(long, value_enum, default_value = "accept-any", env = "DBHOST_ADMIN_HOST_KEY_POLICY")]
    pub host_key_policy: HostKeyMode,

    /// known_hosts file for `--host-key-policy known-hosts`
    /// (default: ~/.ssh/known_hosts)
    #[arg(long, env = "DBHOST_ADMIN_KNOWN_HOSTS")]
    pub known_hosts: Option<PathBuf>,

    /// TCP dial and SSH handshake timeout in seconds
    #[arg(long, default_value_t = CONNECT_TIMEOUT.as_secs(), env = "DBHOST_ADMIN_CONNECT_TIMEOUT")]
    pub connect_timeout: u64,

    /// Command execution timeout in milliseconds (no limit when unset)
    #[arg(long, env = "DBHOST_ADMIN_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Order in which command output is printed
    #[arg(long, value_enum, default_value = "stdout-first", env = "DBHOST_ADMIN_OUTPUT_ORDER")]
    pub output_order: OrderMode,

    /// Only log a non-zero remote exit instead of failing
    #[arg(long, default_value = "false", env = "DBHOST_ADMIN_LEGACY_EXIT_STATUS")]
    pub legacy_exit_status: bool,

    /// Print a JSON report instead of plain text
    #[arg(long, default_value = "false", env = "DBHOST_ADMIN_JSON")]
    pub json: bool,

    /// Maximum characters for command length.
    /// Use "none", "0", or negative value to disable limit.
    /// Default: 1000
    #[arg(long, allow_hyphen_values = true, env = "DBHOST_ADMIN_MAX_CHARS")]
    pub max_chars: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Database credentials shared by the account subcommands
#[derive(clap::Args, Debug, Clone)]
pub struct AccountArgs {
    /// MySQL user to create
    #[arg(long)]
    pub db_user: String,

    /// Password for the new MySQL user
    #[arg(long, env = "DBHOST_ADMIN_DB_PASSWORD")]
    pub db_password: String,

    /// Host pattern the user may connect from
    #[arg(long, default_value = "%")]
    pub db_host: String,

    /// Database the grants apply to
    #[arg(long)]
    pub database: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a command and stream its output
    Exec {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Run a command under sudo
    SudoExec {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Show the address mysqld listens on
    ShowBindAddress,
    /// Rewrite mysqld's bind-address and restart it
    SetBindAddress {
        /// Address currently configured
        #[arg(long, default_value = "127.0.0.1")]
        from: String,
        /// Address to listen on
        #[arg(long)]
        to: String,
    },
    /// Listen on every interface (127.0.0.1 -> 0.0.0.0)
    OpenBindAddress,
    /// Create a MySQL user with all privileges on a database
    CreateUser(AccountArgs),
    /// Create a MySQL user able to dump a database
    CreateBackupUser(AccountArgs),
    /// Dump a database to a timestamped file on the host
    Backup {
        #[arg(long)]
        db_user: String,
        #[arg(long, env = "DBHOST_ADMIN_DB_PASSWORD")]
        db_password: String,
        #[arg(long)]
        database: String,
    },
    /// Copy a local file or directory to the host with scp
    Upload { path: PathBuf },
    /// Dump a local database and copy the dump to the host
    DumpAndUpload {
        /// Local MySQL root password
        #[arg(long, env = "DBHOST_ADMIN_DB_PASSWORD")]
        db_password: String,
        #[arg(long)]
        database: String,
        /// Dump file (default: <database>.sql)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

impl Command {
    /// Whether the subcommand runs anything under sudo
    pub fn requires_sudo(&self) -> bool {
        matches!(
            self,
            Command::SudoExec { .. }
                | Command::ShowBindAddress
                | Command::SetBindAddress { .. }
                | Command::OpenBindAddress
                | Command::CreateUser(_)
                | Command::CreateBackupUser(_)
                | Command::Backup { .. }
        )
    }
}

impl AccountArgs {
    pub fn user(&self) -> MysqlUser {
        MysqlUser::new(&self.db_user, &self.db_password, &self.db_host)
    }
}

/// Parsed and validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Where and how to connect
    pub target: TransportTarget,

    /// Path to SSH private key
    pub key: PathBuf,

    /// Passphrase for the private key
    pub key_passphrase: Option<String>,

    /// Password for sudo commands
    pub sudo_password: Option<String>,

    /// Ordering, exit handling and deadline for ad-hoc commands
    pub run_options: RunOptions,

    /// Maximum command length (None = unlimited)
    pub max_chars: Option<usize>,

    /// Whether to print JSON reports
    pub json: bool,

    /// What to do
    pub command: Command,
}

impl Config {
    /// Create Config from CLI Args
    pub fn from_args(args: Args) -> Result<Self> {
        validate_args(&args)?;

        let max_chars = parse_max_chars(args.max_chars.as_deref());

        let policy = match args.host_key_policy {
            HostKeyMode::AcceptAny => HostKeyPolicy::AcceptAny,
            HostKeyMode::KnownHosts => HostKeyPolicy::KnownHosts {
                path: args.known_hosts,
            },
        };
        let target = TransportTarget::new(args.host)
            .with_port(args.port)
            .with_username(args.user)
            .with_connect_timeout(Duration::from_secs(args.connect_timeout))
            .with_host_key_policy(policy);

        let run_options = RunOptions {
            order: match args.output_order {
                OrderMode::StdoutFirst => OutputOrder::StdoutFirst,
                OrderMode::Arrival => OutputOrder::Arrival,
            },
            exit_policy: if args.legacy_exit_status {
                ExitPolicy::LogOnly
            } else {
                ExitPolicy::Strict
            },
            deadline: args.timeout.map(Duration::from_millis),
        };

        Ok(Config {
            target,
            // validate_args guarantees a key
            key: args.key.unwrap_or_default(),
            key_passphrase: sanitize_password(args.key_passphrase),
            sudo_password: sanitize_password(args.sudo_password),
            run_options,
            max_chars,
            json: args.json,
            command: args.command,
        })
    }

    /// Administration client for the configured host
    pub fn admin(&self) -> RemoteAdmin {
        RemoteAdmin::new(self.target.clone(), &self.key)
            .with_passphrase(self.key_passphrase.clone())
            .with_run_options(self.run_options.clone())
            .with_max_chars(self.max_chars)
    }

    /// The sudo password; only present when the subcommand needs it
    pub fn sudo_secret(&self) -> Result<&str> {
        self.sudo_password
            .as_deref()
            .ok_or_else(|| AdminError::config("Missing required --sudo-password"))
    }
}

/// Validate CLI arguments
fn validate_args(args: &Args) -> Result<()> {
    let mut errors = Vec::new();

    if args.host.trim().is_empty() {
        errors.push("Missing required --host".to_string());
    }

    if args.user.trim().is_empty() {
        errors.push("Missing required --user".to_string());
    }

    match args.key {
        None => errors.push("Missing required --key".to_string()),
        Some(ref key_path) if !key_path.exists() => {
            errors.push(format!("SSH key file not found: {}", key_path.display()));
        }
        Some(_) => {}
    }

    let has_sudo_password = args
        .sudo_password
        .as_deref()
        .is_some_and(|p| !p.is_empty());
    if args.command.requires_sudo() && !has_sudo_password {
        errors.push("This command requires --sudo-password".to_string());
    }

    if args.known_hosts.is_some() && args.host_key_policy != HostKeyMode::KnownHosts {
        errors.push("--known-hosts requires --host-key-policy known-hosts".to_string());
    }

    if args.connect_timeout == 0 {
        errors.push("--connect-timeout must be at least 1 second".to_string());
    }

    if !errors.is_empty() {
        return Err(AdminError::Config(format!(
            "Configuration error:\n{}",
            errors.join("\n")
        )));
    }

    Ok(())
}

/// Parse max_chars argument
///
/// - "none" (case-insensitive) → None (unlimited)
/// - "0" or negative → None (unlimited)
/// - positive integer → Some(value)
/// - None (not provided) → DEFAULT_MAX_CHARS
pub fn parse_max_chars(value: Option<&str>) -> Option<usize> {
    match value {
        None => DEFAULT_MAX_CHARS,
        Some(s) => {
            if s.eq_ignore_ascii_case("none") {
                return None;
            }

            match s.parse::<i64>() {
                Ok(n) if n <= 0 => None,
                Ok(n) => Some(n as usize),
                Err(_) => DEFAULT_MAX_CHARS,
            }
        }
    }
}

/// Sanitize password: return None if empty
fn sanitize_password(password: Option<String>) -> Option<String> {
    password.filter(|p| !p.is_empty())
}
