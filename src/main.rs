//! dbhost-admin - Entry point
//!
//! Parses CLI arguments, validates configuration, runs one administration
//! operation against the configured host and prints its report.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dbhost_admin::admin::{OperationReport, RemoteAdmin};
use dbhost_admin::config::{Args, Command, Config};
use dbhost_admin::error::{AdminError, Result};
use dbhost_admin::mysql::DumpRequest;
use dbhost_admin::ssh::PrintSink;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output and reports
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_args(args)?;

    info!("dbhost-admin v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Target {}@{}, max chars: {}",
        config.target.username(),
        config.target.address(),
        config
            .max_chars
            .map_or("unlimited".to_string(), |n| n.to_string())
    );

    let report = run(&config).await.inspect_err(|e| error!("{}", e))?;

    if config.json {
        let json = serde_json::to_string_pretty(&report).map_err(|e| AdminError::Io(e.into()))?;
        println!("{}", json);
    } else {
        println!("{}", report);
    }

    Ok(())
}

async fn run(config: &Config) -> Result<OperationReport> {
    let admin: RemoteAdmin = config.admin();

    match &config.command {
        Command::Exec { command } => {
            let command = command.join(" ");
            if config.json {
                admin.exec_collected(&command).await
            } else {
                admin.exec(&command, &mut PrintSink).await
            }
        }
        Command::SudoExec { command } => {
            admin
                .sudo_exec(config.sudo_secret()?, &command.join(" "))
                .await
        }
        Command::ShowBindAddress => admin.show_bind_address(config.sudo_secret()?).await,
        Command::SetBindAddress { from, to } => {
            admin
                .set_bind_address(config.sudo_secret()?, from, to)
                .await
        }
        Command::OpenBindAddress => admin.open_bind_address(config.sudo_secret()?).await,
        Command::CreateUser(account) => {
            admin
                .create_user(config.sudo_secret()?, &account.user(), &account.database)
                .await
        }
        Command::CreateBackupUser(account) => {
            admin
                .create_backup_user(config.sudo_secret()?, &account.user(), &account.database)
                .await
        }
        Command::Backup {
            db_user,
            db_password,
            database,
        } => {
            let request = DumpRequest {
                db_user: db_user.clone(),
                db_password: db_password.clone(),
                database: database.clone(),
            };
            admin.backup(config.sudo_secret()?, &request).await
        }
        Command::Upload { path } => admin.upload(path).await,
        Command::DumpAndUpload {
            db_password,
            database,
            output,
        } => {
            let dump = output
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("{}.sql", database)));
            admin.dump_and_upload(db_password, database, &dump).await
        }
    }
}
