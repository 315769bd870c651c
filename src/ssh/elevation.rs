//! Privileged command execution
//!
//! Runs a command under `sudo -S`, feeding the sudo password on the
//! channel's standard input. Unlike [`run_command`](super::command::run_command)
//! the output is buffered in full and returned, not streamed.

use tracing::{debug, error};

use super::channel::{ChannelEvent, ExecChannel, ExecSession};
use crate::error::{AdminError, ExecErrorKind, Result};

/// Wraps a command for execution with sudo privileges.
///
/// `-S` makes sudo read the password from standard input and `-p ''`
/// silences its prompt so stderr only carries real diagnostics.
///
/// # Examples
///
/// ```
/// use dbhost_admin::ssh::elevation::wrap_sudo_command;
///
/// let cmd = wrap_sudo_command("systemctl restart mysql");
/// assert_eq!(cmd, "sudo -S -p '' systemctl restart mysql");
/// ```
pub fn wrap_sudo_command(command: &str) -> String {
    format!("sudo -S -p '' {}", command)
}

/// Escapes a string for safe use in single-quoted shell contexts.
///
/// Replaces single quotes with the pattern `'"'"'` which:
/// 1. Ends the current single-quoted string
/// 2. Adds a single quote inside double quotes
/// 3. Starts a new single-quoted string
///
/// # Examples
///
/// ```
/// use dbhost_admin::ssh::elevation::escape_for_shell;
///
/// assert_eq!(escape_for_shell("hello"), "hello");
/// assert_eq!(escape_for_shell("it's"), "it'\"'\"'s");
/// ```
pub fn escape_for_shell(s: &str) -> String {
    s.replace('\'', "'\"'\"'")
}

/// Fully buffered output of one command
#[derive(Debug, Default)]
struct Captured {
    stdout: String,
    stderr: String,
    exit_status: Option<u32>,
    exit_signal: Option<String>,
}

/// Run `command` under sudo on a fresh channel of `session`
///
/// The session stays open; the channel is closed on every path.
///
/// # Returns
/// * `Ok(String)` - Everything the command wrote to stdout
/// * `Err(AdminError::Exec { kind: ChannelOpenFailed, .. })` - No channel
/// * `Err(AdminError::ElevatedCommandFailed { stderr, .. })` - Anything
///   later failed, including a non-zero exit; `stderr` holds what the
///   command wrote there
pub async fn run_elevated<S: ExecSession>(
    session: &S,
    secret: &str,
    command: &str,
) -> Result<String> {
    let mut channel = session
        .open_channel()
        .await
        .inspect_err(|e| error!("Failed to open channel for sudo command: {}", e))?;

    let result = elevate_on_channel(&mut channel, secret, command).await;

    if let Err(e) = channel.close().await {
        debug!("Closing sudo channel reported: {}", e);
    }

    result
}

async fn elevate_on_channel<C: ExecChannel>(
    channel: &mut C,
    secret: &str,
    command: &str,
) -> Result<String> {
    let wrapped = wrap_sudo_command(command);
    // Arguments may carry database passwords; log the program only
    let program = command.split_whitespace().next().unwrap_or_default();
    debug!("Running sudo command: {} ({} bytes)", program, command.len());

    channel.exec(&wrapped).await.map_err(|e| {
        failed(
            String::new(),
            AdminError::exec(
                ExecErrorKind::StartFailed,
                format!("Failed to exec sudo command: {}", e),
            ),
        )
    })?;

    // Queued before any output is read; sudo consumes it when it prompts
    let mut input = secret.as_bytes().to_vec();
    input.push(b'\n');
    let prefilled = match channel.send_input(&input).await {
        Ok(()) => channel.close_input().await,
        Err(e) => Err(e),
    };
    if let Err(e) = prefilled {
        return Err(failed(
            String::new(),
            AdminError::exec(
                ExecErrorKind::PipeSetupFailed,
                format!("Failed to send sudo password: {}", e),
            ),
        ));
    }

    let captured = collect_output(channel).await;
    debug!(
        "sudo command completed: exit_status={:?}, stdout_len={}, stderr_len={}",
        captured.exit_status,
        captured.stdout.len(),
        captured.stderr.len()
    );

    match (captured.exit_status, captured.exit_signal) {
        (Some(0), None) => Ok(captured.stdout),
        (status, signal) => {
            error!(
                "sudo command failed: status={:?}, signal={:?}",
                status, signal
            );
            Err(failed(
                captured.stderr,
                AdminError::RemoteNonZeroExit { status, signal },
            ))
        }
    }
}

fn failed(stderr: String, source: AdminError) -> AdminError {
    AdminError::ElevatedCommandFailed {
        stderr,
        source: Box::new(source),
    }
}

/// Collect output from a channel until it closes
async fn collect_output<C: ExecChannel>(channel: &mut C) -> Captured {
    let mut output = Captured::default();
    let mut got_eof = false;

    while let Some(event) = channel.next_event().await {
        match event {
            ChannelEvent::Stdout(data) => {
                output.stdout.push_str(&String::from_utf8_lossy(&data));
            }
            ChannelEvent::Stderr(data) => {
                output.stderr.push_str(&String::from_utf8_lossy(&data));
            }
            ChannelEvent::ExitStatus(status) => {
                output.exit_status = Some(status);
                if got_eof {
                    break;
                }
            }
            ChannelEvent::ExitSignal(signal) => {
                output.exit_signal = Some(signal);
            }
            ChannelEvent::Eof => {
                got_eof = true;
                if output.exit_status.is_some() {
                    break;
                }
            }
            ChannelEvent::Close => break,
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::testing::{FakeSession, Recorded, Step};

    #[test]
    fn test_wrap_sudo_command() {
        assert_eq!(
            wrap_sudo_command("apt update"),
            "sudo -S -p '' apt update"
        );
    }

    #[test]
    fn test_wrap_sudo_command_keeps_quotes() {
        assert_eq!(
            wrap_sudo_command("mysql -u root -e \"SELECT 'x';\""),
            "sudo -S -p '' mysql -u root -e \"SELECT 'x';\""
        );
    }

    #[test]
    fn test_escape_for_shell_no_quotes() {
        assert_eq!(escape_for_shell("hello world"), "hello world");
    }

    #[test]
    fn test_escape_for_shell_multiple_quotes() {
        assert_eq!(
            escape_for_shell("'a' and 'b'"),
            "'\"'\"'a'\"'\"' and '\"'\"'b'\"'\"'"
        );
    }

    #[tokio::test]
    async fn test_secret_written_before_output_is_read() {
        let session = FakeSession::exiting(0, vec![Step::out("root\n")]);

        let output = run_elevated(&session, "hunter2", "whoami").await.unwrap();

        assert_eq!(output, "root\n");
        assert_eq!(
            session.recorded(),
            vec![
                Recorded::Exec("sudo -S -p '' whoami".to_string()),
                Recorded::Input(b"hunter2\n".to_vec()),
                Recorded::InputClosed,
                Recorded::ChannelClosed,
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_returns_stderr() {
        let session = FakeSession::exiting(
            1,
            vec![Step::err("sudo: 1 incorrect password attempt\n")],
        );

        let err = run_elevated(&session, "wrong", "whoami").await.unwrap_err();

        match err {
            AdminError::ElevatedCommandFailed { stderr, source } => {
                assert_eq!(stderr, "sudo: 1 incorrect password attempt\n");
                assert!(matches!(
                    *source,
                    AdminError::RemoteNonZeroExit { status: Some(1), .. }
                ));
            }
            other => panic!("expected ElevatedCommandFailed, got {:?}", other),
        }
        assert_eq!(session.recorded().last(), Some(&Recorded::ChannelClosed));
    }

    #[tokio::test]
    async fn test_success_ignores_stderr_noise() {
        let session = FakeSession::exiting(
            0,
            vec![Step::err("warning: deprecated\n"), Step::out("done\n")],
        );

        let output = run_elevated(&session, "pw", "do-thing").await.unwrap();
        assert_eq!(output, "done\n");
    }

    #[tokio::test]
    async fn test_start_failure_is_wrapped() {
        let session = FakeSession::exiting(0, vec![]).failing_exec();

        let err = run_elevated(&session, "pw", "whoami").await.unwrap_err();

        match err {
            AdminError::ElevatedCommandFailed { stderr, source } => {
                assert!(stderr.is_empty());
                assert_eq!(source.exec_kind(), Some(ExecErrorKind::StartFailed));
            }
            other => panic!("expected ElevatedCommandFailed, got {:?}", other),
        }
        assert_eq!(session.recorded(), vec![Recorded::ChannelClosed]);
    }

    #[tokio::test]
    async fn test_open_failure_is_not_wrapped() {
        let session = FakeSession::exiting(0, vec![]).failing_open();

        let err = run_elevated(&session, "pw", "whoami").await.unwrap_err();
        assert_eq!(err.exec_kind(), Some(ExecErrorKind::ChannelOpenFailed));
    }

    #[tokio::test]
    async fn test_session_left_open() {
        let session = FakeSession::exiting(0, vec![]);

        run_elevated(&session, "pw", "true").await.unwrap();
        run_elevated(&session, "pw", "true").await.unwrap();

        assert_eq!(session.channels_opened(), 2);
        assert_eq!(session.close_count(), 0);
    }
}
