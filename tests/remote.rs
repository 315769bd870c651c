//! End-to-end runs against an OpenSSH server container
//!
//! Needs Docker; run with `cargo test -- --ignored`.

use std::path::PathBuf;
use std::sync::Arc;

use dbhost_admin::error::AdminError;
use dbhost_admin::ssh::{
    connect, load_identity, run_command, run_elevated, CollectedOutput, ExecSession, RunOptions,
    Session, StreamKind, TransportTarget,
};
use dbhost_admin::RemoteAdmin;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

const SSH_PORT: u16 = 2222;
const SUDO_PASSWORD: &str = "container-sudo";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

async fn start_server() -> (ContainerAsync<GenericImage>, TransportTarget) {
    let public_key = std::fs::read_to_string(fixture("id_ed25519_plain.pub")).unwrap();

    let container = GenericImage::new("lscr.io/linuxserver/openssh-server", "latest")
        .with_exposed_port(SSH_PORT.tcp())
        .with_wait_for(WaitFor::message_on_stdout("[ls.io-init] done."))
        .with_env_var("USER_NAME", "ubuntu")
        .with_env_var("PUBLIC_KEY", public_key.trim())
        .with_env_var("SUDO_ACCESS", "true")
        .with_env_var("USER_PASSWORD", SUDO_PASSWORD)
        .start()
        .await
        .unwrap();

    let host = container.get_host().await.unwrap().to_string();
    let port = container.get_host_port_ipv4(SSH_PORT.tcp()).await.unwrap();
    (container, TransportTarget::new(host).with_port(port))
}

async fn open(target: &TransportTarget) -> Session {
    let identity = load_identity(&fixture("id_ed25519_plain"), None).await.unwrap();
    connect(target, &identity).await.unwrap()
}

#[tokio::test]
#[ignore]
async fn test_echo_hello() {
    let (_container, target) = start_server().await;
    let session = Arc::new(open(&target).await);

    let mut output = CollectedOutput::new();
    let outcome = run_command(
        Arc::clone(&session),
        "echo hello; echo oops >&2",
        &RunOptions::default(),
        &mut output,
    )
    .await
    .unwrap();

    assert!(outcome.success());
    assert_eq!(output.stream(StreamKind::Stdout), vec!["hello"]);
    assert_eq!(output.stream(StreamKind::Stderr), vec!["oops"]);
    assert!(session.is_closed());
}

#[tokio::test]
#[ignore]
async fn test_false_fails() {
    let (_container, target) = start_server().await;
    let session = open(&target).await;

    let err = run_command(session, "false", &RunOptions::default(), &mut CollectedOutput::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AdminError::RemoteNonZeroExit {
            status: Some(1),
            ..
        }
    ));
}

#[tokio::test]
#[ignore]
async fn test_large_output_drains() {
    let (_container, target) = start_server().await;
    let session = open(&target).await;

    let mut output = CollectedOutput::new();
    let outcome = run_command(
        session,
        "seq 1 20000; seq 1 20000 >&2",
        &RunOptions::default(),
        &mut output,
    )
    .await
    .unwrap();

    assert_eq!(outcome.stdout_lines, 20000);
    assert_eq!(outcome.stderr_lines, 20000);
    assert_eq!(output.stream(StreamKind::Stdout).last(), Some(&"20000"));
}

#[tokio::test]
#[ignore]
async fn test_sudo_runs_as_root() {
    let (_container, target) = start_server().await;
    let session = open(&target).await;

    let output = run_elevated(&session, SUDO_PASSWORD, "id -u").await;
    session.close().await;

    assert_eq!(output.unwrap().trim(), "0");
}

#[tokio::test]
#[ignore]
async fn test_sudo_wrong_password() {
    let (_container, target) = start_server().await;
    let session = open(&target).await;

    let err = run_elevated(&session, "not-the-password", "id -u").await.unwrap_err();
    session.close().await;

    match err {
        AdminError::ElevatedCommandFailed { stderr, .. } => {
            assert!(stderr.contains("incorrect password") || stderr.contains("Sorry"));
        }
        other => panic!("expected ElevatedCommandFailed, got {:?}", other),
    }
}

#[tokio::test]
#[ignore]
async fn test_admin_sudo_exec() {
    let (_container, target) = start_server().await;
    let admin = RemoteAdmin::new(target, fixture("id_ed25519_plain"));

    let report = admin.sudo_exec(SUDO_PASSWORD, "whoami").await.unwrap();
    assert_eq!(report.to_string(), "root");
}
