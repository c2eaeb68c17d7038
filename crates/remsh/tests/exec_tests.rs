//! Integration tests for command execution through [`Client`]

mod common;

use anyhow::Result;
use common::{credentials, init_tracing};
use remsh::ssh::mock::{MockFailure, MockTransport, RemoteProcess};
use remsh::ssh::{AuthMode, ExitStatus, TransportError};
use remsh::{Client, Error, Stdio};
use tokio::io::AsyncReadExt;

fn client(transport: MockTransport) -> Client<MockTransport> {
    Client::new(transport).with_auth_mode(AuthMode::Password)
}

/// Numbers every input line, then exits with `code`
fn numbering(code: u32) -> MockTransport {
    MockTransport::new(move |mut process: RemoteProcess| async move {
        let mut n = 0;
        while let Some(line) = process.read_line().await {
            n += 1;
            process.stdout(format!("{} {}", n, String::from_utf8_lossy(&line)));
        }
        process.stderr(format!("{} lines\n", n));
        process.exit(code);
    })
}

#[tokio::test]
async fn test_run_returns_output() -> Result<()> {
    init_tracing();
    let transport = MockTransport::new(|process: RemoteProcess| async move {
        process.stdout(format!("ran: {}\n", process.command));
        process.exit(0);
    });
    let client = client(transport);

    let output = client.run(&credentials(), "hostname -f").await?;
    assert_eq!(output, b"ran: hostname -f\n");

    let log = client.transport().log();
    assert_eq!(log.connects[0].endpoint.port, 2222);
    assert!(log.connects[0].closed);
    assert!(log.channels[0].closed);
    Ok(())
}

#[tokio::test]
async fn test_run_is_repeatable() -> Result<()> {
    let transport = MockTransport::new(|process: RemoteProcess| async move {
        process.stdout(format!("listing {}\n", process.command));
        process.stderr("2 entries\n");
        process.stdout("a.conf\nb.conf\n");
        process.exit(0);
    });
    let client = client(transport);

    let first = client.run(&credentials(), "ls /etc/app").await?;
    let second = client.run(&credentials(), "ls /etc/app").await?;
    assert_eq!(first, second);
    assert!(!first.is_empty());

    let log = client.transport().log();
    assert_eq!(log.connects.len(), 2);
    assert!(log.connects.iter().all(|c| c.closed));
    Ok(())
}

#[tokio::test]
async fn test_run_failure_carries_output() {
    let transport = MockTransport::new(|process: RemoteProcess| async move {
        process.stdout("checking...\n");
        process.stderr("disk full\n");
        process.exit(3);
    });
    let client = client(transport);

    let err = client.run(&credentials(), "./check.sh").await.unwrap_err();

    assert_eq!(err.to_string(), "run command: Process exited with status 3");
    assert_eq!(err.output(), Some(&b"checking...\ndisk full\n"[..]));
    assert_eq!(err.exit_status(), Some(&ExitStatus::Code(3)));
    assert!(client.transport().log().connects[0].closed);
}

#[tokio::test]
async fn test_authentication_failure() {
    let client = client(numbering(0).failing(MockFailure::Authenticate));

    let err = client.run(&credentials(), "true").await.unwrap_err();

    assert!(err.to_string().starts_with("run command: connect: dial: "));
    assert!(matches!(err.root(), Error::Transport(TransportError::Authentication(_))));
    assert!(err.output().is_none());
    assert!(client.transport().log().channels.is_empty());
}

#[tokio::test]
async fn test_attached_with_redirected_streams() -> Result<()> {
    let client = client(numbering(0));
    let (stdout, mut stdout_reader) = tokio::io::duplex(64 * 1024);
    let (stderr, mut stderr_reader) = tokio::io::duplex(64 * 1024);
    let stdio = Stdio::inherit()
        .stdin(&b"alpha\nbeta\n"[..])
        .stdout(stdout)
        .stderr(stderr);

    client.run_attached(&credentials(), "nl", stdio).await?;

    let mut out = String::new();
    stdout_reader.read_to_string(&mut out).await?;
    let mut err = String::new();
    stderr_reader.read_to_string(&mut err).await?;
    assert_eq!(out, "1 alpha\n2 beta\n");
    assert_eq!(err, "2 lines\n");

    let log = client.transport().log();
    let pty = log.channels[0].pty.clone().expect("pty requested");
    assert_eq!(pty.term, "vt100");
    assert_eq!((pty.cols, pty.rows), (80, 24));
    assert!(log.channels[0].stdin_closed);
    assert!(log.connects[0].closed);
    Ok(())
}

#[tokio::test]
async fn test_attached_failure_is_wrapped() {
    let client = client(numbering(130));
    let stdio = Stdio::inherit()
        .stdin(&b""[..])
        .stdout(tokio::io::sink())
        .stderr(tokio::io::sink());

    let err = client.run_attached(&credentials(), "nl", stdio).await.unwrap_err();

    assert_eq!(err.to_string(), "run attached: run: Process exited with status 130");
    assert_eq!(err.exit_status(), Some(&ExitStatus::Code(130)));
    assert!(client.transport().log().connects[0].closed);
}

#[tokio::test]
async fn test_one_shot_run_without_key() {
    let err = remsh::remote_run("deploy", "127.0.0.1:1", "/nonexistent/remsh/id_ed25519", "true")
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("run command: connect: resolve credentials: "));
    assert!(matches!(err.root(), Error::Transport(TransportError::KeyRead { .. })));
}

#[tokio::test]
async fn test_one_shot_push_without_key() {
    let files = [remsh::FileTransfer::from_bytes(&b"x"[..], "/tmp/x")];
    let err = remsh::push_files("deploy", "127.0.0.1:1", "/nonexistent/remsh/id_ed25519", &files)
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("push files: push /tmp/x: remote session: resolve credentials: "));
}
