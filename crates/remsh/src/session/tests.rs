//! Unit tests for session management

use super::*;
use remsh_ssh::mock::{MockFailure, MockTransport};
use remsh_ssh::ChannelEvent;

const KEY: &str = include_str!("../../../remsh-ssh/testdata/id_ed25519");

fn password_credentials() -> Credentials {
    Credentials::new("mock.example:2222", "deploy", "hunter2")
}

fn idle() -> MockTransport {
    MockTransport::replying(vec![ChannelEvent::Exit(remsh_ssh::ExitStatus::Code(0))])
}

#[tokio::test]
async fn test_connect_with_password() {
    let transport = idle();
    let session = SessionHandle::connect(&transport, &password_credentials(), AuthMode::Password)
        .await
        .unwrap();
    assert_eq!(session.endpoint(), &Endpoint::new("mock.example", 2222));

    let log = transport.log();
    assert_eq!(log.connects.len(), 1);
    assert_eq!(log.connects[0].user, "deploy");
    assert_eq!(log.connects[0].mode, AuthMode::Password);
    assert_eq!(log.channels.len(), 1);
    assert!(!log.connects[0].closed);

    session.close().await.unwrap();
    let log = transport.log();
    assert!(log.connects[0].closed);
    assert!(log.channels[0].closed);
}

#[tokio::test]
async fn test_connect_with_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("id_ed25519");
    std::fs::write(&path, KEY).unwrap();

    let transport = idle();
    let credentials = Credentials::new("mock.example", "deploy", path.to_string_lossy());
    let session = SessionHandle::connect(&transport, &credentials, "public-key-file")
        .await
        .unwrap();
    assert_eq!(session.endpoint().port, 22);
    session.close().await.unwrap();

    assert_eq!(transport.log().connects[0].mode, AuthMode::PublicKeyFile);
}

#[tokio::test]
async fn test_numeric_mode_tags() {
    let transport = idle();
    let session = SessionHandle::connect(&transport, &password_credentials(), 1i32)
        .await
        .unwrap();
    session.close().await.unwrap();
    assert_eq!(transport.log().connects[0].mode, AuthMode::Password);
}

#[tokio::test]
async fn test_unsupported_mode_before_network() {
    let transport = idle();

    let err = SessionHandle::connect(&transport, &password_credentials(), 7i32)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Transport(TransportError::UnsupportedAuthMode(ref tag)) if tag == "7"));

    let err = SessionHandle::connect(&transport, &password_credentials(), "kerberos")
        .await
        .err()
        .unwrap();
    assert!(matches!(err.root(), Error::Transport(TransportError::UnsupportedAuthMode(_))));

    assert!(transport.log().connects.is_empty());
}

#[tokio::test]
async fn test_missing_key_file() {
    let transport = idle();
    let credentials = Credentials::new("mock.example", "deploy", "/nonexistent/id_ed25519");
    let err = SessionHandle::connect(&transport, &credentials, AuthMode::PublicKeyFile)
        .await
        .err()
        .unwrap();

    assert!(err.to_string().starts_with("resolve credentials: "));
    assert!(matches!(err.root(), Error::Transport(TransportError::KeyRead { .. })));
    assert!(transport.log().connects.is_empty());
}

#[tokio::test]
async fn test_garbage_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("id_garbage");
    std::fs::write(&path, "not a key").unwrap();

    let transport = idle();
    let credentials = Credentials::new("mock.example", "deploy", path.to_string_lossy());
    let err = SessionHandle::connect(&transport, &credentials, AuthMode::PublicKeyFile)
        .await
        .err()
        .unwrap();
    assert!(matches!(err.root(), Error::Transport(TransportError::KeyParse { .. })));
}

#[tokio::test]
async fn test_invalid_address() {
    let transport = idle();
    let credentials = Credentials::new("mock.example:notaport", "deploy", "hunter2");
    let err = SessionHandle::connect(&transport, &credentials, AuthMode::Password)
        .await
        .err()
        .unwrap();

    assert!(err.to_string().starts_with("dial: "));
    assert!(transport.log().connects.is_empty());
}

#[tokio::test]
async fn test_dial_failure() {
    let transport = idle().failing(MockFailure::Authenticate);
    let err = SessionHandle::connect(&transport, &password_credentials(), AuthMode::Password)
        .await
        .err()
        .unwrap();

    assert!(err.to_string().starts_with("dial: "));
    assert!(matches!(err.root(), Error::Transport(TransportError::Authentication(_))));
    assert!(!transport.log().connects[0].established);
}

#[tokio::test]
async fn test_channel_failure_closes_connection() {
    let transport = idle().failing(MockFailure::OpenChannel);
    let err = SessionHandle::connect(&transport, &password_credentials(), AuthMode::Password)
        .await
        .err()
        .unwrap();

    assert!(err.to_string().starts_with("open channel: "));
    let log = transport.log();
    assert!(log.connects[0].established);
    assert!(log.connects[0].closed);
    assert!(log.channels.is_empty());
}

#[tokio::test]
async fn test_one_command_per_session() {
    let transport = idle();
    let mut session = SessionHandle::connect(&transport, &password_credentials(), AuthMode::Password)
        .await
        .unwrap();

    session.run("true").await.unwrap();
    assert!(matches!(session.run("true").await, Err(Error::SessionUsed)));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_drop_without_close() {
    let transport = idle();
    let session = SessionHandle::connect(&transport, &password_credentials(), AuthMode::Password)
        .await
        .unwrap();
    let id = session.id();
    drop(session);

    assert!(!id.is_nil());
    assert!(!transport.log().connects[0].closed);
}

#[test]
fn test_credentials_debug_redacts_secret() {
    let debug = format!("{:?}", password_credentials());
    assert!(debug.contains("deploy"));
    assert!(!debug.contains("hunter2"));
}
