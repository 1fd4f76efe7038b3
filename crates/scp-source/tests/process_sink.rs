//! `ProcessTransport` against small shell-script sinks.
#![cfg(unix)]

use scp_source::scp::{ProcessTransport, ScpErrorKind, ScpSource, Transport};
use std::process::Command;

fn sh(script: &str, args: &[&str]) -> ProcessTransport {
    let mut command = Command::new("sh");
    command.arg("-c").arg(script).args(args);
    ProcessTransport::spawn(command).unwrap()
}

#[test]
fn bytes_reach_the_child_process() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("captured");
    let capture_str = capture.to_str().unwrap();

    // Greeting plus both replies up front, then record everything we send.
    let mut transport = sh("printf '\\000\\000\\000'; cat > \"$0\"", &[capture_str]);
    let mut source = ScpSource::open(&mut transport).unwrap();
    let mut body: &[u8] = b"content1\n";
    source.send_file(0o644, 9, "test1", &mut body).unwrap();
    source.close().unwrap();
    transport.finish().unwrap();

    let captured = std::fs::read(&capture).unwrap();
    assert_eq!(captured, b"C0644 9 test1\ncontent1\n\x00");
}

#[test]
fn fatal_greeting_fails_construction() {
    let mut transport = sh("printf '\\002scp: /nowhere: No such file or directory\\n'", &[]);
    let err = ScpSource::open(&mut transport).err().unwrap();
    assert_eq!(err.kind, ScpErrorKind::RemoteRejected);
    assert_eq!(
        err.remote_message(),
        Some("scp: /nowhere: No such file or directory\n")
    );
    transport.finish().unwrap();
}

#[test]
fn sink_exiting_early_is_a_transport_error() {
    let mut transport = sh("printf '\\000'", &[]);
    let mut source = ScpSource::open(&mut transport).unwrap();
    let mut body: &[u8] = b"data";
    let err = source.send_file(0o644, 4, "x", &mut body).unwrap_err();
    assert!(matches!(
        err.kind,
        ScpErrorKind::TransportRead | ScpErrorKind::TransportWrite
    ));
    assert!(!err.is_recoverable());
    drop(source);
    transport.finish().unwrap();
}
