//! Drives one session: open the transport, send every planned file, close.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Instant;

use scp_source::scp::{
    FileTransferReport, ProcessTransport, ScpError, ScpResult, ScpSource, SendSummary,
    SshTransport, TransferOutcome, Transport, WriteEndpoint,
};
use tracing::{debug, error, info, warn};

use crate::config::{PlannedFile, SendConfig, TransportKind};

/// How the loop reacts to per-file failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    pub stop_on_error: bool,
    pub strict_size: bool,
}

impl From<&SendConfig> for SendOptions {
    fn from(cfg: &SendConfig) -> Self {
        Self {
            stop_on_error: cfg.stop_on_error,
            strict_size: cfg.strict_size,
        }
    }
}

/// Validate `cfg`, start the configured transport and send all its files.
pub fn run(cfg: &SendConfig) -> ScpResult<SendSummary> {
    cfg.validate()?;
    let plan = cfg.plan()?;
    let options = SendOptions::from(cfg);

    match cfg.transport {
        TransportKind::Local => {
            info!(program = %cfg.scp_program, target = %cfg.target, "starting local sink");
            let transport = ProcessTransport::scp_sink(&cfg.scp_program, Path::new(&cfg.target))?;
            send_all(transport, &plan, options)
        }
        TransportKind::Ssh => {
            let ssh = cfg
                .ssh
                .as_ref()
                .ok_or_else(|| ScpError::invalid_config("missing ssh settings"))?;
            info!(host = %ssh.host, port = ssh.port, target = %cfg.target, "connecting");
            let transport = SshTransport::connect(ssh, &cfg.target)?;
            send_all(transport, &plan, options)
        }
    }
}

/// Send `plan` over a fresh session on `transport`.
///
/// Rejected files are recorded and the loop moves on. Any error that leaves
/// the stream out of sync ends the loop; the files after it are counted as
/// skipped. Close and teardown errors are returned only when every file went
/// through, since otherwise the summary already reports the failure.
pub fn send_all<T: Transport>(
    mut transport: T,
    plan: &[PlannedFile],
    options: SendOptions,
) -> ScpResult<SendSummary> {
    let started = Instant::now();

    let mut source = match ScpSource::open(&mut transport) {
        Ok(source) => source,
        Err(e) => {
            if let Err(fe) = transport.finish() {
                debug!(error = %fe, "transport teardown after failed handshake");
            }
            return Err(e);
        }
    };

    let mut summary = SendSummary::default();
    for (index, file) in plan.iter().enumerate() {
        let local_path = file.local_path.display().to_string();
        match send_one(&mut source, file, options.strict_size) {
            Ok(report) => {
                if report.length_mismatch() {
                    warn!(
                        file = %local_path,
                        declared = report.declared_size,
                        sent = report.bytes_sent,
                        "file changed size while it was sent"
                    );
                }
                summary.push(TransferOutcome {
                    local_path,
                    remote_name: file.remote_name.clone(),
                    success: true,
                    report: Some(report),
                    error: None,
                });
            }
            Err(e) => {
                error!(file = %local_path, "{}", e);
                let stop = options.stop_on_error || !e.is_recoverable();
                summary.push(TransferOutcome {
                    local_path,
                    remote_name: file.remote_name.clone(),
                    success: false,
                    report: None,
                    error: Some(e.to_string()),
                });
                if stop {
                    summary.skipped = plan.len() - index - 1;
                    if summary.skipped > 0 {
                        warn!(skipped = summary.skipped, "not sending remaining files");
                    }
                    break;
                }
            }
        }
    }

    let closed = source.close();
    let finished = transport.finish();
    summary.duration_ms = started.elapsed().as_millis() as u64;

    for result in [closed, finished] {
        if let Err(e) = result {
            if summary.failed == 0 {
                return Err(e);
            }
            warn!(error = %e, "session teardown failed");
        }
    }

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        bytes = summary.total_bytes,
        "send finished"
    );
    Ok(summary)
}

fn send_one<W, R>(
    source: &mut ScpSource<W, R>,
    file: &PlannedFile,
    strict_size: bool,
) -> ScpResult<FileTransferReport>
where
    W: WriteEndpoint,
    R: Read,
{
    // Anything that fails here has not touched the stream yet.
    let opened = File::open(&file.local_path).and_then(|f| {
        let meta = f.metadata()?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }
        Ok((f, meta.len()))
    });
    let (handle, size) =
        opened.map_err(|e| ScpError::body_source(&e).for_file(file.remote_name.as_str()))?;

    debug!(file = %file.local_path.display(), size, "sending");
    if strict_size {
        source.send_file(file.mode, size, &file.remote_name, &mut handle.take(size))
    } else {
        let mut handle = handle;
        source.send_file(file.mode, size, &file.remote_name, &mut handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scp_source::scp::ScpErrorKind;
    use std::cell::RefCell;
    use std::io::{Cursor, Write};
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<u8>>>);

    impl Write for Recorder {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl WriteEndpoint for Recorder {
        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct MemoryTransport {
        endpoints: Option<(Recorder, Cursor<Vec<u8>>)>,
        finished: Rc<RefCell<bool>>,
    }

    impl MemoryTransport {
        fn new(replies: &[u8]) -> (Self, Recorder, Rc<RefCell<bool>>) {
            let recorder = Recorder::default();
            let finished = Rc::new(RefCell::new(false));
            let transport = Self {
                endpoints: Some((recorder.clone(), Cursor::new(replies.to_vec()))),
                finished: finished.clone(),
            };
            (transport, recorder, finished)
        }
    }

    impl Transport for MemoryTransport {
        type Writer = Recorder;
        type Reader = Cursor<Vec<u8>>;

        fn take_endpoints(&mut self) -> ScpResult<(Recorder, Cursor<Vec<u8>>)> {
            self.endpoints
                .take()
                .ok_or_else(|| ScpError::spawn_failed("already taken"))
        }

        fn finish(self) -> ScpResult<()> {
            *self.finished.borrow_mut() = true;
            Ok(())
        }
    }

    fn write_file(dir: &Path, name: &str, body: &[u8]) -> PlannedFile {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        PlannedFile {
            local_path: path,
            remote_name: name.to_string(),
            mode: 0o644,
        }
    }

    #[test]
    fn sends_files_and_finishes_transport() {
        let dir = tempfile::tempdir().unwrap();
        let plan = vec![
            write_file(dir.path(), "test1", b"content1\n"),
            write_file(dir.path(), "test2", b"content2\n"),
        ];
        let (transport, recorder, finished) = MemoryTransport::new(&[0, 0, 0, 0, 0]);

        let summary = send_all(transport, &plan, SendOptions::default()).unwrap();
        assert!(summary.all_succeeded());
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.total_bytes, 18);
        assert!(*finished.borrow());
        assert_eq!(
            recorder.0.borrow().as_slice(),
            b"C0644 9 test1\ncontent1\n\x00C0644 9 test2\ncontent2\n\x00".as_slice()
        );
    }

    #[test]
    fn rejected_file_is_recorded_and_loop_continues() {
        let dir = tempfile::tempdir().unwrap();
        let plan = vec![
            write_file(dir.path(), "a", b"1"),
            write_file(dir.path(), "b", b"2"),
        ];
        let mut replies = vec![0u8];
        replies.extend_from_slice(b"\x01a: permission denied\n");
        replies.extend_from_slice(&[0, 0]);
        let (transport, _recorder, _) = MemoryTransport::new(&replies);

        let summary = send_all(transport, &plan, SendOptions::default()).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 1);
        assert!(summary.outcomes[0]
            .error
            .as_deref()
            .unwrap()
            .contains("permission denied"));
        assert!(summary.outcomes[1].success);
    }

    #[test]
    fn stop_on_error_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let plan = vec![
            write_file(dir.path(), "a", b"1"),
            write_file(dir.path(), "b", b"2"),
            write_file(dir.path(), "c", b"3"),
        ];
        let mut replies = vec![0u8];
        replies.extend_from_slice(b"\x02a: quota exceeded\n");
        let (transport, recorder, _) = MemoryTransport::new(&replies);

        let options = SendOptions {
            stop_on_error: true,
            strict_size: true,
        };
        let summary = send_all(transport, &plan, options).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 2);
        assert!(!summary.all_succeeded());
        assert_eq!(recorder.0.borrow().as_slice(), b"C0644 1 a\n1".as_slice());
    }

    #[test]
    fn protocol_violation_ends_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let plan = vec![
            write_file(dir.path(), "a", b"1"),
            write_file(dir.path(), "b", b"2"),
        ];
        let (transport, _recorder, finished) = MemoryTransport::new(&[0, 0x41]);

        let summary = send_all(transport, &plan, SendOptions::default()).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(*finished.borrow());
    }

    #[test]
    fn missing_local_file_does_not_touch_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let plan = vec![
            PlannedFile {
                local_path: dir.path().join("absent"),
                remote_name: "absent".into(),
                mode: 0o644,
            },
            write_file(dir.path(), "b", b"2"),
        ];
        let (transport, recorder, _) = MemoryTransport::new(&[0, 0, 0]);

        let summary = send_all(transport, &plan, SendOptions::default()).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(recorder.0.borrow().as_slice(), b"C0644 1 b\n2\x00".as_slice());
    }

    #[test]
    fn directory_is_rejected_before_its_header() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        let plan = vec![
            PlannedFile {
                local_path: dir.path().join("subdir"),
                remote_name: "subdir".into(),
                mode: 0o644,
            },
            write_file(dir.path(), "b", b"2"),
        ];
        let (transport, recorder, _) = MemoryTransport::new(&[0, 0, 0]);

        let summary = send_all(transport, &plan, SendOptions::default()).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 0);
        assert!(summary.outcomes[0]
            .error
            .as_deref()
            .unwrap()
            .contains("not a regular file"));
        assert!(summary.outcomes[1].success);
        assert_eq!(recorder.0.borrow().as_slice(), b"C0644 1 b\n2\x00".as_slice());
    }

    #[test]
    fn failed_handshake_still_finishes_transport() {
        let (transport, recorder, finished) = MemoryTransport::new(b"\x02scp: no such dir\n");
        let err = send_all(transport, &[], SendOptions::default()).unwrap_err();
        assert_eq!(err.kind, ScpErrorKind::RemoteRejected);
        assert!(*finished.borrow());
        assert!(recorder.0.borrow().is_empty());
    }
}
