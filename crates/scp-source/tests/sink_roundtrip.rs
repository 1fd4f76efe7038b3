//! Drives `ScpSource` against a sink running on another thread, connected by
//! an in-memory duplex channel. The fake sink answers the way OpenSSH's
//! `scp -t` does: it replies to the header, reads the body and the source's
//! acknowledgment, then replies again.

use scp_source::scp::{ReplyStatus, ScpErrorKind, ScpSource, TransferStep, WriteEndpoint};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

struct PipeTx {
    tx: Option<Sender<Vec<u8>>>,
}

struct PipeRx {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pos: usize,
}

fn duplex() -> (PipeTx, PipeRx) {
    let (tx, rx) = channel();
    (
        PipeTx { tx: Some(tx) },
        PipeRx {
            rx,
            pending: Vec::new(),
            pos: 0,
        },
    )
}

impl Write for PipeTx {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "closed"))?;
        if buf.is_empty() {
            return Ok(0);
        }
        tx.send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteEndpoint for PipeTx {
    fn close(&mut self) -> io::Result<()> {
        self.tx.take();
        Ok(())
    }
}

impl Read for PipeRx {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.pending.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[derive(Debug, PartialEq)]
struct Received {
    mode: u32,
    name: String,
    body: Vec<u8>,
}

/// Sink side; rejects any file called `full-disk` after reading it.
fn run_sink(input: PipeRx, mut output: PipeTx) -> Vec<Received> {
    let mut input = BufReader::new(input);
    let mut received = Vec::new();
    output.write_all(&[0]).unwrap();

    loop {
        let mut line = Vec::new();
        if input.read_until(b'\n', &mut line).unwrap() == 0 {
            break;
        }
        let line = String::from_utf8(line).unwrap();
        let header = line.strip_suffix('\n').unwrap();
        let fields = header.strip_prefix('C').unwrap();
        let mut parts = fields.splitn(3, ' ');
        let mode = u32::from_str_radix(parts.next().unwrap(), 8).unwrap();
        let size: usize = parts.next().unwrap().parse().unwrap();
        let name = parts.next().unwrap().to_string();
        output.write_all(&[0]).unwrap();

        let mut body = vec![0u8; size];
        input.read_exact(&mut body).unwrap();
        let mut ack = [0xffu8; 1];
        input.read_exact(&mut ack).unwrap();
        assert_eq!(ack[0], 0, "source acknowledgment must be a zero byte");

        if name == "full-disk" {
            output
                .write_all(b"\x02scp: full-disk: No space left on device\n")
                .unwrap();
        } else {
            output.write_all(&[0]).unwrap();
            received.push(Received { mode, name, body });
        }
    }
    received
}

fn spawn_sink() -> (PipeTx, PipeRx, thread::JoinHandle<Vec<Received>>) {
    let (to_sink, sink_in) = duplex();
    let (sink_out, from_sink) = duplex();
    let handle = thread::spawn(move || run_sink(sink_in, sink_out));
    (to_sink, from_sink, handle)
}

#[test]
fn sends_two_files_in_order() {
    let (writer, reader, sink) = spawn_sink();
    let mut source = ScpSource::new(writer, reader).unwrap();

    let mut body: &[u8] = b"content1\n";
    source.send_file(0o644, 9, "test1", &mut body).unwrap();
    let mut body: &[u8] = b"content2\n";
    source.send_file(0o406, 9, "test2", &mut body).unwrap();
    source.close().unwrap();

    let received = sink.join().unwrap();
    assert_eq!(
        received,
        vec![
            Received {
                mode: 0o644,
                name: "test1".into(),
                body: b"content1\n".to_vec(),
            },
            Received {
                mode: 0o406,
                name: "test2".into(),
                body: b"content2\n".to_vec(),
            },
        ]
    );
}

#[test]
fn rejected_file_leaves_session_usable() {
    let (writer, reader, sink) = spawn_sink();
    let mut source = ScpSource::new(writer, reader).unwrap();

    let mut body: &[u8] = b"a";
    source.send_file(0o644, 1, "first", &mut body).unwrap();

    let mut body: &[u8] = b"lots of data";
    let err = source.send_file(0o644, 12, "full-disk", &mut body).unwrap_err();
    assert_eq!(err.kind, ScpErrorKind::RemoteRejected);
    assert_eq!(err.step, Some(TransferStep::AckReply));
    assert_eq!(err.remote_status, Some(ReplyStatus::Fatal));
    assert_eq!(
        err.remote_message(),
        Some("scp: full-disk: No space left on device\n")
    );

    let mut body: &[u8] = b"b";
    source.send_file(0o600, 1, "second", &mut body).unwrap();
    drop(source);

    let names: Vec<String> = sink.join().unwrap().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn boxed_endpoints_work_for_runtime_selected_transports() {
    let (writer, reader, sink) = spawn_sink();
    let writer: Box<dyn WriteEndpoint> = Box::new(writer);
    let reader: Box<dyn Read> = Box::new(reader);
    let mut source = ScpSource::new(writer, reader).unwrap();

    let payload = vec![7u8; 100_000];
    let mut body = payload.as_slice();
    let report = source
        .send_file(0o640, payload.len() as u64, "blob.bin", &mut body)
        .unwrap();
    assert_eq!(report.bytes_sent, payload.len() as u64);
    source.close().unwrap();

    let received = sink.join().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, payload);
}

#[test]
fn session_with_no_files_just_closes() {
    let (writer, reader, sink) = spawn_sink();
    let source = ScpSource::new(writer, reader).unwrap();
    source.close().unwrap();
    assert!(sink.join().unwrap().is_empty());
}
