// ── ScpSource – source side of one SCP sink-mode session ────────────────────

use crate::scp::error::{ScpError, ScpResult};
use crate::scp::protocol::{encode_file_header, LOCAL_ACK};
use crate::scp::reply::read_reply;
use crate::scp::transport::{Transport, WriteEndpoint};
use crate::scp::types::*;
use chrono::Utc;
use log::{debug, info, warn};
use std::io::{self, BufReader, Read};

const BODY_CHUNK_SIZE: usize = 32 * 1024;

/// Source-role session over a pair of endpoints.
///
/// Created by reading the sink's greeting; every [`send_file`] is one
/// request/reply round trip. The write endpoint is closed exactly once, by
/// [`close`] or on drop, whichever comes first.
///
/// [`send_file`]: ScpSource::send_file
/// [`close`]: ScpSource::close
pub struct ScpSource<W: WriteEndpoint, R: Read> {
    writer: Option<W>,
    reader: BufReader<R>,
}

impl<W: WriteEndpoint, R: Read> ScpSource<W, R> {
    /// Take ownership of the endpoints and read the sink's greeting.
    ///
    /// A non-OK greeting or a failed read fails construction; the write
    /// endpoint is closed before the error is returned.
    pub fn new(writer: W, reader: R) -> ScpResult<Self> {
        let mut source = Self {
            writer: Some(writer),
            reader: BufReader::new(reader),
        };
        source
            .expect_ok()
            .map_err(|e| e.at_step(TransferStep::Handshake))?;
        debug!("SCP sink acknowledged session start");
        Ok(source)
    }

    /// Take the endpoints from `transport` and perform the handshake.
    pub fn open<T>(transport: &mut T) -> ScpResult<Self>
    where
        T: Transport<Writer = W, Reader = R>,
    {
        let (writer, reader) = transport.take_endpoints()?;
        Self::new(writer, reader)
    }

    /// Send one regular file.
    ///
    /// Writes the `C` header, copies `body` until it is exhausted, reads the
    /// sink's reply, writes the local acknowledgment and reads the final
    /// reply. Any failure aborts this file; nothing is retried.
    ///
    /// `name` goes on the wire verbatim and is trusted input. `body` should
    /// yield exactly `size` bytes. A different length is not corrected here;
    /// it is logged, shows up in the returned report and is left to the
    /// sink to reject.
    pub fn send_file<B: Read + ?Sized>(
        &mut self,
        mode: u32,
        size: u64,
        name: &str,
        body: &mut B,
    ) -> ScpResult<FileTransferReport> {
        let started = Utc::now();
        let mut state = TransferState::Idle;

        let header = encode_file_header(mode, size, name);
        let res = self.send(&header);
        advance(&mut state, TransferState::HeaderSent, name, res)?;

        let res = self.copy_body(body);
        let bytes_sent = advance(&mut state, TransferState::BodySent, name, res)?;
        if bytes_sent != size {
            warn!(
                "SCP body for '{}' was {} bytes but the header declared {}",
                name, bytes_sent, size
            );
        }

        let res = self.expect_ok();
        advance(&mut state, TransferState::ReplyReceived, name, res)?;

        let res = self.send(&[LOCAL_ACK]);
        advance(&mut state, TransferState::AckSent, name, res)?;

        let res = self.expect_ok();
        advance(&mut state, TransferState::Done, name, res)?;

        let duration = (Utc::now() - started).num_milliseconds().max(0) as u64;
        info!("SCP sent '{}' ({} bytes, mode {:04o})", name, bytes_sent, mode);

        Ok(FileTransferReport {
            name: name.to_string(),
            mode,
            declared_size: size,
            bytes_sent,
            started_at: started,
            duration_ms: duration,
        })
    }

    /// Close the write endpoint, signalling end-of-stream to the sink.
    ///
    /// Pending replies are not read.
    pub fn close(mut self) -> ScpResult<()> {
        self.shutdown()
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn writer(&mut self) -> ScpResult<&mut W> {
        self.writer.as_mut().ok_or_else(|| {
            ScpError::transport_write(&io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write endpoint already closed",
            ))
        })
    }

    fn send(&mut self, bytes: &[u8]) -> ScpResult<()> {
        let writer = self.writer()?;
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| ScpError::transport_write(&e))
    }

    fn copy_body<B: Read + ?Sized>(&mut self, body: &mut B) -> ScpResult<u64> {
        let writer = self.writer()?;
        let mut buffer = vec![0u8; BODY_CHUNK_SIZE];
        let mut copied: u64 = 0;
        loop {
            let n = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ScpError::body_source(&e)),
            };
            writer
                .write_all(&buffer[..n])
                .map_err(|e| ScpError::transport_write(&e))?;
            copied += n as u64;
        }
        writer.flush().map_err(|e| ScpError::transport_write(&e))?;
        Ok(copied)
    }

    fn expect_ok(&mut self) -> ScpResult<()> {
        let reply = read_reply(&mut self.reader)?;
        if reply.is_ok() {
            return Ok(());
        }
        warn!("SCP sink replied {}: {}", reply.status, reply.message.trim_end());
        Err(ScpError::remote_rejected(reply.status, reply.message))
    }

    fn shutdown(&mut self) -> ScpResult<()> {
        match self.writer.take() {
            Some(mut writer) => {
                debug!("Closing SCP write endpoint");
                writer
                    .close()
                    .map_err(|e| ScpError::transport_write(&e).at_step(TransferStep::Close))
            }
            None => Ok(()),
        }
    }
}

impl<W: WriteEndpoint, R: Read> Drop for ScpSource<W, R> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("{}", e);
        }
    }
}

/// Move to `to` on success; on failure tag the error with the step that
/// was in flight and the file name.
fn advance<T>(
    state: &mut TransferState,
    to: TransferState,
    name: &str,
    result: ScpResult<T>,
) -> ScpResult<T> {
    let step = state.next_step().unwrap_or(TransferStep::Close);
    match result {
        Ok(v) => {
            debug!("'{}': {} complete", name, step);
            *state = to;
            Ok(v)
        }
        Err(e) => Err(e.at_step(step).for_file(name)),
    }
}
