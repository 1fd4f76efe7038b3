//! Sink reply decoder.

use std::io::BufRead;

use log::trace;

use crate::scp::error::{ScpError, ScpResult};
use crate::scp::types::{Reply, ReplyStatus};

/// Decode exactly one reply record from `source`.
///
/// - `0x00` → OK, nothing further is consumed.
/// - `0x01` / `0x02` → WARNING / FATAL; bytes up to and including the next
///   `\n` are consumed and returned as the message (newline kept).
/// - any other byte → `ProtocolViolation`, nothing further is consumed.
///
/// End-of-stream and I/O failures come back as `TransportRead`.
pub fn read_reply<R: BufRead + ?Sized>(source: &mut R) -> ScpResult<Reply> {
    let mut status = [0u8; 1];
    source
        .read_exact(&mut status)
        .map_err(|e| ScpError::transport_read(&e))?;

    let status = match ReplyStatus::from_byte(status[0]) {
        Some(ReplyStatus::Ok) => {
            trace!("<<< OK");
            return Ok(Reply::ok());
        }
        Some(s) => s,
        None => return Err(ScpError::protocol_violation(status[0])),
    };

    let mut line = Vec::new();
    source
        .read_until(b'\n', &mut line)
        .map_err(|e| ScpError::transport_read(&e))?;
    if line.last() != Some(&b'\n') {
        return Err(ScpError::transport_read(&std::io::Error::from(
            std::io::ErrorKind::UnexpectedEof,
        )));
    }

    let message = String::from_utf8_lossy(&line).into_owned();
    trace!("<<< {} {}", status, message.trim_end());
    Ok(Reply { status, message })
}
