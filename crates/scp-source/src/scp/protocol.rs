//! SCP source-side wire format.
//!
//! Records written by the source:
//! - file header `C<mode> <size> <name>\n` (mode is 4-digit octal)
//! - the raw body bytes, no framing
//! - a single `0x00` acknowledgment
//!
//! Replies from the sink are one status byte, followed by a `\n`-terminated
//! message for WARNING and FATAL. See [`crate::scp::reply`].

use crate::scp::error::{ScpError, ScpResult};

pub const REPLY_OK: u8 = 0x00;
pub const REPLY_WARNING: u8 = 0x01;
pub const REPLY_FATAL: u8 = 0x02;

/// Byte the source writes after accepting the sink's post-body reply.
pub const LOCAL_ACK: u8 = REPLY_OK;

/// Only permission bits (including setuid/setgid/sticky) go on the wire.
pub const MODE_MASK: u32 = 0o7777;

/// Encode a `C` (regular file) header line.
///
/// `name` is written verbatim. The protocol does no escaping, so the name is
/// trusted input here; use [`check_file_name`] before accepting names from
/// outside.
pub fn encode_file_header(mode: u32, size: u64, name: &str) -> Vec<u8> {
    format!("C{:04o} {} {}\n", mode & MODE_MASK, size, name).into_bytes()
}

/// Reject names the sink would misinterpret or that escape the target dir.
pub fn check_file_name(name: &str) -> ScpResult<()> {
    if name.is_empty() {
        return Err(ScpError::invalid_config("file name is empty"));
    }
    if name == "." || name == ".." {
        return Err(ScpError::invalid_config(format!(
            "file name '{}' is not allowed",
            name
        )));
    }
    if name.contains('/') {
        return Err(ScpError::invalid_config(format!(
            "file name '{}' contains a path separator",
            name
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(ScpError::invalid_config(format!(
            "file name {:?} contains control characters",
            name
        )));
    }
    Ok(())
}

/// Parse an octal mode string such as `644` or `0755`.
pub fn parse_mode(s: &str) -> ScpResult<u32> {
    let trimmed = s.trim().trim_start_matches("0o");
    let mode = u32::from_str_radix(trimmed, 8)
        .map_err(|_| ScpError::invalid_config(format!("invalid octal mode '{}'", s)))?;
    if mode > MODE_MASK {
        return Err(ScpError::invalid_config(format!(
            "mode {:o} exceeds {:o}",
            mode, MODE_MASK
        )));
    }
    Ok(mode)
}
