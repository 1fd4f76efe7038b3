//! SCP-specific error type.

use crate::scp::types::{ReplyStatus, TransferStep};
use serde::Serialize;
use std::fmt;
use std::io;

/// Categorised SCP error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScpError {
    pub kind: ScpErrorKind,
    pub message: String,
    /// Protocol step that was in flight when the error occurred.
    pub step: Option<TransferStep>,
    /// Name of the file being transferred, if any.
    pub file_name: Option<String>,
    /// Status byte of a well-formed non-OK reply.
    pub remote_status: Option<ReplyStatus>,
    /// Text sent by the sink with a WARNING/FATAL reply, newline included.
    pub remote_message: Option<String>,
    #[serde(skip)]
    io_kind: Option<io::ErrorKind>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ScpErrorKind {
    /// Writing to the sink endpoint failed.
    TransportWrite,
    /// Reading from the source endpoint failed, including end-of-stream.
    TransportRead,
    /// A reply byte outside {OK, WARNING, FATAL}; the stream is desynchronised.
    ProtocolViolation,
    /// The sink answered WARNING or FATAL.
    RemoteRejected,
    /// Reading the caller-supplied file body failed.
    BodySource,
    /// Configuration / parameter validation error.
    InvalidConfig,
    /// The transport could not be started (process spawn, TCP connect, exec).
    SpawnFailed,
    /// SSH authentication failed.
    AuthFailed,
}

pub type ScpResult<T> = Result<T, ScpError>;

// ── Construction helpers ─────────────────────────────────────────────

impl ScpError {
    pub fn new(kind: ScpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            step: None,
            file_name: None,
            remote_status: None,
            remote_message: None,
            io_kind: None,
        }
    }

    pub fn at_step(mut self, step: TransferStep) -> Self {
        self.step = Some(step);
        self
    }

    pub fn for_file(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    // ── Convenience constructors ─────────────────────────────────

    pub fn transport_write(err: &io::Error) -> Self {
        let mut e = Self::new(ScpErrorKind::TransportWrite, format!("write failed: {}", err));
        e.io_kind = Some(err.kind());
        e
    }

    pub fn transport_read(err: &io::Error) -> Self {
        let msg = if err.kind() == io::ErrorKind::UnexpectedEof {
            "stream ended before a complete reply".to_string()
        } else {
            format!("read failed: {}", err)
        };
        let mut e = Self::new(ScpErrorKind::TransportRead, msg);
        e.io_kind = Some(err.kind());
        e
    }

    pub fn protocol_violation(byte: u8) -> Self {
        Self::new(
            ScpErrorKind::ProtocolViolation,
            format!("unexpected reply type 0x{:02x}", byte),
        )
    }

    pub fn remote_rejected(status: ReplyStatus, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut e = Self::new(
            ScpErrorKind::RemoteRejected,
            format!("sink replied {}: {}", status, message.trim_end()),
        );
        e.remote_status = Some(status);
        e.remote_message = Some(message);
        e
    }

    pub fn body_source(err: &io::Error) -> Self {
        let mut e = Self::new(ScpErrorKind::BodySource, format!("reading file body failed: {}", err));
        e.io_kind = Some(err.kind());
        e
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(ScpErrorKind::InvalidConfig, msg)
    }

    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::new(ScpErrorKind::SpawnFailed, msg)
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(ScpErrorKind::AuthFailed, msg)
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Underlying I/O error kind for transport failures.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        self.io_kind
    }

    /// True when the remote closed the stream before a full reply arrived.
    pub fn is_end_of_stream(&self) -> bool {
        self.kind == ScpErrorKind::TransportRead && self.io_kind == Some(io::ErrorKind::UnexpectedEof)
    }

    /// True when the stream timed out (per the underlying transport).
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.io_kind,
            Some(io::ErrorKind::TimedOut) | Some(io::ErrorKind::WouldBlock)
        )
    }

    /// Whether the session can still be used for another file.
    ///
    /// True for a well-formed remote rejection, and for a body-source failure
    /// that happened before anything was written. Anything else may leave
    /// the stream out of sync.
    pub fn is_recoverable(&self) -> bool {
        match self.kind {
            ScpErrorKind::RemoteRejected => true,
            ScpErrorKind::BodySource => self.step.is_none(),
            _ => false,
        }
    }

    pub fn remote_message(&self) -> Option<&str> {
        self.remote_message.as_deref()
    }
}

impl fmt::Display for ScpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[SCP {:?}] ", self.kind)?;
        if let Some(step) = self.step {
            write!(f, "{}", step)?;
            if let Some(ref name) = self.file_name {
                write!(f, " for '{}'", name)?;
            }
            write!(f, ": ")?;
        } else if let Some(ref name) = self.file_name {
            write!(f, "'{}': ", name)?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScpError {}

impl From<ScpError> for String {
    fn from(e: ScpError) -> String {
        e.to_string()
    }
}
