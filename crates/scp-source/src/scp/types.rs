// ── Types ─────────────────────────────────────────────────────────────────────

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scp::protocol::{REPLY_FATAL, REPLY_OK, REPLY_WARNING};

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_ssh_port() -> u16 {
    22
}
fn default_false() -> bool {
    false
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_scp_program() -> String {
    "scp".into()
}

// ── Connection & Authentication ──────────────────────────────────────────────

/// Settings for running the remote sink over an SSH exec channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshTransportConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub private_key_passphrase: Option<String>,
    #[serde(default = "default_false")]
    pub use_agent: bool,
    #[serde(default)]
    pub known_hosts_policy: KnownHostsPolicy,
    /// Defaults to `~/.ssh/known_hosts`.
    #[serde(default)]
    pub known_hosts_path: Option<String>,
    /// Applies to TCP connect and to every blocking SSH call afterwards.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Program the remote shell runs in sink mode.
    #[serde(default = "default_scp_program")]
    pub remote_scp_program: String,
}

impl SshTransportConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ssh_port(),
            username: username.into(),
            password: None,
            private_key_path: None,
            private_key_passphrase: None,
            use_agent: default_false(),
            known_hosts_policy: KnownHostsPolicy::default(),
            known_hosts_path: None,
            timeout_secs: default_timeout_secs(),
            remote_scp_program: default_scp_program(),
        }
    }
}

/// What to do with the server's host key after the SSH handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum KnownHostsPolicy {
    /// The host must already be listed with this key.
    Strict,
    /// Unknown hosts are added to known_hosts; changed keys are refused.
    #[default]
    AcceptNew,
    /// No check; the fingerprint is only logged.
    Ignore,
}

// ── Replies ──────────────────────────────────────────────────────────────────

/// Status byte of a sink reply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ReplyStatus {
    Ok,
    Warning,
    Fatal,
}

impl ReplyStatus {
    /// Classify a status byte. `None` means the stream is desynchronised.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            REPLY_OK => Some(Self::Ok),
            REPLY_WARNING => Some(Self::Warning),
            REPLY_FATAL => Some(Self::Fatal),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Ok => REPLY_OK,
            Self::Warning => REPLY_WARNING,
            Self::Fatal => REPLY_FATAL,
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "WARNING"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

/// One decoded reply record.
///
/// For WARNING/FATAL the message keeps its terminating `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: ReplyStatus,
    pub message: String,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            status: ReplyStatus::Ok,
            message: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }
}

// ── Transfer steps ───────────────────────────────────────────────────────────

/// Where in the session lifecycle an operation was when it failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferStep {
    Handshake,
    Header,
    Body,
    BodyReply,
    Ack,
    AckReply,
    Close,
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Handshake => "handshake",
            Self::Header => "file header",
            Self::Body => "file body",
            Self::BodyReply => "reply after body",
            Self::Ack => "local acknowledgment",
            Self::AckReply => "reply after acknowledgment",
            Self::Close => "close",
        };
        f.write_str(s)
    }
}

/// Per-call progress of `send_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    HeaderSent,
    BodySent,
    ReplyReceived,
    AckSent,
    Done,
}

impl TransferState {
    /// The step that moves the transfer out of this state.
    pub fn next_step(self) -> Option<TransferStep> {
        match self {
            Self::Idle => Some(TransferStep::Header),
            Self::HeaderSent => Some(TransferStep::Body),
            Self::BodySent => Some(TransferStep::BodyReply),
            Self::ReplyReceived => Some(TransferStep::Ack),
            Self::AckSent => Some(TransferStep::AckReply),
            Self::Done => None,
        }
    }
}

// ── Transfer reporting ───────────────────────────────────────────────────────

/// Result of one successful `send_file` round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransferReport {
    pub name: String,
    pub mode: u32,
    pub declared_size: u64,
    /// Body bytes actually copied; differs from `declared_size` only when the
    /// caller's body source was the wrong length.
    pub bytes_sent: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl FileTransferReport {
    pub fn length_mismatch(&self) -> bool {
        self.declared_size != self.bytes_sent
    }
}

/// Outcome of one file within a multi-file send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub local_path: String,
    pub remote_name: String,
    pub success: bool,
    pub report: Option<FileTransferReport>,
    pub error: Option<String>,
}

/// Summary for a whole session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_bytes: u64,
    pub duration_ms: u64,
    pub outcomes: Vec<TransferOutcome>,
}

impl SendSummary {
    pub fn push(&mut self, outcome: TransferOutcome) {
        self.total += 1;
        if outcome.success {
            self.succeeded += 1;
            if let Some(ref r) = outcome.report {
                self.total_bytes += r.bytes_sent;
            }
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}
