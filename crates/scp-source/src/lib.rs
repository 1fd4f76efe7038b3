//! # SCP source
//!
//! Source (sending) side of the SCP sink-mode protocol over any pair of
//! byte streams:
//!   • Reply decoding (OK / WARNING / FATAL)
//!   • `C` file header framing and body streaming
//!   • Per-file request/reply sequencing with local acknowledgment
//!   • Local-process and SSH exec transports

pub mod scp;
