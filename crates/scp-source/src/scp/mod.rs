// ── scp-source / scp module ──────────────────────────────────────────────────
//
// Source role of the SCP protocol:
//   • types     – replies, transfer steps, reports, SSH transport config
//   • error     – categorised ScpError
//   • protocol  – wire constants and header encoding
//   • reply     – sink reply decoder
//   • session   – ScpSource: handshake, send_file, close
//   • transport – endpoints over a local process or an ssh2 exec channel

pub mod types;
pub mod error;
pub mod protocol;
pub mod reply;
pub mod session;
pub mod transport;

pub use types::*;
pub use error::{ScpError, ScpErrorKind, ScpResult};
pub use reply::read_reply;
pub use session::ScpSource;
pub use transport::{ProcessTransport, SshTransport, Transport, WriteEndpoint};
