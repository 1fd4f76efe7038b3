// ── Transports – byte streams to a remote SCP sink ──────────────────────────
//
// The session only needs a writable endpoint it can close and a readable
// endpoint. Two ways of obtaining them live here:
//   • ProcessTransport – a local child process (`scp -t <dir>` by default)
//   • SshTransport     – `scp -t <dir>` executed over an ssh2 session channel

use crate::scp::error::{ScpError, ScpResult};
use crate::scp::types::{KnownHostsPolicy, SshTransportConfig};
use base64::Engine;
use log::{debug, info, warn};
use ssh2::{CheckResult, Channel, HashType, KnownHostFileKind, Session, Stream};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;

/// Writable half of a connection to the sink.
///
/// `close` signals end-of-input; the sink treats it as the end of the
/// transfer stream.
pub trait WriteEndpoint: Write {
    fn close(&mut self) -> io::Result<()>;
}

impl<W: WriteEndpoint + ?Sized> WriteEndpoint for Box<W> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Source of the two endpoints plus whatever supervises them.
pub trait Transport {
    type Writer: WriteEndpoint;
    type Reader: Read;

    /// Hand out the endpoints. Succeeds once per transport.
    fn take_endpoints(&mut self) -> ScpResult<(Self::Writer, Self::Reader)>;

    /// Tear down after the session has been closed.
    fn finish(self) -> ScpResult<()>;
}

// ── Local process ────────────────────────────────────────────────────────────

/// Child stdin as a closable endpoint.
pub struct PipeWriter {
    stdin: Option<ChildStdin>,
}

impl PipeWriter {
    pub fn new(stdin: ChildStdin) -> Self {
        Self { stdin: Some(stdin) }
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stdin.as_mut() {
            Some(w) => w.write(buf),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl WriteEndpoint for PipeWriter {
    fn close(&mut self) -> io::Result<()> {
        // Dropping the handle closes the pipe.
        if let Some(mut w) = self.stdin.take() {
            w.flush()?;
        }
        Ok(())
    }
}

/// A sink running as a local child process with piped stdin/stdout.
pub struct ProcessTransport {
    child: Child,
    program: String,
}

impl ProcessTransport {
    /// Spawn `command` with stdin/stdout piped; stderr is inherited.
    pub fn spawn(mut command: Command) -> ScpResult<Self> {
        let program = command.get_program().to_string_lossy().into_owned();
        let child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ScpError::spawn_failed(format!("failed to start '{}': {}", program, e)))?;
        info!("Started sink process '{}' (pid {})", program, child.id());
        Ok(Self { child, program })
    }

    /// `<program> -t <target>`: the sink-mode invocation of scp.
    pub fn scp_sink(program: &str, target: &Path) -> ScpResult<Self> {
        let mut command = Command::new(program);
        command.arg("-t").arg(target);
        Self::spawn(command)
    }
}

impl Transport for ProcessTransport {
    type Writer = PipeWriter;
    type Reader = ChildStdout;

    fn take_endpoints(&mut self) -> ScpResult<(PipeWriter, ChildStdout)> {
        let stdin = self.child.stdin.take();
        let stdout = self.child.stdout.take();
        match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => Ok((PipeWriter::new(stdin), stdout)),
            _ => Err(ScpError::spawn_failed(format!(
                "endpoints of '{}' were already taken",
                self.program
            ))),
        }
    }

    fn finish(mut self) -> ScpResult<()> {
        // Close our side in case the endpoints were never taken.
        drop(self.child.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| ScpError::spawn_failed(format!("waiting for '{}': {}", self.program, e)))?;
        if status.success() {
            debug!("Sink process '{}' exited cleanly", self.program);
            Ok(())
        } else {
            warn!("Sink process '{}' exited with {}", self.program, status);
            Err(ScpError::spawn_failed(format!(
                "'{}' exited with {}",
                self.program, status
            )))
        }
    }
}

// ── SSH exec channel ─────────────────────────────────────────────────────────

/// ssh2 channel as a closable endpoint; close sends EOF on the channel.
pub struct ChannelWriter {
    channel: Channel,
    eof_sent: bool,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.eof_sent {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "channel EOF already sent"));
        }
        self.channel.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.channel.flush()
    }
}

impl WriteEndpoint for ChannelWriter {
    fn close(&mut self) -> io::Result<()> {
        if self.eof_sent {
            return Ok(());
        }
        self.eof_sent = true;
        self.channel.send_eof().map_err(io::Error::from)
    }
}

/// A sink started with `exec` on an authenticated SSH session.
pub struct SshTransport {
    session: Session,
    channel: Option<Channel>,
    host: String,
}

impl SshTransport {
    /// Connect, authenticate and start `<remote scp> -t <target>`.
    pub fn connect(config: &SshTransportConfig, target: &str) -> ScpResult<Self> {
        let addr_str = format!("{}:{}", config.host, config.port);
        info!("SCP connecting to {}", addr_str);

        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| ScpError::spawn_failed(format!("cannot resolve '{}': {}", addr_str, e)))?
            .next()
            .ok_or_else(|| ScpError::spawn_failed(format!("no addresses for '{}'", addr_str)))?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
            ScpError::spawn_failed(format!("TCP connection to {} failed: {}", addr_str, e))
        })?;

        let mut session = Session::new()
            .map_err(|e| ScpError::spawn_failed(format!("failed to create SSH session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        session
            .handshake()
            .map_err(|e| ScpError::spawn_failed(format!("SSH handshake failed: {}", e)))?;
        verify_host_key(&session, config)?;

        let method = authenticate(&mut session, config)?;
        info!("SCP authenticated to {} via {}", addr_str, method);

        let mut channel = session
            .channel_session()
            .map_err(|e| ScpError::spawn_failed(format!("failed to open channel: {}", e)))?;
        let command = format!("{} -t {}", config.remote_scp_program, shell_escape(target));
        channel
            .exec(&command)
            .map_err(|e| ScpError::spawn_failed(format!("failed to execute '{}': {}", command, e)))?;
        debug!("Remote sink started: {}", command);

        Ok(Self {
            session,
            channel: Some(channel),
            host: config.host.clone(),
        })
    }
}

impl Transport for SshTransport {
    type Writer = ChannelWriter;
    type Reader = Stream;

    fn take_endpoints(&mut self) -> ScpResult<(ChannelWriter, Stream)> {
        let channel = self.channel.take().ok_or_else(|| {
            ScpError::spawn_failed(format!("channel to {} was already taken", self.host))
        })?;
        let reader = channel.stream(0);
        Ok((
            ChannelWriter {
                channel,
                eof_sent: false,
            },
            reader,
        ))
    }

    fn finish(self) -> ScpResult<()> {
        self.session
            .disconnect(None, "scp transfer finished", None)
            .map_err(|e| ScpError::spawn_failed(format!("SSH disconnect failed: {}", e)))?;
        info!("SCP disconnected from {}", self.host);
        Ok(())
    }
}

// ── Host key verification ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostKeyAction {
    Trusted,
    Record,
    Unchecked,
}

/// Decide whether to go on given the known_hosts lookup result.
fn host_key_action(
    policy: KnownHostsPolicy,
    result: CheckResult,
    host: &str,
    fingerprint: &str,
) -> ScpResult<HostKeyAction> {
    match (policy, result) {
        (KnownHostsPolicy::Ignore, _) => Ok(HostKeyAction::Unchecked),
        (_, CheckResult::Match) => Ok(HostKeyAction::Trusted),
        (_, CheckResult::Mismatch) => Err(ScpError::auth_failed(format!(
            "host key for {} ({}) does not match known_hosts",
            host, fingerprint
        ))),
        (KnownHostsPolicy::AcceptNew, CheckResult::NotFound) => Ok(HostKeyAction::Record),
        (KnownHostsPolicy::Strict, CheckResult::NotFound) => Err(ScpError::auth_failed(format!(
            "host {} ({}) is not in known_hosts",
            host, fingerprint
        ))),
        (_, CheckResult::Failure) => Err(ScpError::auth_failed(format!(
            "known_hosts lookup for {} failed",
            host
        ))),
    }
}

/// Host pattern as OpenSSH writes it: bare for port 22, `[host]:port` otherwise.
fn known_hosts_entry(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{}]:{}", host, port)
    }
}

fn known_hosts_file(config: &SshTransportConfig) -> Option<PathBuf> {
    match config.known_hosts_path {
        Some(ref p) => Some(PathBuf::from(p)),
        None => dirs::home_dir().map(|h| h.join(".ssh").join("known_hosts")),
    }
}

fn ssh_failed(what: &str) -> impl Fn(ssh2::Error) -> ScpError + '_ {
    move |e| ScpError::spawn_failed(format!("{}: {}", what, e))
}

fn verify_host_key(session: &Session, config: &SshTransportConfig) -> ScpResult<()> {
    let fingerprint = session
        .host_key_hash(HashType::Sha256)
        .map(|bytes| {
            format!(
                "SHA256:{}",
                base64::engine::general_purpose::STANDARD_NO_PAD.encode(bytes)
            )
        })
        .unwrap_or_else(|| "unknown".into());
    info!("SCP host key for {} is {}", config.host, fingerprint);

    if config.known_hosts_policy == KnownHostsPolicy::Ignore {
        warn!("SCP host key for {} is not verified", config.host);
        return Ok(());
    }

    let (key, key_type) = session
        .host_key()
        .ok_or_else(|| ScpError::auth_failed("server sent no host key"))?;
    let path = known_hosts_file(config);

    let mut known = session
        .known_hosts()
        .map_err(ssh_failed("cannot initialise known_hosts"))?;
    if let Some(ref path) = path {
        if path.exists() {
            known
                .read_file(path, KnownHostFileKind::OpenSSH)
                .map_err(ssh_failed("cannot read known_hosts"))?;
        }
    }

    let result = known.check_port(&config.host, config.port, key);
    match host_key_action(config.known_hosts_policy, result, &config.host, &fingerprint)? {
        HostKeyAction::Trusted => debug!("SCP host key for {} matches known_hosts", config.host),
        HostKeyAction::Unchecked => {}
        HostKeyAction::Record => match path {
            Some(path) => {
                let entry = known_hosts_entry(&config.host, config.port);
                let mut fresh = session
                    .known_hosts()
                    .map_err(ssh_failed("cannot initialise known_hosts"))?;
                fresh
                    .add(&entry, key, "added by scp-send", key_type.into())
                    .map_err(ssh_failed("cannot add host key"))?;
                let hosts = fresh.hosts().map_err(ssh_failed("cannot list host keys"))?;
                let host = hosts
                    .first()
                    .ok_or_else(|| ScpError::spawn_failed("host key entry was not created"))?;
                let mut line = fresh
                    .write_string(host, KnownHostFileKind::OpenSSH)
                    .map_err(ssh_failed("cannot format host key"))?;
                if !line.ends_with('\n') {
                    line.push('\n');
                }
                append_line(&path, &line).map_err(|e| {
                    ScpError::spawn_failed(format!("cannot write {}: {}", path.display(), e))
                })?;
                info!("SCP added {} to {}", entry, path.display());
            }
            None => warn!(
                "SCP host key for {} accepted but no known_hosts file to record it in",
                config.host
            ),
        },
    }
    Ok(())
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?
        .write_all(line.as_bytes())
}

// ── Authentication ───────────────────────────────────────────────────────────

fn authenticate(session: &mut Session, config: &SshTransportConfig) -> ScpResult<String> {
    // 1. Agent auth
    if config.use_agent {
        if session.userauth_agent(&config.username).is_ok() && session.authenticated() {
            return Ok("agent".into());
        }
        warn!("SCP agent auth failed for {}, trying other methods", config.username);
    }

    let passphrase = config.private_key_passphrase.as_deref();

    // 2. Private key from file
    if let Some(ref key_path) = config.private_key_path {
        let path = Path::new(key_path);
        if path.exists() {
            if session
                .userauth_pubkey_file(&config.username, None, path, passphrase)
                .is_ok()
                && session.authenticated()
            {
                return Ok("publickey-file".into());
            }
            warn!("SCP publickey-file auth failed for {}", config.username);
        } else {
            warn!("SCP private key '{}' does not exist", key_path);
        }
    }

    // 3. Default key files
    if let Some(home) = dirs::home_dir() {
        let ssh_dir = home.join(".ssh");
        for key_name in &["id_ed25519", "id_rsa", "id_ecdsa"] {
            let key_path = ssh_dir.join(key_name);
            if key_path.exists()
                && session
                    .userauth_pubkey_file(&config.username, None, &key_path, passphrase)
                    .is_ok()
                && session.authenticated()
            {
                return Ok(format!("publickey-default({})", key_name));
            }
        }
    }

    // 4. Password auth
    if let Some(ref password) = config.password {
        if session.userauth_password(&config.username, password).is_ok() && session.authenticated() {
            return Ok("password".into());
        }
        warn!("SCP password auth failed for {}", config.username);
    }

    Err(ScpError::auth_failed(format!(
        "all authentication methods exhausted for user '{}'",
        config.username
    )))
}

/// Single-quote a path for the remote shell.
pub(crate) fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
