//! Command-line arguments for `scp-send`.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use scp_source::scp::{KnownHostsPolicy, ScpError, ScpResult, SshTransportConfig};

use crate::config::{FileSpec, SendConfig, TransportKind};
use crate::logging::LogFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliTransport {
    /// Run the sink as a local process.
    Local,
    /// Run the sink on a remote host over SSH.
    Ssh,
}

impl From<CliTransport> for TransportKind {
    fn from(t: CliTransport) -> Self {
        match t {
            CliTransport::Local => TransportKind::Local,
            CliTransport::Ssh => TransportKind::Ssh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliHostKeyPolicy {
    /// Only connect to hosts already in known_hosts.
    Strict,
    /// Record unknown hosts, refuse changed keys.
    AcceptNew,
    /// Skip host key verification.
    Ignore,
}

impl From<CliHostKeyPolicy> for KnownHostsPolicy {
    fn from(p: CliHostKeyPolicy) -> Self {
        match p {
            CliHostKeyPolicy::Strict => KnownHostsPolicy::Strict,
            CliHostKeyPolicy::AcceptNew => KnownHostsPolicy::AcceptNew,
            CliHostKeyPolicy::Ignore => KnownHostsPolicy::Ignore,
        }
    }
}

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

/// scp-send - copy local files into a directory through an SCP sink.
#[derive(Debug, Parser)]
#[command(
    name = "scp-send",
    version,
    about = "Copy local files into a directory through an SCP sink"
)]
pub struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Where the sink runs
    #[arg(short = 't', long = "transport")]
    pub transport: Option<CliTransport>,

    /// Directory on the sink side that receives the files
    #[arg(short = 'd', long = "target", value_name = "DIR")]
    pub target: Option<String>,

    /// Program started in sink mode (`<program> -t <target>`)
    #[arg(long = "scp-program", value_name = "PROGRAM")]
    pub scp_program: Option<String>,

    /// SSH host
    #[arg(short = 'H', long = "host")]
    pub host: Option<String>,

    /// SSH port
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// SSH user name
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,

    /// Private key file for SSH authentication
    #[arg(short = 'i', long = "identity", value_name = "FILE")]
    pub identity: Option<PathBuf>,

    /// Environment variable holding the SSH password
    #[arg(long = "password-env", value_name = "VAR")]
    pub password_env: Option<String>,

    /// Try the SSH agent first
    #[arg(long = "agent")]
    pub agent: bool,

    /// How to treat the server's host key
    #[arg(long = "host-key-policy")]
    pub host_key_policy: Option<CliHostKeyPolicy>,

    /// SSH connect and I/O timeout in seconds
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Octal mode for files without an explicit one
    #[arg(short = 'm', long = "mode", value_name = "OCTAL")]
    pub mode: Option<String>,

    /// Stop after the first rejected file
    #[arg(long = "stop-on-error")]
    pub stop_on_error: bool,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log to file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,

    /// Print the transfer summary as JSON on stdout
    #[arg(long = "json")]
    pub json: bool,

    /// Files to send, in order
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

impl Cli {
    /// Build the effective configuration: the config file (if any), then flags.
    pub fn to_config(&self) -> ScpResult<SendConfig> {
        let mut cfg = match self.config {
            Some(ref path) => SendConfig::from_file(path)?,
            None => SendConfig::default(),
        };
        self.apply(&mut cfg, |var| std::env::var(var).ok())?;
        Ok(cfg)
    }

    /// Apply flag overrides. `env` resolves `--password-env`.
    pub fn apply<F>(&self, cfg: &mut SendConfig, env: F) -> ScpResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(t) = self.transport {
            cfg.transport = t.into();
        }
        if let Some(ref target) = self.target {
            cfg.target = target.clone();
        }
        if let Some(ref program) = self.scp_program {
            cfg.scp_program = program.clone();
        }
        if let Some(ref mode) = self.mode {
            cfg.default_mode = mode.clone();
        }
        if self.stop_on_error {
            cfg.stop_on_error = true;
        }
        if !self.files.is_empty() {
            cfg.files = self.files.iter().cloned().map(FileSpec::new).collect();
        }

        if self.has_ssh_flags() {
            let ssh = cfg
                .ssh
                .get_or_insert_with(|| SshTransportConfig::new(String::new(), String::new()));
            if let Some(ref host) = self.host {
                ssh.host = host.clone();
            }
            if let Some(port) = self.port {
                ssh.port = port;
            }
            if let Some(ref user) = self.user {
                ssh.username = user.clone();
            }
            if let Some(ref key) = self.identity {
                ssh.private_key_path = Some(key.display().to_string());
            }
            if let Some(secs) = self.timeout_secs {
                ssh.timeout_secs = secs;
            }
            if self.agent {
                ssh.use_agent = true;
            }
            if let Some(policy) = self.host_key_policy {
                ssh.known_hosts_policy = policy.into();
            }
            if let Some(ref var) = self.password_env {
                let password = env(var).ok_or_else(|| {
                    ScpError::invalid_config(format!("environment variable {} is not set", var))
                })?;
                ssh.password = Some(password);
            }
            if let Some(ref program) = self.scp_program {
                ssh.remote_scp_program = program.clone();
            }
        }
        Ok(())
    }

    fn has_ssh_flags(&self) -> bool {
        self.host.is_some()
            || self.port.is_some()
            || self.user.is_some()
            || self.identity.is_some()
            || self.password_env.is_some()
            || self.timeout_secs.is_some()
            || self.host_key_policy.is_some()
            || self.agent
    }
}
