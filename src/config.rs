//! Send configuration: which transport to use, where to put files and which
//! files to send. Loaded from JSON and then overridden by CLI flags.

use scp_source::scp::protocol::{check_file_name, parse_mode};
use scp_source::scp::{ScpError, ScpResult, SshTransportConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_scp_program() -> String {
    "scp".into()
}
fn default_mode() -> String {
    "0644".into()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransportKind {
    /// Spawn `<scpProgram> -t <target>` on this machine.
    #[default]
    Local,
    /// Exec the sink on a remote host over SSH.
    Ssh,
}

/// One file to send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileSpec {
    pub path: PathBuf,
    /// Name announced to the sink. Defaults to the last path component.
    #[serde(default)]
    pub remote_name: Option<String>,
    /// Octal permission string such as `"0600"`.
    #[serde(default)]
    pub mode: Option<String>,
}

impl FileSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            remote_name: None,
            mode: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendConfig {
    #[serde(default)]
    pub transport: TransportKind,
    /// Directory on the sink side that receives the files.
    #[serde(default)]
    pub target: String,
    #[serde(default = "default_scp_program")]
    pub scp_program: String,
    #[serde(default)]
    pub ssh: Option<SshTransportConfig>,
    #[serde(default = "default_mode")]
    pub default_mode: String,
    #[serde(default)]
    pub files: Vec<FileSpec>,
    /// Stop after the first rejected file instead of moving on.
    #[serde(default)]
    pub stop_on_error: bool,
    /// Cap each body at the size announced in its header, so a file that
    /// grows while being read cannot overrun the record.
    #[serde(default = "default_true")]
    pub strict_size: bool,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            target: String::new(),
            scp_program: default_scp_program(),
            ssh: None,
            default_mode: default_mode(),
            files: Vec::new(),
            stop_on_error: false,
            strict_size: default_true(),
        }
    }
}

/// A file after validation, ready to hand to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub local_path: PathBuf,
    pub remote_name: String,
    pub mode: u32,
}

impl SendConfig {
    pub fn from_file(path: &Path) -> ScpResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScpError::invalid_config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
            .map_err(|e| ScpError::invalid_config(format!("{}: {}", path.display(), e.message)))
    }

    pub fn from_json(text: &str) -> ScpResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| ScpError::invalid_config(format!("invalid config: {}", e)))
    }

    pub fn validate(&self) -> ScpResult<()> {
        if self.target.trim().is_empty() {
            return Err(ScpError::invalid_config("target directory is empty"));
        }
        if self.files.is_empty() {
            return Err(ScpError::invalid_config("no files to send"));
        }
        match (self.transport, &self.ssh) {
            (TransportKind::Local, _) => {
                if self.scp_program.trim().is_empty() {
                    return Err(ScpError::invalid_config("scp program is empty"));
                }
            }
            (TransportKind::Ssh, None) => {
                return Err(ScpError::invalid_config(
                    "ssh transport selected without ssh settings",
                ));
            }
            (TransportKind::Ssh, Some(ssh)) => {
                if ssh.host.trim().is_empty() {
                    return Err(ScpError::invalid_config("ssh host is empty"));
                }
                if ssh.username.trim().is_empty() {
                    return Err(ScpError::invalid_config("ssh username is empty"));
                }
                if ssh.port == 0 {
                    return Err(ScpError::invalid_config("ssh port must be non-zero"));
                }
                if ssh.timeout_secs == 0 {
                    return Err(ScpError::invalid_config("ssh timeout must be non-zero"));
                }
            }
        }
        self.plan().map(|_| ())
    }

    /// Resolve remote names and modes for every file, in order.
    pub fn plan(&self) -> ScpResult<Vec<PlannedFile>> {
        let default_mode = parse_mode(&self.default_mode)?;
        self.files
            .iter()
            .map(|file| {
                let remote_name = match file.remote_name {
                    Some(ref name) => name.clone(),
                    None => file
                        .path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(str::to_string)
                        .ok_or_else(|| {
                            ScpError::invalid_config(format!(
                                "cannot derive a remote name from {}",
                                file.path.display()
                            ))
                        })?,
                };
                check_file_name(&remote_name)?;
                let mode = match file.mode {
                    Some(ref m) => parse_mode(m)?,
                    None => default_mode,
                };
                Ok(PlannedFile {
                    local_path: file.path.clone(),
                    remote_name,
                    mode,
                })
            })
            .collect()
    }
}
