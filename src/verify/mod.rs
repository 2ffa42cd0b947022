pub mod grammar;

use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::VerifyConfig;

/// Outcome of a signature check. A bad signature is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Succeeded { key_id: Option<String> },
    SucceededUntrustedKey { key_id: Option<String> },
    SignatureBad { key_id: Option<String> },
    KeyNotFound { key_id: Option<String> },
    ExecutionFailed { reason: String },
    UnknownError {
        key_id: Option<String>,
        error: Option<String>,
    },
}

impl Verification {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Verification::Succeeded { .. } | Verification::SucceededUntrustedKey { .. }
        )
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verification::Succeeded { .. } => write!(f, "Verify succeeded"),
            Verification::SucceededUntrustedKey { .. } => {
                write!(f, "Verify succeeded, but with untrusted key")
            }
            Verification::SignatureBad { .. } => write!(f, "Signature found, but BAD"),
            Verification::KeyNotFound { key_id } => write!(
                f,
                "Public key not found. Key ID: {}",
                key_id.as_deref().unwrap_or("Unknown")
            ),
            Verification::ExecutionFailed { reason } => {
                write!(f, "Verify failed to execute: {reason}")
            }
            Verification::UnknownError { key_id, error } => write!(
                f,
                "Unable to verify anything. Key ID: {}. Error: {}",
                key_id.as_deref().unwrap_or("Unknown"),
                error.as_deref().unwrap_or("Unknown")
            ),
        }
    }
}

/// How the verifier process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    Code(i32),
    /// Killed by a signal (unix only).
    Signal(i32),
    Unknown,
}

impl From<ExitStatus> for Exit {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            return Exit::Success;
        }
        if let Some(code) = status.code() {
            return Exit::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Exit::Signal(signal);
            }
        }
        Exit::Unknown
    }
}

/// Captured stderr and exit of one verifier run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub stderr: String,
    pub exit: Exit,
}

/// The external program doing the cryptography.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Check the signature in `body`, fed on stdin.
    async fn check(&self, body: &[u8]) -> io::Result<Diagnostics>;

    /// Fetch a public key into the local keyring.
    async fn receive_key(&self, key_id: &str) -> io::Result<Diagnostics>;
}

/// gpg, run in batch mode.
#[derive(Debug, Clone)]
pub struct Gpg {
    program: String,
    extra_args: Vec<String>,
    keyserver: Option<String>,
}

impl Gpg {
    pub fn new(config: &VerifyConfig) -> Self {
        Self {
            program: config.program.clone(),
            extra_args: config.extra_args.clone(),
            keyserver: config.keyserver.clone(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.extra_args).kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Backend for Gpg {
    async fn check(&self, body: &[u8]) -> io::Result<Diagnostics> {
        let mut child = self
            .command()
            .args(["-v", "--batch", "--no-tty"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "verifier stdin unavailable"))?;
        let body = body.to_vec();
        // Feed stdin while stderr drains, or a chatty verifier can deadlock us.
        let writer = tokio::spawn(async move {
            stdin.write_all(&body).await?;
            stdin.shutdown().await
        });

        let output = child.wait_with_output().await?;
        if let Ok(Err(e)) = writer.await {
            // The verifier may exit before reading everything.
            debug!(error = %e, "verifier closed stdin early");
        }

        Ok(Diagnostics {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit: output.status.into(),
        })
    }

    async fn receive_key(&self, key_id: &str) -> io::Result<Diagnostics> {
        let mut cmd = self.command();
        cmd.args(["--batch", "--no-tty"]);
        if let Some(keyserver) = &self.keyserver {
            cmd.args(["--keyserver", keyserver.as_str()]);
        }
        let output = cmd
            .args(["--recv-keys", key_id])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(Diagnostics {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit: output.status.into(),
        })
    }
}

/// Drives a [`Backend`] and classifies what it says.
pub struct Verifier {
    backend: Box<dyn Backend>,
}

impl Verifier {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn gpg(config: &VerifyConfig) -> Self {
        Self::new(Gpg::new(config))
    }

    /// Verify a message body.
    ///
    /// If the signing key is missing and `allow_key_download` is set, the key
    /// is fetched once and the check re-run once with downloading disabled.
    /// A failed download is not retried.
    pub async fn verify(&self, body: &[u8], allow_key_download: bool) -> Verification {
        let mut allow_download = allow_key_download;
        loop {
            let diagnostics = match self.backend.check(body).await {
                Ok(d) => d,
                Err(e) => {
                    return Verification::ExecutionFailed {
                        reason: e.to_string(),
                    };
                }
            };
            let report = grammar::parse(&diagnostics.stderr);
            debug!(?report, exit = ?diagnostics.exit, "verifier finished");

            if allow_download && report.missing_key() {
                if let Some(key_id) = &report.key_id {
                    self.download_key(key_id).await;
                    allow_download = false;
                    continue;
                }
            }
            return grammar::classify(&report, diagnostics.exit);
        }
    }

    async fn download_key(&self, key_id: &str) {
        info!(key_id, "downloading missing public key");
        match self.backend.receive_key(key_id).await {
            Ok(d) if d.exit == Exit::Success => {}
            Ok(d) => warn!(key_id, exit = ?d.exit, stderr = %d.stderr.trim(), "failed to download key"),
            Err(e) => warn!(key_id, error = %e, "failed to download key"),
        }
    }
}
