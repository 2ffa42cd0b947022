use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the fetch-and-cache engine.
///
/// Verification outcomes are not errors; see [`crate::verify::Verification`].
#[derive(Debug, Error)]
pub enum Error {
    /// A remote call failed (network, auth, or an API-level rejection).
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// A message body was not valid transport-safe base64.
    #[error("Content error: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Setting up the authenticated transport or initial state failed.
    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Invalid config '{path}': {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn transport(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::Transport {
            context: context.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
