use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::DetailLevel;

pub const DEFAULT_PATH: &str = "settings.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub verify: VerifyConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Upper bound on messages per listing call.
    pub page_size: u32,
    /// Detail level fetched for every message of a freshly listed page.
    pub list_level: DetailLevel,
    /// Remote user ID; "me" is the authenticated user.
    pub user: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            list_level: DetailLevel::Metadata,
            user: "me".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub program: String,
    /// Prepended to every invocation, e.g. `["--homedir", "/path"]`.
    pub extra_args: Vec<String>,
    pub keyserver: Option<String>,
    pub allow_key_download: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            program: "gpg".to_string(),
            extra_args: Vec::new(),
            keyserver: None,
            allow_key_download: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client secret, as downloaded from the API console.
    pub credentials: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials: PathBuf::from("credentials.json"),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file means defaults; a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&content).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.fetch.list_level, DetailLevel::Metadata);
        assert_eq!(config.verify.program, "gpg");
        assert!(config.verify.allow_key_download);
    }

    #[test]
    fn partial_file_overrides_only_what_it_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[fetch]
page_size = 25
list_level = "minimal"

[verify]
extra_args = ["--homedir", "/tmp/keys"]
keyserver = "hkps://keys.openpgp.org"
"#
        )
        .unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.fetch.page_size, 25);
        assert_eq!(config.fetch.list_level, DetailLevel::Minimal);
        assert_eq!(config.fetch.user, "me");
        assert_eq!(config.verify.extra_args, vec!["--homedir", "/tmp/keys"]);
        assert_eq!(config.verify.keyserver.as_deref(), Some("hkps://keys.openpgp.org"));
        assert_eq!(config.auth.credentials, PathBuf::from("credentials.json"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[fetch\npage_size = ").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(Error::Config { .. })
        ));
    }
}
