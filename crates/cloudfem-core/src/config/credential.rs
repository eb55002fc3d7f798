//! Credential persistence.
//!
//! The compute service token is kept as plain text in the host's per-user
//! data directory. On reload only a 64 character lowercase hex value is
//! accepted; anything else is ignored as if no token had been saved.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex_lite::Regex;
use thiserror::Error;
use tracing::{debug, warn};

/// File name of the stored token inside the user data directory.
pub const CREDENTIAL_FILE: &str = "qarnot.txt";

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-f0-9]{64}$").expect("token pattern is valid"));

/// Longest first line read from the token file.
const MAX_LINE_LEN: usize = 1000;

/// An API token for the compute service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Does the token look like one the service hands out?
    pub fn is_well_formed(&self) -> bool {
        TOKEN_PATTERN.is_match(&self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no per-user data directory available")]
    NoDataDir,

    #[error("credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Reads and writes the token file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store [`CREDENTIAL_FILE`] inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CREDENTIAL_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved token.
    ///
    /// Missing file and malformed content both yield `Ok(None)`.
    pub fn load(&self) -> Result<Option<Credential>, CredentialError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no saved credential");
                return Ok(None);
            }
            Err(source) => {
                return Err(CredentialError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let line: String = content
            .lines()
            .next()
            .unwrap_or_default()
            .chars()
            .take(MAX_LINE_LEN)
            .collect();
        let credential = Credential::new(line);
        if credential.is_well_formed() {
            Ok(Some(credential))
        } else {
            warn!(path = %self.path.display(), "ignoring malformed saved credential");
            Ok(None)
        }
    }

    pub fn save(&self, credential: &Credential) -> Result<(), CredentialError> {
        let io_err = |source| CredentialError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&self.path, credential.as_str()).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[rstest]
    #[case::valid(TOKEN.to_string(), true)]
    #[case::uppercase(TOKEN.to_uppercase(), false)]
    #[case::too_short(TOKEN[..63].to_string(), false)]
    #[case::too_long(format!("{TOKEN}0"), false)]
    #[case::not_hex(TOKEN.replace('a', "g"), false)]
    fn token_format(#[case] token: String, #[case] valid: bool) {
        assert_eq!(Credential::new(token).is_well_formed(), valid);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(&dir.path().join("nested"));

        store.save(&Credential::new(TOKEN)).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.as_str(), TOKEN);
    }

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn malformed_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        fs::write(store.path(), "not-a-token").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn only_first_line_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        fs::write(store.path(), format!("{TOKEN}\nsomething else")).unwrap();
        assert_eq!(store.load().unwrap().unwrap().as_str(), TOKEN);
    }

    #[test]
    fn debug_does_not_leak_token() {
        let shown = format!("{:?}", Credential::new(TOKEN));
        assert!(!shown.contains(TOKEN));
    }
}
