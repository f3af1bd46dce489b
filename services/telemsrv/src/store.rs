//! Persisted Wi-Fi credentials
//!
//! One small JSON file. An absent or unreadable file is the same thing as
//! "never provisioned": the caller gets `None` and the agent enters the
//! provisioning path.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::connectivity::Credentials;
use crate::error::{AgentError, Result};

/// File-backed credential store
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted credentials
    ///
    /// Returns `None` when the file is absent, unreadable, corrupt, or
    /// holds an empty ssid — all treated as "unconfigured".
    pub fn load(&self) -> Option<Credentials> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No credential store at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!(
                    "Credential store {} unreadable ({}), treating as unconfigured",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        match serde_json::from_str::<Credentials>(&raw) {
            Ok(credentials) if !credentials.ssid.is_empty() => Some(credentials),
            Ok(_) => {
                info!("Credential store holds an empty ssid, treating as unconfigured");
                None
            }
            Err(e) => {
                warn!(
                    "Credential store {} corrupt ({}), treating as unconfigured",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Persist credentials atomically (write-then-rename)
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        let serialized = serde_json::to_string_pretty(credentials)
            .map_err(|e| AgentError::StoreError(format!("Failed to serialize credentials: {e}")))?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, serialized).map_err(|e| {
            AgentError::StoreError(format!("Failed to write {}: {e}", tmp_path.display()))
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            AgentError::StoreError(format!("Failed to commit {}: {e}", self.path.display()))
        })?;

        info!("Persisted credentials for ssid {}", credentials.ssid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("credentials.json"))
    }

    #[test]
    fn test_absent_file_is_unconfigured() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(store_in(&dir).load().is_none());
    }

    #[test]
    fn test_corrupt_file_is_unconfigured() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir);
        fs::write(store.path(), "not json {{").expect("write corrupt file");
        assert!(store.load().is_none());
    }

    #[test]
    fn test_empty_ssid_is_unconfigured() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir);
        fs::write(store.path(), r#"{"ssid": "", "password": "x"}"#).expect("write file");
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir);
        let credentials = Credentials {
            ssid: "lab-network".to_string(),
            password: "hunter2".to_string(),
        };

        store.save(&credentials).expect("save should succeed");
        let loaded = store.load().expect("credentials should load");
        assert_eq!(loaded.ssid, "lab-network");
        assert_eq!(loaded.password, "hunter2");
    }

    #[test]
    fn test_save_overwrites_previous(){
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir);
        for ssid in ["first", "second"] {
            store
                .save(&Credentials {
                    ssid: ssid.to_string(),
                    password: "pw".to_string(),
                })
                .expect("save should succeed");
        }
        assert_eq!(store.load().expect("loads").ssid, "second");
    }
}
