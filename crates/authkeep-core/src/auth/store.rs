use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// Key the credential is stored under
pub const TOKEN_KEY: &str = "token";

/// Credential file name in the data directory
const CREDENTIAL_FILE: &str = "credential.json";

/// Durable single-slot storage for the bearer credential.
///
/// Calls are synchronous and must survive process restarts (except for
/// `MemoryTokenStore`, which exists for embedding and tests).
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Result<Option<String>>;
    fn set(&self, token: &str) -> Result<()>;
    fn remove(&self) -> Result<()>;
}

// ============================================================================
// File store
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub token: String,
    pub stored_at: DateTime<Utc>,
}

impl StoredCredential {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            stored_at: Utc::now(),
        }
    }

    /// Get minutes since the credential was stored (for display)
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.stored_at).num_minutes().max(0)
    }
}

/// Stores the credential as JSON in the data directory
pub struct FileTokenStore {
    data_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Load the full record, including when it was stored
    pub fn load(&self) -> Result<Option<StoredCredential>> {
        let path = self.credential_path();
        if !path.exists() {
            return Ok(None);
        }

        let contents =
            std::fs::read_to_string(&path).context("Failed to read credential file")?;
        let stored: StoredCredential =
            serde_json::from_str(&contents).context("Failed to parse credential file")?;
        Ok(Some(stored))
    }

    fn credential_path(&self) -> PathBuf {
        self.data_dir.join(CREDENTIAL_FILE)
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Result<Option<String>> {
        Ok(self.load()?.map(|c| c.token))
    }

    /// Written to a temporary file and renamed into place, so a crash never
    /// leaves a half-written credential. The file is readable by its owner only.
    fn set(&self, token: &str) -> Result<()> {
        let path = self.credential_path();
        std::fs::create_dir_all(&self.data_dir).context("Failed to create data directory")?;

        let mut file = NamedTempFile::new_in(&self.data_dir)
            .context("Failed to create temporary credential file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .context("Failed to restrict credential file permissions")?;
        }

        let contents = serde_json::to_string_pretty(&StoredCredential::new(token))?;
        file.write_all(contents.as_bytes())
            .context("Failed to write credential file")?;
        file.as_file().sync_all().context("Failed to flush credential file")?;
        file.persist(&path).context("Failed to move credential file into place")?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        let path = self.credential_path();
        if path.exists() {
            std::fs::remove_file(&path).context("Failed to delete credential file")?;
        }
        Ok(())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            slot: Mutex::new(Some(token.to_string())),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>> {
        self.slot
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Option<String>> {
        Ok(self.lock()?.clone())
    }

    fn set(&self, token: &str) -> Result<()> {
        *self.lock()? = Some(token.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}
