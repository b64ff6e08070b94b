//! API token persistence, one token per backend (tenant).

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, io::ErrorKind, path::PathBuf};
use tokio::{
    fs,
    io::{AsyncWriteExt, BufWriter},
};

/// A token as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    token: String,
    saved_at: DateTime<Utc>,
}

/// Stores API tokens in a local JSON file (token.json).
#[derive(Clone)]
pub struct FileTokenStore {
    /// Location of the token file on disk.
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a new store backed by the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Stable hash of the backend base URL (case and trailing slash insensitive).
    fn backend_key(base_url: &str) -> String {
        let normalized = base_url.trim().trim_end_matches('/').to_ascii_lowercase();
        let hash = Sha256::digest(normalized.as_bytes());
        format!("api_token:{}", URL_SAFE_NO_PAD.encode(hash))
    }

    /// Load the entire token map from disk.
    async fn load_map(&self) -> Result<HashMap<String, StoredToken>> {
        match fs::read(&self.path).await {
            Ok(data) => {
                if data.is_empty() {
                    return Ok(HashMap::new());
                }
                serde_json::from_slice(&data)
                    .with_context(|| format!("corrupt token file {}", self.path.display()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the token map to disk, creating directories if needed.
    async fn save_map(&self, map: &HashMap<String, StoredToken>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(map)?;
        let file = fs::File::create(&self.path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Store or replace the token for a backend.
    pub async fn set(&self, base_url: &str, token: &str) -> Result<()> {
        let mut map = self.load_map().await?;
        map.insert(
            Self::backend_key(base_url),
            StoredToken {
                token: token.trim().to_string(),
                saved_at: Utc::now(),
            },
        );
        self.save_map(&map).await?;
        tracing::info!("token saved to {}", self.path.display());
        Ok(())
    }

    /// Retrieve the token for a backend, if present and non-empty.
    pub async fn get(&self, base_url: &str) -> Result<Option<String>> {
        let mut map = self.load_map().await?;
        Ok(map
            .remove(&Self::backend_key(base_url))
            .map(|t| t.token)
            .filter(|t| !t.is_empty()))
    }

    /// Forget the token for a backend.
    pub async fn remove(&self, base_url: &str) -> Result<()> {
        let mut map = self.load_map().await?;
        if map.remove(&Self::backend_key(base_url)).is_some() {
            self.save_map(&map).await?;
        }
        Ok(())
    }
}
