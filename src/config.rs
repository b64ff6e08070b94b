//! Config model and persistence helpers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::capture::CameraCommand;

/// Top-level configuration stored in `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Fleet backend location.
    pub api: ApiCfg,
    /// Where the API token lives.
    pub auth: AuthCfg,
    /// External camera program; empty program means file picker only.
    #[serde(default)]
    pub camera: CameraCommand,
    /// Wizard checkpoint location.
    pub checkpoint: CheckpointCfg,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCfg {
    /// Base URL, e.g. `https://fleet.example.com/api`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Token storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCfg {
    /// JSON file holding one token per backend.
    pub token_file: PathBuf,
}

/// Checkpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointCfg {
    /// JSON file with the in-progress wizard.
    pub path: PathBuf,
    /// Directory camera captures are written to.
    pub capture_dir: PathBuf,
}

impl ApiCfg {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Config {
    /// Load from disk or create defaults when missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let s = fs::read_to_string(path)?;
            Ok(toml::from_str(&s)?)
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    /// Persist the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }

    /// Whether a backend has been configured at all.
    pub fn has_backend(&self) -> bool {
        !self.api.base_url.trim().is_empty()
    }
}

impl Default for Config {
    /// No backend yet; URL and token are entered from the settings screen.
    fn default() -> Self {
        Self {
            api: ApiCfg {
                base_url: "".into(),
                timeout_secs: 30,
            },
            auth: AuthCfg {
                token_file: "token.json".into(),
            },
            camera: CameraCommand::default(),
            checkpoint: CheckpointCfg {
                path: "inspection_checkpoint.json".into(),
                capture_dir: "captures".into(),
            },
        }
    }
}
