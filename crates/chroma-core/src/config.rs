//! Configuration system for chroma.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CHROMA_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/chroma/config.toml
//!   3. ~/.config/chroma/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::wire::{
    FrameLimits, DEFAULT_CHUNK_SIZE, DEFAULT_PORT, FRAME_TIMEOUT_SECS, PAYLOAD_TIMEOUT_SECS,
};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaConfig {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
    pub port: u16,
    /// Pending-connection queue length passed to listen(2).
    pub backlog: i32,
    /// Bound on each header field read and each payload chunk read.
    pub frame_timeout_secs: u64,
    /// Bound on the whole payload step, however slowly the peer sends.
    pub payload_timeout_secs: u64,
    /// Payload bytes moved per read.
    pub chunk_size: usize,
}

/// Filesystem areas shared by all sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where uploads land before processing.
    pub incoming_dir: PathBuf,
    pub red_dir: PathBuf,
    pub green_dir: PathBuf,
    pub blue_dir: PathBuf,
    pub equalized_dir: PathBuf,
    /// Append-only audit log, one line per session.
    pub audit_log: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            backlog: 5,
            frame_timeout_secs: FRAME_TIMEOUT_SECS,
            payload_timeout_secs: PAYLOAD_TIMEOUT_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::under(&data_dir())
    }
}

impl NetworkConfig {
    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            chunk_size: self.chunk_size.max(1),
            read_timeout: Duration::from_secs(self.frame_timeout_secs.max(1)),
            payload_timeout: Duration::from_secs(self.payload_timeout_secs.max(1)),
        }
    }
}

impl StorageConfig {
    /// Standard layout rooted at `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            incoming_dir: root.join("incoming"),
            red_dir: root.join("red"),
            green_dir: root.join("green"),
            blue_dir: root.join("blue"),
            equalized_dir: root.join("equalized"),
            audit_log: root.join("chromad.log"),
        }
    }

    /// Create every directory the sessions write into.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        let audit_parent = self.audit_log.parent().map(Path::to_path_buf);
        let dirs = [
            Some(self.incoming_dir.clone()),
            Some(self.red_dir.clone()),
            Some(self.green_dir.clone()),
            Some(self.blue_dir.clone()),
            Some(self.equalized_dir.clone()),
            audit_parent,
        ];
        for dir in dirs.into_iter().flatten() {
            if dir.as_os_str().is_empty() {
                continue;
            }
            std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDirFailed(dir, e))?;
        }
        Ok(())
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("chroma")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("chroma")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("failed to create directory {0}: {1}")]
    CreateDirFailed(PathBuf, std::io::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ChromaConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&Self::file_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse `path`, or fall back to defaults when it does not exist.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(ChromaConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CHROMA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&ChromaConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply CHROMA_* overrides. `lookup` resolves a variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CHROMA_NETWORK__BIND_ADDR") {
            self.network.bind_addr = v;
        }
        if let Some(v) = lookup("CHROMA_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Some(v) = lookup("CHROMA_NETWORK__FRAME_TIMEOUT_SECS") {
            if let Ok(s) = v.parse() {
                self.network.frame_timeout_secs = s;
            }
        }
        if let Some(v) = lookup("CHROMA_NETWORK__PAYLOAD_TIMEOUT_SECS") {
            if let Ok(s) = v.parse() {
                self.network.payload_timeout_secs = s;
            }
        }
        // Re-roots every storage path, audit log included.
        if let Some(v) = lookup("CHROMA_STORAGE__ROOT") {
            self.storage = StorageConfig::under(Path::new(&v));
        }
        if let Some(v) = lookup("CHROMA_STORAGE__AUDIT_LOG") {
            self.storage.audit_log = PathBuf::from(v);
        }
    }
}
