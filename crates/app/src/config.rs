use anyhow::{Context, Result};
use directories::ProjectDirs;
use duplexmic_core::constants::GUARD_FRAMES;
use duplexmic_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user preferences. Command line flags override these per run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
    /// Capture device: "default", an index from `list`, or a name
    #[serde(default = "default_device")]
    pub input: String,
    #[serde(default = "default_device")]
    pub output: String,
    #[serde(default = "default_suppression_enabled")]
    pub suppression_enabled: bool,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default = "default_guard_frames")]
    pub guard_frames: usize,
}

fn default_device() -> String {
    "default".to_string()
}

fn default_suppression_enabled() -> bool {
    true
}

fn default_guard_frames() -> usize {
    GUARD_FRAMES
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: default_device(),
            output: default_device(),
            suppression_enabled: default_suppression_enabled(),
            engine: EngineConfig::default(),
            guard_frames: default_guard_frames(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from disk, or returns default if not found.
    pub fn load() -> Self {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                log::warn!("Ignoring config at {}: {:#}", path.display(), e);
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Saves configuration to disk in JSON format.
    pub fn save(&self) -> Result<PathBuf> {
        let path = config_path().context("Could not determine config directory")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "duplexmic", "duplexmic")
        .map(|dirs| dirs.config_dir().join("config.json"))
}
