use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

fn default_bind() -> String {
    "127.0.0.1:4545".to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_max_wait_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directories scanned for `<session-id>.jsonl` transcripts.
    #[serde(default)]
    pub transcript_roots: Vec<PathBuf>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            transcript_roots: Vec::new(),
            debounce_ms: default_debounce_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file; a missing file yields the defaults so a fresh
    /// install runs without any configuration.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ServerConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Configured roots, falling back to the default agent log location
    /// under the home directory when none are set.
    pub fn effective_roots(&self) -> Vec<PathBuf> {
        if !self.transcript_roots.is_empty() {
            return self.transcript_roots.clone();
        }

        if let Some(home) = std::env::var_os("HOME") {
            let default_root = PathBuf::from(home).join(".claude").join("projects");
            if default_root.exists() {
                return vec![default_root];
            }
        }

        Vec::new()
    }
}
