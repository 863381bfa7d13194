use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_step_timeout_secs() -> u64 {
    60
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("gems-staging")
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// API base, e.g. `https://api.example.com`. Trailing slashes are ignored.
    pub base_url: String,
    /// Where `content://` images are copied before upload.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Mount point for `content://<authority>/<path>` references.
    #[serde(default)]
    pub content_root: Option<PathBuf>,
    /// Per-step bound on staging, each upload and the persist call. 0 disables.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            staging_dir: default_staging_dir(),
            content_root: None,
            step_timeout_secs: default_step_timeout_secs(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: PipelineConfig = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        (self.step_timeout_secs > 0).then(|| Duration::from_secs(self.step_timeout_secs))
    }
}
