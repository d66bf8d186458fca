use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::overlay::OverlayTiming;
use crate::LayoutMode;

pub const CONFIG_FILE_NAME: &str = "config.toml";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("net", "zenpdf", "zenpdf")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Layout used for documents opened for the first time.
    pub default_layout: LayoutMode,
    /// Overrides the platform data directory for navigation state.
    pub state_dir: Option<PathBuf>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub hud: OverlayTiming,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_layout: LayoutMode::SinglePage,
            state_dir: None,
            log_filter: "info".to_owned(),
            hud: OverlayTiming::default(),
        }
    }
}

impl ViewerConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse config file {:?}", path))
    }

    pub fn load_from_project_dirs(dirs: &ProjectDirs) -> Result<Self> {
        Self::load(&dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn state_dir(&self, dirs: &ProjectDirs) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| dirs.data_local_dir().join("state"))
    }
}
