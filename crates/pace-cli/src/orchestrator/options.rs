use std::path::{Path, PathBuf};
use std::time::Duration;

use pace_core::config::Config;

/// Fully-resolved settings for one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub project_dir: PathBuf,
    pub max_sessions: Option<u32>,
    pub max_failures: u32,
    pub delay: Duration,
    pub dry_run: bool,
    /// Emit one JSON summary instead of narrative output.
    pub json: bool,
    pub feature_file: String,
    pub progress_file: String,
}

impl RunOptions {
    /// Options taken from `.pace/config.yaml`; command-line flags are applied
    /// on top by the caller.
    pub fn from_config(project_dir: &Path, config: &Config) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            max_sessions: config.max_sessions,
            max_failures: config.max_failures,
            delay: Duration::from_millis(config.delay_ms),
            dry_run: false,
            json: false,
            feature_file: config.feature_file.clone(),
            progress_file: config.progress_file.clone(),
        }
    }

    pub fn feature_path(&self) -> PathBuf {
        self.project_dir.join(&self.feature_file)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.project_dir.join(&self.progress_file)
    }
}
