use crate::error::{PaceError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// AgentConfig
// ---------------------------------------------------------------------------

/// How to launch the coding agent for each session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_agent_command")]
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

fn default_agent_command() -> String {
    "claude".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            model: None,
            max_turns: None,
            permission_mode: None,
            allowed_tools: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ArchiveConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    30
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<u32>,
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_feature_file")]
    pub feature_file: String,
    #[serde(default = "default_progress_file")]
    pub progress_file: String,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

fn default_max_failures() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    5000
}

fn default_feature_file() -> String {
    paths::FEATURE_FILE.to_string()
}

fn default_progress_file() -> String {
    paths::PROGRESS_FILE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_sessions: None,
            max_failures: default_max_failures(),
            delay_ms: default_delay_ms(),
            feature_file: default_feature_file(),
            progress_file: default_progress_file(),
            agent: AgentConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl Config {
    /// Load `.pace/config.yaml`; a missing file yields defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        cfg.check_file_names()?;
        Ok(cfg)
    }

    pub fn feature_path(&self, root: &Path) -> PathBuf {
        root.join(&self.feature_file)
    }

    pub fn progress_path(&self, root: &Path) -> PathBuf {
        root.join(&self.progress_file)
    }

    fn check_file_names(&self) -> Result<()> {
        for (key, name) in [
            ("feature_file", &self.feature_file),
            ("progress_file", &self.progress_file),
        ] {
            if paths::validate_file_name(name).is_err() {
                return Err(PaceError::InvalidConfig(format!(
                    "{key} must be a plain file name inside the project root, got '{name}'"
                )));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.max_failures == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "max_failures is 0; the circuit breaker would stop before any session"
                    .to_string(),
            });
        }

        if self.max_sessions == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "max_sessions is 0; runs will stop without dispatching".to_string(),
            });
        }

        if self.delay_ms > 600_000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "delay_ms={} (more than 10 minutes between sessions is unusual)",
                    self.delay_ms
                ),
            });
        }

        if self.agent.command.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "agent.command is empty".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
