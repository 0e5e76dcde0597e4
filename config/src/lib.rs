//! Configuration loading for Mender.
//!
//! The file lives at `~/.mender/config.toml` (override with `MENDER_CONFIG`).
//! Every section is optional; missing keys take the defaults of the types they
//! deserialize into.

use std::env;
use std::path::{Path, PathBuf};

use mender_edit::{EditConfig, MatchConfig};
use mender_tools::{ExecConfig, ScanConfig, SessionSettings, ShellConfig};
use serde::Deserialize;

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV: &str = "MENDER_CONFIG";

const fn default_true() -> bool {
    true
}

const fn default_fuzzy_cutoff() -> f64 {
    0.6
}

const fn default_recommend_threshold() -> f64 {
    0.8
}

const fn default_max_attempts() -> u32 {
    mender_edit::DEFAULT_MAX_ATTEMPTS
}

#[derive(Debug, Default, Deserialize)]
pub struct MenderConfig {
    pub edit: Option<EditSection>,
    pub exec: Option<ExecConfig>,
    pub shell: Option<ShellConfig>,
    pub scan: Option<ScanConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// `[edit]`: matcher and retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EditSection {
    #[serde(default = "default_true")]
    pub fuzzy_search: bool,
    #[serde(default = "default_fuzzy_cutoff")]
    pub fuzzy_cutoff: f64,
    #[serde(default = "default_recommend_threshold")]
    pub recommend_threshold: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for EditSection {
    fn default() -> Self {
        Self {
            fuzzy_search: true,
            fuzzy_cutoff: default_fuzzy_cutoff(),
            recommend_threshold: default_recommend_threshold(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl EditSection {
    #[must_use]
    pub fn to_edit_config(&self) -> EditConfig {
        EditConfig {
            matching: MatchConfig {
                fuzzy: self.fuzzy_search,
                cutoff: self.fuzzy_cutoff.clamp(0.0, 1.0),
                recommend_threshold: self.recommend_threshold.clamp(0.0, 1.0),
            },
            max_attempts: self.max_attempts.max(1),
        }
    }
}

/// Replace `${VAR}` with the variable's value (empty when unset).
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut i = 0;

    while i < value.len() {
        if value[i..].starts_with("${") {
            let start = i + 2;
            if let Some(end_rel) = value[start..].find('}') {
                let end = start + end_rel;
                let var = &value[start..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                i = end + 1;
                continue;
            }
        }

        let Some(ch) = value[i..].chars().next() else {
            break;
        };
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_env_vars(&path.to_string_lossy()))
}

impl MenderConfig {
    /// Load from [`MenderConfig::path`]. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(mut config) => {
                config.expand_paths();
                Ok(Some(config))
            }
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    fn expand_paths(&mut self) {
        if let Some(exec) = &mut self.exec {
            exec.venv = exec.venv.as_deref().map(expand_path);
            exec.scratch_dir = exec.scratch_dir.as_deref().map(expand_path);
        }
        if let Some(shell) = &mut self.shell {
            shell.binary = shell.binary.as_deref().map(expand_env_vars);
        }
    }

    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            edit: self.edit.clone().unwrap_or_default().to_edit_config(),
            exec: self.exec.clone().unwrap_or_default(),
            shell: self.shell.clone().unwrap_or_default(),
            scan: self.scan.clone().unwrap_or_default(),
        }
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".mender").join("config.toml"))
}
