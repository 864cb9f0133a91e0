//! `load_config` module: Loads the tenant configuration file, bootstrapping a blank template when it is missing.
//!
//! This module is the only place where the user-supplied configuration is parsed and
//! mapped to the explicit values threaded through the core.
//!
//! # Responsibilities
//! - Read `answersUploadConf.json` (or the file given with `--config`), as JSON or YAML by extension
//! - Write a blank template and report [`ConfigState::TemplateWritten`] when no file exists
//! - Apply environment overrides for secrets (`KB_SYNC_URL`, `KB_SYNC_API_KEY`, `KB_SYNC_KB_NAME`)
//! - Validate required fields so the CLI fails with a clear message before any request is sent
//!
//! # Errors
//! All errors in this module use `anyhow::Error` for context-rich diagnostics, and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use kb_sync_core::config::{SyncConfig, DEFAULT_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "answersUploadConf.json";

pub const ENV_URL: &str = "KB_SYNC_URL";
pub const ENV_API_KEY: &str = "KB_SYNC_API_KEY";
pub const ENV_KB_NAME: &str = "KB_SYNC_KB_NAME";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub kb_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

impl CliConfig {
    /// Fail on blank required fields or a zero concurrency.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("url", &self.url),
            ("apiKey", &self.api_key),
            ("kbName", &self.kb_name),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();
        if !missing.is_empty() {
            error!(?missing, "Required configuration values are empty");
            anyhow::bail!("Missing required configuration values: {}", missing.join(", "));
        }
        if self.concurrency == Some(0) {
            anyhow::bail!("concurrency must be at least 1");
        }
        Ok(())
    }

    /// The explicit core configuration. CLI flags win over file values.
    pub fn sync_config(&self, folder: Option<PathBuf>, concurrency: Option<usize>) -> SyncConfig {
        SyncConfig {
            folder: folder
                .or_else(|| self.folder.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            kb_name: self.kb_name.clone(),
            concurrency: concurrency
                .or(self.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY)
                .max(1),
        }
    }

    fn apply_env_overrides(&mut self) {
        for (var, field) in [
            (ENV_URL, &mut self.url),
            (ENV_API_KEY, &mut self.api_key),
            (ENV_KB_NAME, &mut self.kb_name),
        ] {
            if let Some(value) = std::env::var(var).ok().filter(|v| !v.trim().is_empty()) {
                info!(var, "Configuration value overridden from environment");
                *field = value;
            }
        }
    }
}

/// Outcome of looking for the configuration file.
#[derive(Debug)]
pub enum ConfigState {
    Loaded(CliConfig),
    /// No file existed; a blank template was written here and no work should be done.
    TemplateWritten(PathBuf),
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Loads the configuration file, or writes a blank template if it does not exist.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ConfigState> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    if !path_ref.exists() {
        warn!(config_path = ?path_ref, "No configuration file exists, writing empty template");
        write_template(path_ref)?;
        return Ok(ConfigState::TemplateWritten(path_ref.to_path_buf()));
    }

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let parsed = if is_yaml(path_ref) {
        serde_yaml::from_str::<CliConfig>(&config_content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))
    } else {
        serde_json::from_str::<CliConfig>(&config_content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config JSON: {e}"))
    };
    let mut config = match parsed {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config successfully");
            conf
        }
        Err(e) => {
            error!(error = %e, config_path = ?path_ref, "Failed to parse config file");
            return Err(e);
        }
    };

    config.apply_env_overrides();
    Ok(ConfigState::Loaded(config))
}

fn write_template(path: &Path) -> Result<()> {
    let template = CliConfig::default();
    let content = if is_yaml(path) {
        serde_yaml::to_string(&template).context("Failed to render config template")?
    } else {
        serde_json::to_string_pretty(&template).context("Failed to render config template")?
    };
    fs::write(path, content)
        .with_context(|| format!("Failed to write config template {}", path.display()))
}
