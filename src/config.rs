/*
 *  Copyright 2025 SmartBundle Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Source Configuration
//!
//! TOML file mapping each source key to its schedule and options,
//! loaded once at scheduler start. Discovery order: explicit path,
//! `SOURCES_CONFIG` environment variable, then the search paths
//! (working directory, user config directory, `/etc/smartbundle`).
//! `${VAR}`, `${VAR:-default}`, and `${VAR:?error}` expressions in the
//! file body are expanded from the environment before parsing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Scheduling entry for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Cron expression driving this source's trigger.
    #[serde(default)]
    pub schedule: Option<String>,
    /// IANA timezone name the cron expression is evaluated in. UTC when
    /// absent.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Inactive sources are skipped without a warning.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Free-form options forwarded on every job for this source.
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

fn default_active() -> bool {
    true
}

/// Top-level file shape: `[sources.<key>]` tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        let mut search_paths = vec![
            PathBuf::from("./sources.toml"),
            PathBuf::from("./config/sources.toml"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("smartbundle").join("sources.toml"));
        }

        search_paths.push(PathBuf::from("/etc/smartbundle/sources.toml"));

        Self { search_paths }
    }

    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Loads from an explicit path, the `SOURCES_CONFIG` environment
    /// variable, or the first existing search path, in that order.
    pub fn load(&self, config_file: Option<&Path>) -> Result<SourcesConfig, ConfigError> {
        let config_path = if let Some(path) = config_file {
            path.to_path_buf()
        } else if let Ok(env_config) = env::var("SOURCES_CONFIG") {
            PathBuf::from(env_config)
        } else {
            self.find_config_file().ok_or(ConfigError::NotFound)?
        };

        self.load_from_file(&config_path)
    }

    pub fn load_from_file(&self, path: &Path) -> Result<SourcesConfig, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let substituted = substitute_env_vars(&content)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") | None => Ok(toml::from_str::<SourcesConfig>(&substituted)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat {
                extension: ext.to_string(),
            }),
        }
    }

    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .find(|path| path.is_file())
            .cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Expands `${VAR}`-style expressions against the process environment.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::EnvVar(e.to_string()))?;
    let mut result = content.to_string();

    for cap in re.captures_iter(content) {
        let full_match = &cap[0];
        let replacement = process_var_expression(&cap[1])?;
        result = result.replace(full_match, &replacement);
    }

    Ok(result)
}

fn process_var_expression(expr: &str) -> Result<String, ConfigError> {
    if let Some(default_pos) = expr.find(":-") {
        let var_name = &expr[..default_pos];
        let default_value = &expr[default_pos + 2..];
        Ok(env::var(var_name).unwrap_or_else(|_| default_value.to_string()))
    } else if let Some(error_pos) = expr.find(":?") {
        let var_name = &expr[..error_pos];
        let error_msg = &expr[error_pos + 2..];
        env::var(var_name).map_err(|_| {
            ConfigError::EnvVar(format!(
                "Required environment variable '{}' is not set: {}",
                var_name, error_msg
            ))
        })
    } else {
        env::var(expr).map_err(|_| {
            ConfigError::EnvVar(format!(
                "Required environment variable '{}' is not set",
                expr
            ))
        })
    }
}
