// Copyright 2024 The gitcore Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed accessors over the `core.*`/`i18n.*` configuration surface. Layers
//! stack by precedence (environment overrides highest, then repo, then
//! user, then built-in defaults); each layer is just a flat key/value map,
//! so a richer format can sit in front of this without touching the
//! accessors below.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

/// Precedence order, highest first, matching how a layered config resolves
/// a key: an environment override always wins, followed by repo-local
/// `config`, the user's global config, then built-in defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    Default,
    User,
    Repo,
    Env,
}

#[derive(Clone, Debug, Default)]
struct ConfigLayer {
    entries: HashMap<String, String>,
}

/// A stack of flat key/value layers, queried highest-precedence-first.
#[derive(Clone, Debug, Default)]
pub struct StackedConfig {
    layers: Vec<(ConfigSource, ConfigLayer)>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGetError {
    #[error("{key} is not a valid boolean: {value:?}")]
    NotABool { key: String, value: String },
    #[error("{key} is not a valid integer: {value:?}")]
    NotAnInt { key: String, value: String },
    #[error("{key} has unrecognized value {value:?}")]
    UnrecognizedValue { key: String, value: String },
}

impl StackedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key = value` in the named layer, creating the
    /// layer if this is its first entry.
    pub fn set(&mut self, source: ConfigSource, key: impl Into<String>, value: impl Into<String>) {
        if let Some((_, layer)) = self.layers.iter_mut().find(|(s, _)| *s == source) {
            layer.entries.insert(key.into(), value.into());
        } else {
            let mut layer = ConfigLayer::default();
            layer.entries.insert(key.into(), value.into());
            self.layers.push((source, layer));
            self.layers.sort_by_key(|(s, _)| *s);
        }
    }

    /// Loads every environment variable in `GITCORE_CONFIG_<SECTION>_<KEY>`
    /// form (uppercased, dots replaced by underscores) into the `Env` layer.
    pub fn load_env(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (name, value) in vars {
            if let Some(rest) = name.strip_prefix("GITCORE_CONFIG_") {
                let key = rest.to_lowercase().replacen('_', ".", 1);
                self.set(ConfigSource::Env, key, value);
            }
        }
    }

    /// Merges a minimal INI-style `config` file (`[section]`,
    /// `[section "sub"]`, `key = value`) into `source`. The general grammar
    /// lives outside this core; this only covers what `core.*`/`i18n.*`
    /// lookups need.
    pub fn load_ini(&mut self, source: ConfigSource, text: &str) {
        let mut section = String::new();
        for raw_line in text.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                section = match header.split_once(' ') {
                    Some((name, sub)) => {
                        let sub = sub.trim().trim_matches('"');
                        format!("{name}.{sub}")
                    }
                    None => header.to_owned(),
                };
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let full_key = format!("{}.{}", section, key.trim());
                self.set(source, full_key, value.trim().to_owned());
            }
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.layers
            .iter()
            .rev()
            .find_map(|(_, layer)| layer.entries.get(key))
            .map(String::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigGetError> {
        match self.get_str(key) {
            None => Ok(None),
            Some("true") | Some("yes") | Some("on") | Some("1") => Ok(Some(true)),
            Some("false") | Some("no") | Some("off") | Some("0") => Ok(Some(false)),
            Some(value) => Err(ConfigGetError::NotABool {
                key: key.to_owned(),
                value: value.to_owned(),
            }),
        }
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>, ConfigGetError> {
        match self.get_str(key) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| ConfigGetError::NotAnInt {
                    key: key.to_owned(),
                    value: value.to_owned(),
                }),
        }
    }
}

/// `core.autocrlf` policy. The conversion algorithm is out of scope; the
/// core only reads and passes through the chosen value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoCrLf {
    False,
    True,
    Input,
}

impl StackedConfig {
    /// `core.repositoryformatversion`, defaulting to `0`.
    pub fn core_repository_format_version(&self) -> Result<u32, ConfigGetError> {
        Ok(self.get_u32("core.repositoryformatversion")?.unwrap_or(0))
    }

    /// `core.bare`, defaulting to `false`.
    pub fn core_bare(&self) -> Result<bool, ConfigGetError> {
        Ok(self.get_bool("core.bare")?.unwrap_or(false))
    }

    pub fn core_excludesfile(&self) -> Option<PathBuf> {
        self.get_str("core.excludesfile").map(PathBuf::from)
    }

    pub fn core_autocrlf(&self) -> Result<AutoCrLf, ConfigGetError> {
        match self.get_str("core.autocrlf") {
            None => Ok(AutoCrLf::False),
            Some("input") => Ok(AutoCrLf::Input),
            Some(value) => match self.get_bool("core.autocrlf")? {
                Some(true) => Ok(AutoCrLf::True),
                Some(false) => Ok(AutoCrLf::False),
                None => Err(ConfigGetError::UnrecognizedValue {
                    key: "core.autocrlf".to_owned(),
                    value: value.to_owned(),
                }),
            },
        }
    }

    pub fn core_gitproxy(&self) -> Option<&str> {
        self.get_str("core.gitproxy")
    }

    pub fn i18n_commitencoding(&self) -> &str {
        self.get_str("i18n.commitencoding").unwrap_or("utf-8")
    }

    pub fn i18n_logoutputencoding(&self) -> &str {
        self.get_str("i18n.logoutputencoding")
            .unwrap_or_else(|| self.i18n_commitencoding())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_layer_overrides_repo_layer() {
        let mut config = StackedConfig::new();
        config.set(ConfigSource::Repo, "core.bare", "false");
        config.set(ConfigSource::Env, "core.bare", "true");
        assert_eq!(config.core_bare().unwrap(), true);
    }

    #[test]
    fn loads_minimal_ini_sections() {
        let mut config = StackedConfig::new();
        config.load_ini(
            ConfigSource::Repo,
            "[core]\n\trepositoryformatversion = 0\n\tbare = false\n[i18n]\n\tcommitencoding = utf-8\n",
        );
        assert_eq!(config.core_repository_format_version().unwrap(), 0);
        assert_eq!(config.i18n_commitencoding(), "utf-8");
    }

    #[test]
    fn autocrlf_defaults_to_false() {
        let config = StackedConfig::new();
        assert_eq!(config.core_autocrlf().unwrap(), AutoCrLf::False);
    }

    #[test]
    fn autocrlf_recognizes_input() {
        let mut config = StackedConfig::new();
        config.set(ConfigSource::User, "core.autocrlf", "input");
        assert_eq!(config.core_autocrlf().unwrap(), AutoCrLf::Input);
    }

    #[test]
    fn non_boolean_value_is_rejected() {
        let mut config = StackedConfig::new();
        config.set(ConfigSource::User, "core.bare", "maybe");
        assert!(matches!(config.core_bare(), Err(ConfigGetError::NotABool { .. })));
    }
}
