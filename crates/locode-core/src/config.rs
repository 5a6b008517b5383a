//! Configuration loading.
//!
//! Sources are merged in order, later ones winning:
//! 1. Global config (`~/.config/locode/config.json`)
//! 2. Project config (`locode.jsonc` or `locode.json` in the working directory)
//! 3. `LOCODE_*` environment variables
//! 4. Command-line flags (applied by the binary through [`Config::merge`])
//!
//! Files may contain `//` and `/* */` comments and `{env:VAR}` or
//! `{file:path}` placeholders.

use crate::agent::AgentConfig;
use crate::error::ConfigError;
use crate::parser::Protocol;
use locode_provider::openai_compatible::{DEFAULT_API_KEY, DEFAULT_BASE_URL};
use locode_tools::ConfirmPolicy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "llama3.1";
/// Consecutive invalid responses tolerated before a run fails.
pub const DEFAULT_MAX_SCHEMA_RETRIES: u32 = 3;
/// Model calls allowed per run.
pub const DEFAULT_MAX_STEPS: u32 = 50;
/// Seconds a single command may run.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;

const ENV_PREFIX: &str = "LOCODE_";

static VAR_REGEX: OnceLock<Regex> = OnceLock::new();

fn var_regex() -> &'static Regex {
    VAR_REGEX.get_or_init(|| {
        Regex::new(r"\{(env|file):([^}]+)\}").expect("variable substitution regex is valid")
    })
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model name passed to the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key sent as a bearer token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// How tool calls are expressed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,

    /// Request a token stream from the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_schema_retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,

    /// What to do when a write or command needs approval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm: Option<ConfirmPolicy>,
}

impl Config {
    /// Load configuration from files and the environment.
    ///
    /// Returns the merged config and the files it was read from.
    pub async fn load(project_dir: Option<&Path>) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut sources = Vec::new();

        // 1. Global config
        if let Some(global_dir) = Self::global_config_dir() {
            for name in ["config.json", "config.jsonc", "locode.json"] {
                let path = global_dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        // 2. Project config
        if let Some(dir) = project_dir {
            for name in ["locode.jsonc", "locode.json"] {
                let path = dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        // 3. Environment
        config = config.merge(Self::from_vars(std::env::vars())?);

        debug!(sources = ?sources, "Loaded configuration");
        Ok((config, sources))
    }

    /// Get the global config directory.
    ///
    /// On Unix, prefers `~/.config/locode` over the platform directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            if let Some(home) = dirs::home_dir() {
                let xdg_config = home.join(".config").join("locode");
                if xdg_config.exists() {
                    return Some(xdg_config);
                }
            }
        }

        locode_util::path::config_dir()
    }

    /// Load a single config file.
    pub async fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let content = Self::substitute_variables(&content, path)?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    /// Parse JSONC content.
    pub fn parse_jsonc(content: &str, source: &str) -> Result<Self, ConfigError> {
        let stripped = Self::strip_comments(content);
        serde_json::from_str(&stripped).map_err(|e| ConfigError::InvalidJson {
            path: source.to_string(),
            message: e.to_string(),
        })
    }

    /// Read `LOCODE_*` variables.
    ///
    /// Unrelated variables are ignored. Values that do not parse are errors.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Config::default();

        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "MODEL" => config.model = Some(value),
                "BASE_URL" => config.base_url = Some(value),
                "API_KEY" => config.api_key = Some(value),
                "PROTOCOL" => {
                    config.protocol = Some(value.parse().map_err(ConfigError::validation)?)
                }
                "STREAM" => config.stream = Some(parse_bool(&key, &value)?),
                "TEMPERATURE" => config.temperature = Some(parse_number(&key, &value)?),
                "MAX_SCHEMA_RETRIES" => {
                    config.max_schema_retries = Some(parse_number(&key, &value)?)
                }
                "MAX_STEPS" => config.max_steps = Some(parse_number(&key, &value)?),
                "COMMAND_TIMEOUT" | "COMMAND_TIMEOUT_SECS" => {
                    config.command_timeout_secs = Some(parse_number(&key, &value)?)
                }
                "CONFIRM" => config.confirm = Some(value.parse().map_err(ConfigError::validation)?),
                _ => {}
            }
        }

        Ok(config)
    }

    /// Strip comments from JSONC content.
    fn strip_comments(input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut in_string = false;
        let mut escape_next = false;

        while let Some(c) = chars.next() {
            if escape_next {
                result.push(c);
                escape_next = false;
                continue;
            }

            if c == '\\' && in_string {
                result.push(c);
                escape_next = true;
                continue;
            }

            if c == '"' {
                in_string = !in_string;
                result.push(c);
                continue;
            }

            if in_string {
                result.push(c);
                continue;
            }

            if c == '/' {
                match chars.peek() {
                    Some('/') => {
                        chars.next();
                        for c in chars.by_ref() {
                            if c == '\n' {
                                result.push('\n');
                                break;
                            }
                        }
                        continue;
                    }
                    Some('*') => {
                        chars.next();
                        let mut prev = ' ';
                        for c in chars.by_ref() {
                            if prev == '*' && c == '/' {
                                break;
                            }
                            // Keep line numbers in parse errors accurate
                            if c == '\n' {
                                result.push('\n');
                            }
                            prev = c;
                        }
                        continue;
                    }
                    _ => {}
                }
            }

            result.push(c);
        }

        result
    }

    /// Substitute `{env:VAR}` and `{file:path}` placeholders.
    ///
    /// File paths are relative to the config file's directory.
    fn substitute_variables(content: &str, config_path: &Path) -> Result<String, ConfigError> {
        let config_dir = config_path.parent().unwrap_or(Path::new("."));
        let mut result = content.to_string();

        for cap in var_regex().captures_iter(content) {
            let (Some(full_match), Some(kind), Some(value)) = (cap.get(0), cap.get(1), cap.get(2))
            else {
                continue;
            };
            let value = value.as_str();

            let replacement = match kind.as_str() {
                "env" => std::env::var(value).map_err(|_| ConfigError::EnvVarNotFound {
                    name: value.to_string(),
                })?,
                "file" => {
                    let file_path = config_dir.join(value);
                    std::fs::read_to_string(&file_path)
                        .map(|v| v.trim().to_string())
                        .map_err(|_| ConfigError::FileRefNotFound {
                            path: file_path.display().to_string(),
                        })?
                }
                _ => continue,
            };

            // Values land inside JSON strings.
            let escaped = serde_json::to_string(&replacement)
                .map(|quoted| quoted[1..quoted.len() - 1].to_string())
                .unwrap_or(replacement);
            result = result.replace(full_match.as_str(), &escaped);
        }

        Ok(result)
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(self, other: Self) -> Self {
        Self {
            model: other.model.or(self.model),
            base_url: other.base_url.or(self.base_url),
            api_key: other.api_key.or(self.api_key),
            protocol: other.protocol.or(self.protocol),
            stream: other.stream.or(self.stream),
            temperature: other.temperature.or(self.temperature),
            max_schema_retries: other.max_schema_retries.or(self.max_schema_retries),
            max_steps: other.max_steps.or(self.max_steps),
            command_timeout_secs: other.command_timeout_secs.or(self.command_timeout_secs),
            confirm: other.confirm.or(self.confirm),
        }
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or(DEFAULT_API_KEY)
    }

    pub fn confirm_policy(&self) -> ConfirmPolicy {
        self.confirm.unwrap_or_default()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(
            self.command_timeout_secs
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        )
    }

    /// Resolve defaults into the settings the agent loop needs.
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            protocol: self.protocol.unwrap_or_default(),
            stream: self.stream.unwrap_or(true),
            temperature: self.temperature,
            max_schema_retries: self
                .max_schema_retries
                .unwrap_or(DEFAULT_MAX_SCHEMA_RETRIES),
            max_steps: self.max_steps.unwrap_or(DEFAULT_MAX_STEPS),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::validation(format!(
            "{key} must be a boolean, got '{value}'"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::validation(format!("{key} must be a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_strip_comments() {
        let input = r#"{
            // This is a comment
            "model": "qwen2.5-coder", /* inline */
            "base_url": "http://host:11434/v1" // trailing
        }"#;

        let result = Config::strip_comments(input);
        assert!(!result.contains("This is a comment"));
        assert!(!result.contains("inline"));
        assert!(result.contains("\"model\": \"qwen2.5-coder\""));
        // URLs inside strings are not comments
        assert!(result.contains("http://host:11434/v1"));
    }

    #[test]
    fn test_parse_jsonc() {
        let input = r#"{
            // Model to use
            "model": "qwen2.5-coder",
            "protocol": "json",
            "confirm": "allow",
            "max_steps": 10
        }"#;

        let config = Config::parse_jsonc(input, "test").unwrap();
        assert_eq!(config.model.as_deref(), Some("qwen2.5-coder"));
        assert_eq!(config.protocol, Some(Protocol::Json));
        assert_eq!(config.confirm, Some(ConfirmPolicy::Allow));
        assert_eq!(config.max_steps, Some(10));
    }

    #[test]
    fn test_parse_jsonc_rejects_bad_values() {
        let err = Config::parse_jsonc(r#"{"protocol": "xml"}"#, "locode.json").unwrap_err();
        assert!(err.to_string().contains("locode.json"));
    }

    #[test]
    fn test_merge_config() {
        let base = Config {
            model: Some("llama3.1".into()),
            max_steps: Some(20),
            ..Default::default()
        };
        let other = Config {
            model: Some("qwen2.5-coder".into()),
            stream: Some(false),
            ..Default::default()
        };

        let merged = base.merge(other);
        assert_eq!(merged.model.as_deref(), Some("qwen2.5-coder"));
        assert_eq!(merged.max_steps, Some(20));
        assert_eq!(merged.stream, Some(false));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model(), "llama3.1");
        assert_eq!(config.base_url(), "http://localhost:11434/v1");
        assert_eq!(config.api_key(), "ollama");
        assert_eq!(config.confirm_policy(), ConfirmPolicy::Ask);
        assert_eq!(config.command_timeout(), Duration::from_secs(120));

        let agent = config.agent_config();
        assert_eq!(agent.protocol, Protocol::Native);
        assert!(agent.stream);
        assert_eq!(agent.max_schema_retries, 3);
        assert_eq!(agent.max_steps, 50);
    }

    #[test]
    fn test_from_vars() {
        let config = Config::from_vars(vars(&[
            ("LOCODE_MODEL", "mistral"),
            ("LOCODE_PROTOCOL", "json"),
            ("LOCODE_STREAM", "false"),
            ("LOCODE_MAX_STEPS", "7"),
            ("LOCODE_COMMAND_TIMEOUT", "5"),
            ("LOCODE_CONFIRM", "deny"),
            ("PATH", "/usr/bin"),
        ]))
        .unwrap();

        assert_eq!(config.model.as_deref(), Some("mistral"));
        assert_eq!(config.protocol, Some(Protocol::Json));
        assert_eq!(config.stream, Some(false));
        assert_eq!(config.max_steps, Some(7));
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert_eq!(config.confirm, Some(ConfirmPolicy::Deny));
    }

    #[test]
    fn test_from_vars_rejects_garbage() {
        assert!(Config::from_vars(vars(&[("LOCODE_MAX_STEPS", "many")])).is_err());
        assert!(Config::from_vars(vars(&[("LOCODE_STREAM", "maybe")])).is_err());
        assert!(Config::from_vars(vars(&[("LOCODE_PROTOCOL", "xml")])).is_err());
    }

    #[tokio::test]
    async fn test_load_file_with_file_reference() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("key.txt"), "secret-key\n").unwrap();
        let path = dir.path().join("locode.jsonc");
        std::fs::write(
            &path,
            r#"{
                // Key lives next to the config
                "api_key": "{file:key.txt}",
                "temperature": 0.2
            }"#,
        )
        .unwrap();

        let config = Config::load_file(&path).await.unwrap();
        assert_eq!(config.api_key.as_deref(), Some("secret-key"));
        assert_eq!(config.temperature, Some(0.2));
    }

    #[tokio::test]
    async fn test_load_file_missing_env_var() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locode.json");
        std::fs::write(
            &path,
            r#"{"api_key": "{env:LOCODE_TEST_SURELY_UNSET_VARIABLE}"}"#,
        )
        .unwrap();

        let err = Config::load_file(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarNotFound { .. }));
    }
}
