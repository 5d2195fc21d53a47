use serde::{Deserialize, Serialize};
use slide_chatgpt::{BackendKind, BackendSettings};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },
    #[error("Unknown profile: {name}")]
    UnknownProfile { name: String },
    #[error("Failed to read config file: {source}")]
    IoError { source: std::io::Error },
    #[error("Failed to parse config file: {source}")]
    ParseError { source: serde_json::Error },
    #[error("Failed to parse TOML config: {source}")]
    TomlParseError { source: toml::de::Error },
    #[error("Failed to write TOML config: {source}")]
    TomlSerializeError { source: toml::ser::Error },
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a presentation assistant. Reply only with JSON lines: \
a header line {\"a\":\"create|append|update|del|ask|chat|info|batch\", ...} followed by one slide per line \
using keys i,t,c,v,d,l,n.";

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which backend family to talk to
    pub backend: BackendKind,
    /// Model name sent to the backend
    pub model: String,
    /// Overrides the backend's default endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env_var: Option<String>,
    pub system_prompt: String,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Number of most recent history messages sent with each request
    pub history_window: usize,
    /// How many `info` follow-up rounds one request may trigger
    pub retrieval_rounds: u32,
    /// Send only slide numbers and titles as deck context
    pub skeleton_context: bool,
    /// Named overrides, selected with `apply_profile`
    pub profiles: HashMap<String, ConfigProfile>,
}

/// Configuration profile for switching backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env_var: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = HashMap::new();

        profiles.insert("local".to_string(), ConfigProfile {
            backend: Some(BackendKind::Local),
            model: Some("llama3.1".to_string()),
            base_url: None,
            api_key_env_var: None,
        });

        profiles.insert("gemini".to_string(), ConfigProfile {
            backend: Some(BackendKind::Gemini),
            model: Some("gemini-2.5-flash".to_string()),
            base_url: None,
            api_key_env_var: Some("GEMINI_API_KEY".to_string()),
        });

        Self {
            backend: BackendKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env_var: Some("OPENAI_API_KEY".to_string()),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_output_tokens: 8192,
            temperature: None,
            history_window: 20,
            retrieval_rounds: 1,
            skeleton_context: true,
            profiles,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError { source: e })?;

        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParseError { source: e })
        } else {
            serde_json::from_str(&contents)
                .map_err(|e| ConfigError::ParseError { source: e })
        }
    }

    /// Load configuration with default fallback
    pub fn load_with_fallback() -> Self {
        let config_paths = [
            ".slide/config.toml",
            ".slide/config.json",
            "slide.config.toml",
            "slide.config.json",
        ];

        for path in &config_paths {
            if Path::new(path).exists() {
                match Self::load_from_file(path) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from {}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Apply a profile to this configuration
    pub fn apply_profile(&mut self, profile_name: &str) -> Result<(), ConfigError> {
        let Some(profile) = self.profiles.get(profile_name).cloned() else {
            return Err(ConfigError::UnknownProfile {
                name: profile_name.to_string(),
            });
        };
        if let Some(backend) = profile.backend {
            self.backend = backend;
        }
        if let Some(model) = profile.model {
            self.model = model;
        }
        if profile.base_url.is_some() {
            self.base_url = profile.base_url;
        }
        if profile.api_key_env_var.is_some() {
            self.api_key_env_var = profile.api_key_env_var;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::to_string_pretty(self)
                .map_err(|e| ConfigError::TomlSerializeError { source: e })?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| ConfigError::ParseError { source: e })?
        };

        std::fs::write(path, contents)
            .map_err(|e| ConfigError::IoError { source: e })
    }

    /// Settings for one request, with the API key read from the environment.
    pub fn backend_settings(&self) -> BackendSettings {
        let api_key = self
            .api_key_env_var
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty());
        if api_key.is_none() && self.backend != BackendKind::Local {
            tracing::warn!("No API key found for the {} backend", self.backend);
        }
        BackendSettings {
            kind: self.backend,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            api_key,
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_one_retrieval_round() {
        let config = Config::default();
        assert_eq!(config.retrieval_rounds, 1);
        assert!(config.skeleton_context);
        assert_eq!(config.backend, BackendKind::OpenAi);
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backend = \"local\"\nmodel = \"qwen3\"\nretrieval_rounds = 2\n").unwrap();
        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.model, "qwen3");
        assert_eq!(config.retrieval_rounds, 2);
        assert_eq!(config.history_window, 20);
    }

    #[test]
    fn json_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.model = "gpt-4o".into();
        config.save_to_file(&path).unwrap();
        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.model, "gpt-4o");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Config::load_from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn profile_switches_backend() {
        let mut config = Config::default();
        config.apply_profile("gemini").unwrap();
        assert_eq!(config.backend, BackendKind::Gemini);
        assert_eq!(config.api_key_env_var.as_deref(), Some("GEMINI_API_KEY"));
        assert!(matches!(
            config.apply_profile("nope"),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }
}
