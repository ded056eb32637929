use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::documents::STATEWIDE_ORDINANCE;

/// Main configuration structure for the ADU permit chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub openai: OpenAIConfig,
    pub documents: DocumentsConfig,
    pub vector_store: VectorStoreConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `http` or `stdio`
    pub transport: String,
    pub bind: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Seconds a browser session may sit unused before it is ended. 0 keeps sessions forever.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

fn default_session_idle_secs() -> u64 {
    1800
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    pub assistant_name: String,
    pub run_instructions: String,
    pub max_prompt_tokens: u32,
    pub max_completion_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    pub letters_dir: PathBuf,
    pub ordinances_dir: PathBuf,
    pub statewide_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    pub name: String,
    /// Identifier of a store created by an earlier run. Read-only; never written back.
    #[serde(default)]
    pub persisted_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_ms: u64,
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
    #[serde(default)]
    pub upload_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from file with environment variable overrides
    /// ALWAYS returns a valid config - never fails
    pub fn load() -> Self {
        for path in ["../.env", ".env"] {
            if dotenvy::from_path(path).is_ok() {
                tracing::info!("Loaded .env from: {}", path);
                break;
            }
        }

        let config_path = env::var("ADU_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        let mut config = Self::from_file(Path::new(&config_path));

        config.apply_env_overrides();

        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    fn from_file(path: &Path) -> Self {
        if !path.exists() {
            tracing::warn!("Config file not found at {} - using defaults", path.display());
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to parse config file {}: {} - using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!(
                    "Failed to read config file {}: {} - using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(transport) = lookup("ADU_TRANSPORT") {
            self.server.transport = transport;
        }
        if let Some(bind) = lookup("ADU_HTTP_BIND") {
            self.server.bind = bind;
        }
        if let Some(token) = lookup("ADU_BEARER_TOKEN") {
            self.server.bearer_token = Some(token);
        }
        if let Some(secs) = lookup("ADU_SESSION_IDLE_SECS").and_then(|v| v.parse().ok()) {
            self.server.session_idle_secs = secs;
        }

        // OpenAI overrides
        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            self.openai.api_key = api_key;
        }
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            self.openai.base_url = Some(base_url);
        }
        if let Some(model) = lookup("ADU_MODEL") {
            self.openai.model = model;
        }
        if let Some(max) = lookup("ADU_MAX_PROMPT_TOKENS").and_then(|v| v.parse().ok()) {
            self.openai.max_prompt_tokens = max;
        }
        if let Some(max) = lookup("ADU_MAX_COMPLETION_TOKENS").and_then(|v| v.parse().ok()) {
            self.openai.max_completion_tokens = max;
        }

        // Document folders
        if let Some(dir) = lookup("ADU_LETTERS_DIR") {
            self.documents.letters_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("ADU_ORDINANCES_DIR") {
            self.documents.ordinances_dir = PathBuf::from(dir);
        }

        // Persisted vector store
        if let Some(id) = lookup("VECTOR_STORE_ID") {
            let id = id.trim().to_string();
            self.vector_store.persisted_id = (!id.is_empty()).then_some(id);
        }

        // Polling overrides
        if let Some(ms) = lookup("ADU_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.polling.interval_ms = ms;
        }
        if let Some(secs) = lookup("ADU_RUN_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.polling.run_timeout_secs = Some(secs);
        }
        if let Some(secs) = lookup("ADU_UPLOAD_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.polling.upload_timeout_secs = Some(secs);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.openai.api_key.is_empty() {
            return Err("OPENAI_API_KEY environment variable must be set".into());
        }
        if self.polling.interval_ms == 0 {
            return Err("polling.interval_ms cannot be 0".into());
        }
        if self.openai.max_prompt_tokens == 0 || self.openai.max_completion_tokens == 0 {
            return Err("token budgets must be greater than 0".into());
        }
        match self.server.transport.as_str() {
            "http" | "stdio" => {}
            other => return Err(format!("unknown transport '{other}'").into()),
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms.max(1))
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.polling.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn upload_timeout(&self) -> Option<Duration> {
        self.polling.upload_timeout_secs.map(Duration::from_secs)
    }

    pub fn session_idle(&self) -> Option<Duration> {
        (self.server.session_idle_secs > 0).then(|| Duration::from_secs(self.server.session_idle_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                transport: "http".to_string(),
                bind: "127.0.0.1:8501".to_string(),
                bearer_token: None,
                session_idle_secs: default_session_idle_secs(),
            },
            openai: OpenAIConfig {
                api_key: String::new(),
                base_url: None,
                model: "gpt-4o".to_string(),
                assistant_name: "ADU Permit Chatbot Assistant".to_string(),
                run_instructions:
                    "Please answer the user's query based on the conversation context.".to_string(),
                max_prompt_tokens: 20000,
                max_completion_tokens: 5000,
            },
            documents: DocumentsConfig {
                letters_dir: PathBuf::from("data").join("Letters"),
                ordinances_dir: PathBuf::from("data").join("Ordinances"),
                statewide_file: STATEWIDE_ORDINANCE.to_string(),
            },
            vector_store: VectorStoreConfig {
                name: "ADU Permit Vector Store".to_string(),
                persisted_id: None,
            },
            polling: PollingConfig {
                interval_ms: 1000,
                run_timeout_secs: None,
                upload_timeout_secs: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_win_over_defaults() {
        let mut cfg = Config::default();
        cfg.apply_overrides_from(lookup_from(&[
            ("ADU_TRANSPORT", "stdio"),
            ("OPENAI_API_KEY", "sk-test"),
            ("VECTOR_STORE_ID", "vs_123"),
            ("ADU_POLL_INTERVAL_MS", "250"),
            ("ADU_RUN_TIMEOUT_SECS", "90"),
            ("ADU_SESSION_IDLE_SECS", "0"),
        ]));
        assert_eq!(cfg.server.transport, "stdio");
        assert_eq!(cfg.openai.api_key, "sk-test");
        assert_eq!(cfg.vector_store.persisted_id.as_deref(), Some("vs_123"));
        assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
        assert_eq!(cfg.run_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(cfg.upload_timeout(), None);
        assert_eq!(cfg.session_idle(), None);
    }

    #[test]
    fn test_blank_vector_store_id_is_ignored() {
        let mut cfg = Config::default();
        cfg.apply_overrides_from(lookup_from(&[("VECTOR_STORE_ID", "  ")]));
        assert!(cfg.vector_store.persisted_id.is_none());
    }

    #[test]
    fn test_unparsable_numbers_keep_previous_value() {
        let mut cfg = Config::default();
        cfg.apply_overrides_from(lookup_from(&[("ADU_MAX_PROMPT_TOKENS", "lots")]));
        assert_eq!(cfg.openai.max_prompt_tokens, 20000);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = Config::from_file(Path::new("/definitely/not/here/config.yaml"));
        assert_eq!(cfg.openai.model, "gpt-4o");
        assert_eq!(cfg.documents.statewide_file, STATEWIDE_ORDINANCE);
        assert_eq!(cfg.session_idle(), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_yaml_file_is_parsed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        let mut cfg = Config::default();
        cfg.openai.model = "gpt-4o-mini".to_string();
        cfg.polling.upload_timeout_secs = Some(600);
        fs::write(&path, serde_yaml::to_string(&cfg).expect("serialize")).expect("write");

        let loaded = Config::from_file(&path);
        assert_eq!(loaded.openai.model, "gpt-4o-mini");
        assert_eq!(loaded.upload_timeout(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_validate_flags_missing_key() {
        let cfg = Config::default();
        assert!(cfg.validate().is_err());
        let mut cfg = Config::default();
        cfg.openai.api_key = "sk-test".to_string();
        assert!(cfg.validate().is_ok());
    }
}
