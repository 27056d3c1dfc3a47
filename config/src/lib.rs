//! Configuration for Quill.
//!
//! Settings live in `~/.quill/config.toml`. Every section is optional; a missing file
//! means defaults throughout.

mod secrets;

use std::path::{Path, PathBuf};
use std::{env, fmt, fs, io};

use quill_types::{ApiKey, ModelName};
use serde::Deserialize;

pub use secrets::{
    API_KEY_ENV_VAR, API_KEY_SECRET, EnvSecretStore, FileSecretStore, MemorySecretStore,
    SecretStore, SecretStoreError,
};

pub const DEFAULT_MIN_MESSAGE_CHARS: usize = 10;
pub const DEFAULT_LOW_VALUE_KEYWORDS: &[&str] = &["comment", "naming", "style"];
pub const DEFAULT_FIX_CONTEXT_LINES: usize = 5;
pub const DEFAULT_CONTEXT_TURNS: usize = 6;

#[derive(Debug, Default, Deserialize)]
pub struct QuillConfig {
    pub app: Option<AppConfig>,
    pub api_keys: Option<ApiKeys>,
    pub review: Option<ReviewConfig>,
    pub chat: Option<ChatConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    pub model: Option<String>,
    /// Base URL override for the completion endpoint.
    pub endpoint: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct ApiKeys {
    pub google: Option<String>,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let google = if self.google.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("ApiKeys").field("google", &google).finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewConfig {
    pub min_message_chars: Option<usize>,
    pub low_value_keywords: Option<Vec<String>>,
    pub fix_context_lines: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatConfig {
    pub context_turns: Option<usize>,
}

/// Resolved review settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSettings {
    /// Quick-review findings shorter than this (in characters, trimmed) are dropped.
    pub min_message_chars: usize,
    /// Quick-review findings mentioning any of these (case-insensitive) are dropped.
    pub low_value_keywords: Vec<String>,
    /// Lines of context on each side of a diagnostic sent with a fix request.
    pub fix_context_lines: usize,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            min_message_chars: DEFAULT_MIN_MESSAGE_CHARS,
            low_value_keywords: DEFAULT_LOW_VALUE_KEYWORDS
                .iter()
                .map(ToString::to_string)
                .collect(),
            fix_context_lines: DEFAULT_FIX_CONTEXT_LINES,
        }
    }
}

/// Resolved chat settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSettings {
    /// Turns sent with each chat request. Never zero.
    pub context_turns: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            context_turns: DEFAULT_CONTEXT_TURNS,
        }
    }
}

/// Replace `${VAR}` references with the variable's value (empty when unset).
///
/// Unterminated or empty references are left as written.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find('}') {
            Some(0) => {
                out.push_str("${}");
                rest = &after[1..];
            }
            Some(close) => {
                out.push_str(&env::var(&after[..close]).unwrap_or_default());
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

impl QuillConfig {
    /// Load from the default location. `Ok(None)` when there is no config file.
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

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {}: {err}", path.display());
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {}: {err}", path.display());
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

    /// Configured model, falling back to the default when unset or invalid.
    #[must_use]
    pub fn model(&self) -> ModelName {
        let Some(raw) = self.app.as_ref().and_then(|app| app.model.as_deref()) else {
            return ModelName::default();
        };
        ModelName::parse(raw).unwrap_or_else(|e| {
            tracing::warn!("Ignoring configured model: {e}");
            ModelName::default()
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.app
            .as_ref()
            .and_then(|app| app.endpoint.as_deref())
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
    }

    /// `[api_keys] google` with `${VAR}` references expanded.
    #[must_use]
    pub fn google_api_key(&self) -> Option<ApiKey> {
        self.api_keys
            .as_ref()
            .and_then(|keys| keys.google.as_deref())
            .and_then(|raw| ApiKey::new(expand_env_vars(raw)))
    }

    #[must_use]
    pub fn review_settings(&self) -> ReviewSettings {
        let mut settings = ReviewSettings::default();
        if let Some(review) = &self.review {
            if let Some(min) = review.min_message_chars {
                settings.min_message_chars = min;
            }
            if let Some(keywords) = &review.low_value_keywords {
                settings.low_value_keywords = keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
            }
            if let Some(lines) = review.fix_context_lines {
                settings.fix_context_lines = lines;
            }
        }
        settings
    }

    #[must_use]
    pub fn chat_settings(&self) -> ChatSettings {
        let context_turns = self
            .chat
            .as_ref()
            .and_then(|chat| chat.context_turns)
            .filter(|turns| *turns > 0)
            .unwrap_or(DEFAULT_CONTEXT_TURNS);
        ChatSettings { context_turns }
    }
}

/// `~/.quill`
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".quill"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("config.toml"))
}

#[must_use]
pub fn log_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("logs").join("quill.log"))
}
