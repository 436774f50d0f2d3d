//! Configuration loading and validation.
//!
//! `config.json` is checked as raw JSON first so every violation is reported
//! at once, then deserialized. `messages.json` holds the three warning texts.
//! Secrets and log overrides come from the environment.

use crate::application::engine::{MonitorMode, RuleToggles};
use crate::domain::decision::MessageKey;
use crate::domain::window::window_from_secs;
use crate::infrastructure::builder::RuleEngineBuilder;
use serde::Deserialize;
use serde_json::{Number, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error raised while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid JSON or does not match the expected shape
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// One or more settings are out of range
    Invalid(Vec<String>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "cannot read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "cannot parse {}: {}", path.display(), source)
            }
            ConfigError::Invalid(errors) => {
                write!(f, "config validation failed: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Optional `logging` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub file: Option<String>,
}

/// Contents of `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub mode: MonitorMode,
    pub channels: Vec<String>,
    pub rules: RuleToggles,
    pub cooldown_sec_user: u64,
    pub cooldown_sec_channel: u64,
    pub flood_window_sec: u64,
    pub flood_max_posts: u64,
    #[serde(default)]
    pub logging: Option<LoggingSettings>,
    /// Ceiling on tracked keys per map; unset means the builder default
    #[serde(default)]
    pub max_tracked_keys: Option<usize>,
}

struct IntegerRule {
    key: &'static str,
    min: u64,
}

const INTEGER_RULES: [IntegerRule; 4] = [
    IntegerRule {
        key: "cooldown_sec_user",
        min: 0,
    },
    IntegerRule {
        key: "cooldown_sec_channel",
        min: 0,
    },
    IntegerRule {
        key: "flood_window_sec",
        min: 1,
    },
    IntegerRule {
        key: "flood_max_posts",
        min: 1,
    },
];

const RULE_KEYS: [&str; 3] = ["no_mention", "non_thread_reply", "flood"];

const MAX_TRACKED_KEYS: &str = "max_tracked_keys";

/// Integer value of a JSON number, accepting floats with no fractional
/// part (`60.0`).
fn whole_number(n: &Number) -> Option<i128> {
    if let Some(value) = n.as_u64() {
        return Some(i128::from(value));
    }
    if let Some(value) = n.as_i64() {
        return Some(i128::from(value));
    }
    n.as_f64()
        .filter(|f| f.is_finite() && f.fract() == 0.0)
        .filter(|f| *f >= i64::MIN as f64 && *f <= u64::MAX as f64)
        .map(|f| f as i128)
}

/// Rewrite whole-number floats in integer fields as plain integers.
fn normalize_integers(config: &mut Value) {
    let Some(object) = config.as_object_mut() else {
        return;
    };
    let keys = INTEGER_RULES.iter().map(|rule| rule.key).chain([MAX_TRACKED_KEYS]);
    for key in keys {
        if let Some(Value::Number(n)) = object.get_mut(key) {
            if let Some(value) = whole_number(n).and_then(|v| u64::try_from(v).ok()) {
                *n = Number::from(value);
            }
        }
    }
}

/// Check a raw config document, returning every violation found.
pub fn validate(config: &Value) -> Vec<String> {
    let Some(object) = config.as_object() else {
        return vec!["config must be a JSON object".to_string()];
    };
    let mut errors = Vec::new();

    match object.get("mode").and_then(Value::as_str) {
        Some("include") | Some("exclude") => {}
        _ => errors.push("mode must be one of include / exclude".to_string()),
    }

    let channels_ok = object
        .get("channels")
        .and_then(Value::as_array)
        .is_some_and(|channels| channels.iter().all(Value::is_string));
    if !channels_ok {
        errors.push("channels must be an array of channel ID strings".to_string());
    }

    for rule in &INTEGER_RULES {
        match object.get(rule.key) {
            Some(Value::Number(n)) => match whole_number(n) {
                Some(value) if value < i128::from(rule.min) => {
                    errors.push(format!("{} must be at least {}", rule.key, rule.min));
                }
                Some(_) => {}
                None => errors.push(format!("{} must be an integer", rule.key)),
            },
            _ => errors.push(format!("{} must be a number", rule.key)),
        }
    }

    match object.get("rules").and_then(Value::as_object) {
        None => errors.push("rules section is missing".to_string()),
        Some(rules) => {
            for key in RULE_KEYS {
                if !rules.get(key).is_some_and(Value::is_boolean) {
                    errors.push(format!("rules.{} must be true / false", key));
                }
            }
        }
    }

    if let Some(logging) = object.get("logging") {
        match logging.as_object() {
            None => errors.push("logging must be an object".to_string()),
            Some(logging) => {
                if logging.get("level").is_some_and(|v| !v.is_string()) {
                    errors.push("logging.level must be a string".to_string());
                }
                if logging.get("file").is_some_and(|v| !v.is_string()) {
                    errors.push("logging.file must be a string path".to_string());
                }
            }
        }
    }

    if let Some(max) = object.get(MAX_TRACKED_KEYS) {
        let whole = match max {
            Value::Number(n) => whole_number(n),
            _ => None,
        };
        if !whole.is_some_and(|n| n >= 1) {
            errors.push("max_tracked_keys must be an integer of at least 1".to_string());
        }
    }

    errors
}

impl Settings {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = read(path)?;
        Self::from_json_str(&raw).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate a config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut value: Value = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;

        let errors = validate(&value);
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }
        normalize_integers(&mut value);

        serde_json::from_value(value).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })
    }

    pub fn user_cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_sec_user)
    }

    pub fn channel_cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_sec_channel)
    }

    pub fn flood_window(&self) -> Duration {
        window_from_secs(self.flood_window_sec)
    }

    /// Engine builder preloaded with these settings.
    pub fn engine_builder(&self) -> RuleEngineBuilder {
        let builder = RuleEngineBuilder::new()
            .with_mode(self.mode)
            .with_channels(self.channels.iter().map(String::as_str))
            .with_rules(self.rules)
            .with_user_cooldown(self.user_cooldown())
            .with_channel_cooldown(self.channel_cooldown())
            .with_flood_window(self.flood_window())
            .with_flood_threshold(usize::try_from(self.flood_max_posts).unwrap_or(usize::MAX));
        match self.max_tracked_keys {
            Some(max) => builder.with_max_entries(max),
            None => builder,
        }
    }
}

/// Warning texts keyed by rule, from `messages.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageTemplates {
    pub no_mention: String,
    pub non_thread_reply: String,
    pub flood: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            no_mention: "Please mention the person you are addressing (@name).".to_string(),
            non_thread_reply: "Looks like a reply. Please answer in the thread instead."
                .to_string(),
            flood: "You are posting a lot in a short time. Consider combining messages."
                .to_string(),
        }
    }
}

impl MessageTemplates {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = read(path)?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn text_for(&self, key: MessageKey) -> &str {
        match key {
            MessageKey::NoMention => &self.no_mention,
            MessageKey::NonThreadReply => &self.non_thread_reply,
            MessageKey::Flood => &self.flood,
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Process environment values the bot reads.
///
/// Blank values count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub slack_bot_token: Option<String>,
    pub sheets_webhook_url: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub app_env: Option<String>,
}

impl Environment {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            slack_bot_token: get("SLACK_BOT_TOKEN"),
            sheets_webhook_url: get("SHEETS_WEBHOOK_URL"),
            log_level: get("LOG_LEVEL"),
            log_file: get("LOG_FILE"),
            app_env: get("APP_ENV").or_else(|| get("NODE_ENV")),
        }
    }

    /// `APP_ENV=development` (any case).
    pub fn is_development(&self) -> bool {
        self.app_env
            .as_deref()
            .is_some_and(|env| env.eq_ignore_ascii_case("development"))
    }
}
