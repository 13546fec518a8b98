pub mod error;
pub mod validate;

pub use error::{FieldViolation, InvocationError, ValidationError};
pub use validate::{validate_fields, FieldRule, DEFAULT_MIN_FIELD_LENGTH};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// --- Output shapes ---

/// One required text field of a model response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputField {
    pub name: &'static str,
    pub description: &'static str,
}

/// The fields a model response must carry for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputShape {
    pub name: &'static str,
    pub fields: &'static [OutputField],
}

impl OutputShape {
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }
}

// --- Schema generation ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchemaGenerationRequest {
    /// A description of the data requirements for the MongoDB schema.
    pub data_requirements: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SchemaGenerationResult {
    /// The generated MongoDB schema design.
    #[serde(rename = "mongoDBSchema")]
    pub mongodb_schema: String,
    /// A short summary of what was generated.
    pub progress: String,
}

impl SchemaGenerationResult {
    pub const SHAPE: OutputShape = OutputShape {
        name: "SchemaGenerationResult",
        fields: &[
            OutputField {
                name: "mongoDBSchema",
                description: "The generated MongoDB schema design.",
            },
            OutputField {
                name: "progress",
                description: "A short summary of what was generated.",
            },
        ],
    };
}

// --- Query optimization ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptimizationRequest {
    /// The MongoDB query to optimize.
    pub query: String,
    /// Details about the data model (schema) of the MongoDB collection.
    pub data_model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptimizationResult {
    /// The optimized MongoDB query.
    pub optimized_query: String,
    /// Explanation of the optimization techniques applied.
    pub explanation: String,
}

impl QueryOptimizationResult {
    pub const SHAPE: OutputShape = OutputShape {
        name: "QueryOptimizationResult",
        fields: &[
            OutputField {
                name: "optimizedQuery",
                description: "The optimized MongoDB query.",
            },
            OutputField {
                name: "explanation",
                description: "Explanation of the optimization techniques applied.",
            },
        ],
    };
}

// --- Index suggestion ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexSuggestionRequest {
    /// A detailed description of the MongoDB data model, including collections and fields.
    pub data_model_description: String,
    /// A description of common query patterns and operations performed on the database.
    pub query_patterns: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexSuggestionResult {
    /// A list of suggested MongoDB indexes with justifications for each suggestion.
    pub suggested_indexes: String,
}

impl IndexSuggestionResult {
    pub const SHAPE: OutputShape = OutputShape {
        name: "IndexSuggestionResult",
        fields: &[OutputField {
            name: "suggestedIndexes",
            description:
                "A list of suggested MongoDB indexes with justifications for each suggestion.",
        }],
    };
}

// --- AI Settings ---

pub const DEFAULT_PROVIDER: &str = "google";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Override for the provider endpoint (self-hosted ollama, proxies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_field_length: Option<usize>,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            model: default_model(),
            base_url: None,
            timeout_secs: None,
            min_field_length: None,
        }
    }
}

impl AiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn min_field_length(&self) -> usize {
        self.min_field_length.unwrap_or(DEFAULT_MIN_FIELD_LENGTH)
    }

    /// Layer `MONGOGENIUS_*` variables over the stored values. `lookup` is
    /// `std::env::var` in production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MONGOGENIUS_PROVIDER").filter(|v| !v.is_empty()) {
            self.provider = v;
        }
        if let Some(v) = lookup("MONGOGENIUS_MODEL").filter(|v| !v.is_empty()) {
            self.model = v;
        }
        if let Some(v) = lookup("MONGOGENIUS_API_KEY").filter(|v| !v.is_empty()) {
            self.api_key = v;
        }
        if let Some(v) = lookup("MONGOGENIUS_BASE_URL").filter(|v| !v.is_empty()) {
            self.base_url = Some(v);
        }
        if let Some(v) = lookup("MONGOGENIUS_TIMEOUT_SECS") {
            match v.parse() {
                Ok(secs) => self.timeout_secs = Some(secs),
                Err(_) => tracing::warn!("ignoring MONGOGENIUS_TIMEOUT_SECS={v:?}: not a number"),
            }
        }
        if let Some(v) = lookup("MONGOGENIUS_MIN_FIELD_LENGTH") {
            match v.parse() {
                Ok(len) => self.min_field_length = Some(len),
                Err(_) => {
                    tracing::warn!("ignoring MONGOGENIUS_MIN_FIELD_LENGTH={v:?}: not a number")
                }
            }
        }
    }
}

/// Resolve the settings directory: `$MONGOGENIUS_HOME`, else `~/.mongogenius/`.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("MONGOGENIUS_HOME") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mongogenius")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Read stored settings only. A missing or unreadable file yields defaults.
pub fn read_settings() -> AiSettings {
    read_settings_from(&settings_path())
}

pub fn read_settings_from(path: &Path) -> AiSettings {
    if !path.exists() {
        return AiSettings::default();
    }
    match fs::read_to_string(path).map(|s| serde_json::from_str::<AiSettings>(&s)) {
        Ok(Ok(settings)) => settings,
        Ok(Err(e)) => {
            tracing::warn!("{} is not valid settings JSON, using defaults: {e}", path.display());
            AiSettings::default()
        }
        Err(e) => {
            tracing::warn!("cannot read {}, using defaults: {e}", path.display());
            AiSettings::default()
        }
    }
}

/// Stored settings with environment overrides applied.
pub fn load_settings() -> AiSettings {
    let mut settings = read_settings();
    settings.apply_env(|key| std::env::var(key).ok());
    settings
}

pub fn write_settings(settings: &AiSettings) -> Result<(), String> {
    write_settings_to(&config_dir(), settings)
}

/// Atomic write (temp file + rename) so a concurrent reader never sees a
/// truncated file.
pub fn write_settings_to(dir: &Path, settings: &AiSettings) -> Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(settings).map_err(|e| e.to_string())?;
    let tmp = dir.join(".settings.json.tmp");
    fs::write(&tmp, json).map_err(|e| e.to_string())?;
    fs::rename(&tmp, dir.join("settings.json")).map_err(|e| e.to_string())
}

pub fn ai_configured(settings: &AiSettings) -> bool {
    !settings.provider.is_empty()
        && !settings.model.is_empty()
        && (settings.provider == "ollama" || !settings.api_key.is_empty())
}
