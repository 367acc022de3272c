use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::errors::ConfigurationError;

static ENV_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(\w+)\}").expect("valid placeholder pattern"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system_config: SystemConfig,
    pub llm_config: LlmConfig,
    pub retrieval_config: RetrievalConfig,
    #[serde(default)]
    pub form_store_config: Option<FormStoreConfig>,
    #[serde(default)]
    pub pipeline_config: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_filter() -> String {
    "govly_backend=debug,tower_http=info".to_string()
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_filter: default_log_filter(),
            cors_origins: Vec::new(),
        }
    }
}

/// Completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    pub llm_api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub fallback_model: Option<String>,
    /// Substring marking instruction-tuned model names during fallback discovery.
    #[serde(default = "default_instruct_marker")]
    pub instruct_marker: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_provider() -> String {
    "sea_lion".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.sea-lion.ai/v1".to_string()
}

fn default_model() -> String {
    "aisingapore/Llama-SEA-LION-v3-70B-IT".to_string()
}

fn default_instruct_marker() -> String {
    "-IT".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    8_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Retrieval gateway settings. The gateway embeds the query and runs the
/// vector match; we only choose the function and filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_document_function")]
    pub document_function: String,
    /// Category name -> dedicated document match function.
    #[serde(default)]
    pub category_functions: HashMap<String, String>,
    #[serde(default = "default_form_function")]
    pub form_function: String,
    /// Lowercased country name -> code expected by the gateway filters.
    #[serde(default = "default_country_codes")]
    pub country_codes: HashMap<String, String>,
    #[serde(default)]
    pub form_url_prefix: Option<String>,
}

fn default_retrieval_timeout() -> u64 {
    15
}

fn default_top_k() -> usize {
    3
}

fn default_document_function() -> String {
    "match_chunks".to_string()
}

fn default_form_function() -> String {
    "match_forms".to_string()
}

fn default_country_codes() -> HashMap<String, String> {
    [
        ("vietnam", "VN"),
        ("viet nam", "VN"),
        ("vn", "VN"),
        ("singapore", "SG"),
        ("sg", "SG"),
        ("malaysia", "MY"),
        ("my", "MY"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormStoreConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_form_table")]
    pub table: String,
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

fn default_form_table() -> String {
    "forms".to_string()
}

/// Sampling parameters for one kind of completion call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionSettings {
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self { temperature, max_tokens }
    }

    fn validate(&self, key: &str) -> Result<(), ConfigurationError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigurationError::InvalidValue {
                key: format!("pipeline_config.{key}.temperature"),
                reason: format!("{} is outside [0, 1]", self.temperature),
            });
        }
        if self.max_tokens == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: format!("pipeline_config.{key}.max_tokens"),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_intent")]
    pub intent: CompletionSettings,
    #[serde(default = "default_clarification")]
    pub clarification: CompletionSettings,
    #[serde(default = "default_advisory")]
    pub advisory: CompletionSettings,
    #[serde(default = "default_advisory")]
    pub agency: CompletionSettings,
    #[serde(default = "default_narration")]
    pub narration: CompletionSettings,
    #[serde(default = "default_forms")]
    pub extraction: CompletionSettings,
    #[serde(default = "default_forms")]
    pub fill: CompletionSettings,
    #[serde(default = "default_max_clarification_turns")]
    pub max_clarification_turns: usize,
    #[serde(default = "default_fill_history_window")]
    pub fill_history_window: usize,
    #[serde(default = "default_fill_history_limit")]
    pub fill_history_limit: usize,
}

fn default_intent() -> CompletionSettings {
    CompletionSettings::new(0.1, 150)
}

fn default_clarification() -> CompletionSettings {
    CompletionSettings::new(0.0, 10)
}

fn default_advisory() -> CompletionSettings {
    CompletionSettings::new(0.7, 300)
}

fn default_narration() -> CompletionSettings {
    CompletionSettings::new(0.3, 800)
}

fn default_forms() -> CompletionSettings {
    CompletionSettings::new(0.1, 2000)
}

fn default_max_clarification_turns() -> usize {
    5
}

fn default_fill_history_window() -> usize {
    10
}

fn default_fill_history_limit() -> usize {
    50
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            intent: default_intent(),
            clarification: default_clarification(),
            advisory: default_advisory(),
            agency: default_advisory(),
            narration: default_narration(),
            extraction: default_forms(),
            fill: default_forms(),
            max_clarification_turns: default_max_clarification_turns(),
            fill_history_window: default_fill_history_window(),
            fill_history_limit: default_fill_history_limit(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file, substituting `${VAR}`
    /// placeholders from the environment.
    pub fn load(path: &str) -> Result<Self, ConfigurationError> {
        let unreadable = |reason: String| ConfigurationError::Unreadable {
            path: path.to_string(),
            reason,
        };

        if !Path::new(path).exists() {
            return Err(unreadable("file not found".to_string()));
        }
        let raw = load_text_file_with_guess_encoding(path).map_err(|e| unreadable(e.to_string()))?;
        let content = substitute_env(&raw);

        let path_lower = path.to_lowercase();
        let config: Config = if path_lower.ends_with(".json") || path_lower.ends_with(".jsonld") {
            serde_json::from_str(&content).map_err(|e| unreadable(e.to_string()))?
        } else {
            serde_yaml::from_str(&content).map_err(|e| unreadable(e.to_string()))?
        };
        Ok(config)
    }

    /// Checks everything the pipelines assume about their settings.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        require_credential("llm_config.llm_api_key", &self.llm_config.llm_api_key)?;
        if let Some(store) = &self.form_store_config {
            require_credential("form_store_config.api_key", &store.api_key)?;
        }
        if self.llm_config.retry.max_attempts == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "llm_config.retry.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retrieval_config.top_k == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "retrieval_config.top_k".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let pipelines = &self.pipeline_config;
        pipelines.intent.validate("intent")?;
        pipelines.clarification.validate("clarification")?;
        pipelines.advisory.validate("advisory")?;
        pipelines.agency.validate("agency")?;
        pipelines.narration.validate("narration")?;
        pipelines.extraction.validate("extraction")?;
        pipelines.fill.validate("fill")?;
        if pipelines.fill_history_window == 0 || pipelines.fill_history_window > pipelines.fill_history_limit {
            return Err(ConfigurationError::InvalidValue {
                key: "pipeline_config.fill_history_window".to_string(),
                reason: "must be between 1 and fill_history_limit".to_string(),
            });
        }
        Ok(())
    }
}

fn require_credential(key: &str, value: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() || ENV_PLACEHOLDER.is_match(value) {
        return Err(ConfigurationError::MissingCredential { key: key.to_string() });
    }
    Ok(())
}

/// Replace `${VAR_NAME}` with the variable's value; unknown variables are left as-is.
pub fn substitute_env(content: &str) -> String {
    ENV_PLACEHOLDER
        .replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Read a text file, stripping a UTF-8 BOM and falling back to GBK decoding
/// when the bytes are not valid UTF-8.
pub fn load_text_file_with_guess_encoding(file_path: &str) -> std::io::Result<String> {
    let mut bytes = fs::read(file_path)?;
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        bytes.drain(0..3);
    }
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            debug!("{} is not valid UTF-8, decoding as GBK", file_path);
            let (cow, _, _) = encoding_rs::GBK.decode(err.as_bytes());
            Ok(cow.into_owned())
        }
    }
}
