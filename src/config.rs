use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openai,
    Openrouter,
    Ollama,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Openai => write!(f, "openai"),
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return &self.base_url;
        }
        match self.provider {
            LlmProvider::Openai => "https://api.openai.com/v1",
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    /// Literal that addresses the bot. Empty means every private message
    /// triggers the completion skill.
    #[serde(default)]
    pub trigger_keyword: String,
    /// Group-chat stand-ins for an "@mention"; matched whitespace-insensitively
    /// because clients render mentions inconsistently.
    #[serde(default = "default_aliases")]
    pub aliases: Vec<String>,
    /// Drop messages sent by the bot account itself.
    #[serde(default)]
    pub suppress_self_chat: bool,
    /// Maximum characters per outgoing reply segment.
    #[serde(default = "default_segment_max_chars")]
    pub segment_max_chars: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            trigger_keyword: String::new(),
            aliases: default_aliases(),
            suppress_self_chat: false,
            segment_max_chars: default_segment_max_chars(),
        }
    }
}

/// Per-skill enable flags. All skills are on by default.
#[derive(Debug, Deserialize, Clone)]
pub struct SkillsConfig {
    #[serde(default = "default_true")]
    pub echo: bool,
    #[serde(default = "default_true")]
    pub draw: bool,
    #[serde(default = "default_true")]
    pub interpret: bool,
    #[serde(default = "default_true")]
    pub daily_quote: bool,
    #[serde(default = "default_true")]
    pub completion: bool,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            echo: true,
            draw: true,
            interpret: true,
            daily_quote: true,
            completion: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    /// Trusted time endpoint; its date is the day boundary for all gating.
    #[serde(default = "default_time_url")]
    pub time_url: String,
    /// JSON array of sign entries, fetched once and cached for the process.
    #[serde(default = "default_sign_data_url")]
    pub sign_data_url: String,
    /// Quote batch endpoint for the daily-quote skill.
    #[serde(default = "default_quote_url")]
    pub quote_url: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            time_url: default_time_url(),
            sign_data_url: default_sign_data_url(),
            quote_url: default_quote_url(),
        }
    }
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.8
}

fn default_system_prompt() -> String {
    "You are ChatGPT, a large language model trained by OpenAI. \
     Answer as concisely as possible.\nKnowledge cutoff: 2021-09-01"
        .to_string()
}

fn default_aliases() -> Vec<String> {
    vec![
        "@220".to_string(),
        "@平安喜乐".to_string(),
        "@赛博算命".to_string(),
    ]
}

fn default_segment_max_chars() -> usize {
    500
}

fn default_true() -> bool {
    true
}

fn default_time_url() -> String {
    "https://quan.suning.com/getSysTime.do".to_string()
}

fn default_sign_data_url() -> String {
    "https://docs.hdfk7.cn/static/000f.json".to_string()
}

fn default_quote_url() -> String {
    "https://www.mxnzp.com/api/daily_word/recommend?count=10".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
