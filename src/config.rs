use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    #[serde(default = "default_history_config")]
    pub history: HistoryConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Bot username without the leading '@', used to recognize mentions.
    pub bot_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Full-capability tier used when the bot answers the user directly.
    pub standard: TierConfig,
    /// Cheaper tier used for introductions and context-only replies.
    pub cost_efficient: TierConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TierConfig {
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    /// How many of the most recent turns survive the history window.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChatConfig {
    /// Appended to every forwarded user text before it reaches the model
    /// (may be empty).
    #[serde(default)]
    pub message_suffix: String,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful and friendly assistant in a Telegram chat. \
     Keep your answers short and conversational."
        .to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_db_path() -> PathBuf {
    PathBuf::from("relaybot.db")
}

fn default_max_turns() -> usize {
    40
}

fn default_history_config() -> HistoryConfig {
    HistoryConfig {
        database_path: default_db_path(),
        max_turns: default_max_turns(),
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"
            bot_id = "relaybot"

            [llm]
            api_key = "sk-test"
            standard = { model = "claude-sonnet-4-5" }
            cost_efficient = { model = "claude-haiku-4-5" }
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.base_url, "https://api.anthropic.com");
        assert_eq!(config.llm.standard.max_tokens, 1024);
        assert_eq!(config.history.max_turns, 40);
        assert_eq!(config.chat.message_suffix, "");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config: Config = toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"
            bot_id = "relaybot"

            [llm]
            api_key = "sk-test"
            standard = { model = "big", max_tokens = 2048 }
            cost_efficient = { model = "small", max_tokens = 256 }

            [history]
            database_path = "custom.db"
            max_turns = 10

            [chat]
            message_suffix = " (via relaybot)"
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.cost_efficient.max_tokens, 256);
        assert_eq!(config.history.max_turns, 10);
        assert_eq!(config.chat.message_suffix, " (via relaybot)");
    }
}
