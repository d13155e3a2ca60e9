use crate::tools::market::MarketConfig;
use crate::tools::posts::PostsConfig;
use crate::tools::telegram::TelegramConfig;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: String,
    #[serde(
        default = "default_gemini_models",
        deserialize_with = "deserialize_list"
    )]
    pub gemini_models: Vec<String>,
    pub gemini_base_url: Option<String>,
    pub focus_topic: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_i32")]
    pub utc_offset_hours: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_option_u64")]
    pub candidate_delay_ms: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_option_u64")]
    pub call_timeout_secs: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_option_u64")]
    pub activation_max_tokens: Option<u64>,

    #[serde(flatten)]
    pub market: MarketConfig,
    #[serde(flatten)]
    pub telegram: TelegramConfig,
    #[serde(flatten)]
    pub posts: PostsConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = envy::prefixed("MARKETPOST_").from_env::<AppConfig>()?;
        anyhow::ensure!(
            !config.gemini_api_key.trim().is_empty(),
            "MARKETPOST_GEMINI_API_KEY must not be empty"
        );
        Ok(config)
    }

    pub fn focus_topic(&self) -> Option<&str> {
        self.focus_topic
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn gemini_base_url(&self) -> &str {
        self.gemini_base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or("https://generativelanguage.googleapis.com")
    }

    pub fn utc_offset_hours(&self) -> i32 {
        self.utc_offset_hours.unwrap_or(9)
    }

    pub fn candidate_delay(&self) -> Duration {
        Duration::from_millis(self.candidate_delay_ms.unwrap_or(0))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.unwrap_or(120))
    }
}

fn default_gemini_models() -> Vec<String> {
    [
        "gemini-2.0-flash",
        "gemini-2.5-flash",
        "gemini-2.5-pro",
        "gemini-3-flash-preview",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// Flattened structs hand every value over as a string, so numbers and
// lists are parsed by hand.

pub(crate) fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(s.split(',')
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect())
}

pub(crate) fn deserialize_option_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    if let Some(s) = s {
        s.trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom)
    } else {
        Ok(None)
    }
}

fn deserialize_option_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    if let Some(s) = s {
        s.trim()
            .parse::<i32>()
            .map(Some)
            .map_err(serde::de::Error::custom)
    } else {
        Ok(None)
    }
}
