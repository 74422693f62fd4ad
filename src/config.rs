use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HTTPConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub queue: Option<QueueConfig>,
}
impl AppConfig {
    pub fn load(config_filepath: Option<PathBuf>) -> Result<Self> {
        let config_path = config_filepath.unwrap_or_else(|| PathBuf::from("config.toml"));

        let config_content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;

        let mut config: AppConfig = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse TOML config file: {config_path:?}"))?;

        // Secrets never live in the config file. They are captured from the
        // environment exactly once here and injected everywhere else.
        config.ai.api_key = std::env::var("GEMINI_API_KEY").ok();
        if let Some(queue) = config.queue.as_mut() {
            queue.token = std::env::var("QUEUE_TOKEN").ok();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.delivery.strategy == DeliveryStrategy::Queue {
            let Some(queue) = &self.queue else {
                bail!("Delivery strategy is 'queue' but no [queue] section is configured!");
            };
            if queue.token.is_none() {
                bail!("Missing required QUEUE_TOKEN environment variable, and the 'queue' delivery strategy is enabled!");
            }
        }
        Ok(())
    }
}

/// How requests carrying a callback address are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStrategy {
    /// Acknowledge, then generate and deliver from an in-process worker.
    /// In-flight answers are lost on restart.
    Background,

    /// Acknowledge after handing the job to the external broker, which
    /// re-delivers it to the job intake route at least once.
    Queue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_delivery_strategy")]
    pub strategy: DeliveryStrategy,

    /// Answer callback-less requests inline instead of rejecting them.
    #[serde(default = "default_true")]
    pub allow_synchronous: bool,
}
impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            strategy: default_delivery_strategy(),
            allow_synchronous: default_true(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_ai_model")]
    pub model: String,

    #[serde(default = "default_ai_temperature")]
    pub temperature: f32,

    /// The platform waits far longer on a callback than the 5s direct
    /// budget, but the generation call still needs a hard ceiling.
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,

    /// Captured from the GEMINI_API_KEY environment variable at load time.
    #[serde(skip)]
    pub api_key: Option<String>,
}
impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ai_endpoint(),
            model: default_ai_model(),
            temperature: default_ai_temperature(),
            timeout_secs: default_ai_timeout_secs(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Broker publish endpoint. The forwarding destination is appended.
    #[serde(default = "default_queue_publish_url")]
    pub publish_url: String,

    /// Public base URL of this deployment, used by the broker to reach the
    /// job intake route.
    pub public_url: String,

    /// Captured from the QUEUE_TOKEN environment variable at load time.
    #[serde(skip)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HTTPConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_http_address")]
    pub address: SocketAddr,

    #[serde(default)]
    pub tls: Option<TLSConfig>,
}
impl Default for HTTPConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            address: default_http_address(),
            tls: None,
        }
    }
}

#[cfg_attr(
    not(any(feature = "tls-rustls", feature = "tls-native")),
    allow(dead_code)
)]
#[derive(Debug, Clone, Deserialize)]
pub struct TLSConfig {
    #[serde(deserialize_with = "deserialize_existing_file")]
    pub certificate_path: PathBuf,

    #[serde(deserialize_with = "deserialize_existing_file")]
    pub key_path: PathBuf,
}

fn default_delivery_strategy() -> DeliveryStrategy {
    DeliveryStrategy::Background
}
fn default_ai_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_ai_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_ai_temperature() -> f32 {
    0.7
}
fn default_ai_timeout_secs() -> u64 {
    25
}
fn default_queue_publish_url() -> String {
    "https://qstash.upstash.io/v2/publish".to_string()
}
fn default_true() -> bool {
    true
}
fn default_http_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 3000)
}

fn deserialize_existing_file<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let path = PathBuf::deserialize(deserializer)?;
    if !path.exists() {
        return Err(serde::de::Error::custom(format!(
            "File does not exist: {}",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(serde::de::Error::custom(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }
    Ok(path)
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_config() {
        let config: AppConfig = toml::from_str("").unwrap();

        assert!(config.http.enabled);
        assert_eq!(config.http.address, default_http_address());
        assert_eq!(config.ai.model, "gemini-1.5-flash");
        assert_eq!(config.ai.temperature, 0.7);
        assert_eq!(config.ai.timeout_secs, 25);
        assert_eq!(config.ai.api_key, None);
        assert_eq!(config.delivery.strategy, DeliveryStrategy::Background);
        assert!(config.delivery.allow_synchronous);
        assert!(config.queue.is_none());
    }

    #[test]
    fn test_delivery_strategy_parsing() {
        let config: AppConfig = toml::from_str(
            r#"
            [delivery]
            strategy = "queue"
            allow_synchronous = false

            [queue]
            public_url = "https://skill.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.delivery.strategy, DeliveryStrategy::Queue);
        assert!(!config.delivery.allow_synchronous);

        let queue = config.queue.unwrap();
        assert_eq!(queue.public_url, "https://skill.example.com");
        assert_eq!(queue.publish_url, default_queue_publish_url());
        assert_eq!(queue.token, None, "Token must never come from the file");

        let err = toml::from_str::<AppConfig>("[delivery]\nstrategy = \"pigeon\"").unwrap_err();
        assert!(err.to_string().contains("pigeon"));
    }

    #[test]
    fn test_validate_queue_strategy_requirements() {
        // Queue strategy without a [queue] section must fail fast.
        let config: AppConfig = toml::from_str("[delivery]\nstrategy = \"queue\"").unwrap();
        let err = config.validate().unwrap_err();
        assert!(
            err.to_string().contains("no [queue] section"),
            "Expected missing queue section error, got: {err}"
        );

        // Queue strategy without a broker token must fail fast too.
        let config: AppConfig = toml::from_str(
            "[delivery]\nstrategy = \"queue\"\n[queue]\npublic_url = \"https://a.example\"",
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(
            err.to_string().contains("QUEUE_TOKEN"),
            "Expected missing token error, got: {err}"
        );

        // Background strategy needs neither.
        let config: AppConfig = toml::from_str("").unwrap();
        config.validate().unwrap();
    }
}
