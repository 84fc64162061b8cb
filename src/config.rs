//! Bot configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub referral: ReferralConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Public username, used to build referral deep links
    #[serde(default = "default_username")]
    pub username: String,

    /// Handle shown by the support menu entry
    #[serde(default = "default_support_contact")]
    pub support_contact: String,

    /// Chat that receives order summaries and may confirm/reject them
    #[serde(default)]
    pub operator_chat_id: i64,

    /// Greeting shown with the main menu
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,

    /// Optional file overriding `welcome_message`
    #[serde(default)]
    pub welcome_message_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralConfig {
    /// Referral count at which purchases become discounted
    #[serde(default = "default_discount_threshold")]
    pub discount_threshold: u32,

    #[serde(default = "default_discount_percent")]
    pub discount_percent: u32,

    #[serde(default = "default_code_length")]
    pub code_length: usize,

    /// Collision retries before minting gives up
    #[serde(default = "default_max_mint_attempts")]
    pub max_mint_attempts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "default_challenge_options")]
    pub challenge_options: Vec<String>,

    #[serde(default = "default_correct_option")]
    pub correct_option: String,

    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the sled database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

// Defaults
fn default_username() -> String { "ShopBot".to_string() }
fn default_support_contact() -> String { "@support".to_string() }
fn default_welcome_message() -> String { "Welcome to our shop!".to_string() }
fn default_catalog_path() -> PathBuf { PathBuf::from("data/products.json") }
fn default_discount_threshold() -> u32 { 5 }
fn default_discount_percent() -> u32 { 5 }
fn default_code_length() -> usize { 6 }
fn default_max_mint_attempts() -> usize { 16 }
fn default_challenge_options() -> Vec<String> {
    ["🍎", "⏰", "🍏", "🍊"].iter().map(|s| s.to_string()).collect()
}
fn default_correct_option() -> String { "⏰".to_string() }
fn default_regions() -> Vec<String> {
    vec!["Almaty".to_string(), "Astana".to_string()]
}
fn default_data_dir() -> PathBuf { PathBuf::from("data/bot.sled") }

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            support_contact: default_support_contact(),
            operator_chat_id: 0,
            welcome_message: default_welcome_message(),
            welcome_message_path: None,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { path: default_catalog_path() }
    }
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            discount_threshold: default_discount_threshold(),
            discount_percent: default_discount_percent(),
            code_length: default_code_length(),
            max_mint_attempts: default_max_mint_attempts(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            challenge_options: default_challenge_options(),
            correct_option: default_correct_option(),
            regions: default_regions(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl Config {
    /// Read a TOML config file, or fall back to defaults when it is absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl BotConfig {
    /// Greeting text; an unreadable override file falls back to the inline message.
    pub fn load_welcome(&self) -> String {
        let Some(path) = &self.welcome_message_path else {
            return self.welcome_message.clone();
        };
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => self.welcome_message.clone(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Welcome message file unreadable");
                self.welcome_message.clone()
            }
        }
    }

    /// `https://t.me/<username>?start=<code>`
    pub fn referral_link(&self, code: &str) -> String {
        format!("https://t.me/{}?start={}", self.username, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[bot]
username = "BayterekBot"
operator_chat_id = 42

[referral]
discount_threshold = 3
"#,
        )
        .unwrap();

        assert_eq!(config.bot.username, "BayterekBot");
        assert_eq!(config.bot.operator_chat_id, 42);
        assert_eq!(config.bot.support_contact, "@support");
        assert_eq!(config.referral.discount_threshold, 3);
        assert_eq!(config.referral.discount_percent, 5);
        assert_eq!(config.referral.code_length, 6);
        assert_eq!(config.verification.correct_option, "⏰");
        assert_eq!(config.verification.regions, vec!["Almaty", "Astana"]);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.referral.discount_percent, 5);
    }

    #[test]
    fn referral_link_uses_username() {
        let bot = BotConfig::default();
        assert_eq!(bot.referral_link("AB12CD"), "https://t.me/ShopBot?start=AB12CD");
    }
}
