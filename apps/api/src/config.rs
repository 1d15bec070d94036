use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub google_api_key: String,
    pub gemini_base_url: String,
    pub port: u16,
    pub rust_log: String,
    pub rate_limit: RateLimitConfig,
    pub chat_limits: ChatLimits,
    pub system_prompt_path: Option<PathBuf>,
}

/// Fixed-window rate limiting applied per client key on the chat endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window: Duration,
}

/// Bounds on the conversation a client may submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatLimits {
    pub max_messages: usize,
    pub max_message_length: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 20,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            max_messages: 50,
            max_message_length: 4000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let rate_limit = RateLimitConfig {
            enabled: optional_env("CHAT_RATE_LIMIT_ENABLED", true)?,
            max_requests: optional_env("CHAT_RATE_LIMIT_MAX_REQUESTS", 20)?,
            window: Duration::from_secs(optional_env("CHAT_RATE_LIMIT_WINDOW_SECS", 60)?),
        };
        if rate_limit.max_requests == 0 {
            bail!("CHAT_RATE_LIMIT_MAX_REQUESTS must be greater than zero");
        }
        if rate_limit.window.is_zero() {
            bail!("CHAT_RATE_LIMIT_WINDOW_SECS must be greater than zero");
        }

        let chat_limits = ChatLimits {
            max_messages: optional_env("CHAT_MAX_MESSAGES", 50)?,
            max_message_length: optional_env("CHAT_MAX_MESSAGE_LENGTH", 4000)?,
        };
        if chat_limits.max_messages == 0 {
            bail!("CHAT_MAX_MESSAGES must be greater than zero");
        }
        if chat_limits.max_message_length == 0 {
            bail!("CHAT_MAX_MESSAGE_LENGTH must be greater than zero");
        }

        Ok(Config {
            google_api_key: require_env("GOOGLE_API_KEY")?,
            gemini_base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
            port: optional_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            rate_limit,
            chat_limits,
            system_prompt_path: std::env::var("CHAT_SYSTEM_PROMPT_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// Returns the persona instruction sent with every upstream call.
    /// A configured prompt file replaces the built-in instruction.
    pub fn load_system_instruction(&self) -> Result<String> {
        match &self.system_prompt_path {
            Some(path) => {
                let text = std::fs::read_to_string(path).with_context(|| {
                    format!(
                        "CHAT_SYSTEM_PROMPT_PATH '{}' could not be read",
                        path.display()
                    )
                })?;
                if text.trim().is_empty() {
                    bail!("CHAT_SYSTEM_PROMPT_PATH '{}' is empty", path.display());
                }
                Ok(text)
            }
            None => Ok(crate::chat::prompts::system_instruction()),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_prompt(path: Option<PathBuf>) -> Config {
        Config {
            google_api_key: "key".to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            port: 8080,
            rust_log: "info".to_string(),
            rate_limit: RateLimitConfig::default(),
            chat_limits: ChatLimits::default(),
            system_prompt_path: path,
        }
    }

    #[test]
    fn test_optional_env_uses_default_when_unset() {
        let value: u32 = optional_env("PORTFOLIO_API_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_optional_env_rejects_garbage() {
        std::env::set_var("PORTFOLIO_API_TEST_GARBAGE", "twenty");
        let result: Result<u32> = optional_env("PORTFOLIO_API_TEST_GARBAGE", 20);
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("PORTFOLIO_API_TEST_GARBAGE"));
    }

    #[test]
    fn test_optional_env_parses_bool() {
        std::env::set_var("PORTFOLIO_API_TEST_BOOL", "false");
        let value: bool = optional_env("PORTFOLIO_API_TEST_BOOL", true).unwrap();
        assert!(!value);
    }

    #[test]
    fn test_builtin_system_instruction_when_no_path() {
        let config = config_with_prompt(None);
        let instruction = config.load_system_instruction().unwrap();
        assert!(instruction.contains("KNOWLEDGE BASE"));
    }

    #[test]
    fn test_prompt_file_replaces_builtin_instruction() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "You are a test persona.").unwrap();
        let config = config_with_prompt(Some(file.path().to_path_buf()));
        let instruction = config.load_system_instruction().unwrap();
        assert_eq!(instruction.trim(), "You are a test persona.");
    }

    #[test]
    fn test_missing_prompt_file_fails() {
        let config = config_with_prompt(Some(PathBuf::from("/nonexistent/persona.txt")));
        let err = config.load_system_instruction().unwrap_err();
        assert!(err.to_string().contains("CHAT_SYSTEM_PROMPT_PATH"));
    }
}
