use anyhow::{bail, Result};
use std::time::Duration;

const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(clap::Args, Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret for admin tokens (at least 32 characters).
    #[arg(long, env = "JWT_SECRET", default_value = "", hide_env_values = true)]
    pub jwt_secret: String,

    #[arg(long, env = "JWT_EXPIRE_MINUTES", default_value_t = 10080)]
    pub jwt_expire_minutes: i64,
}

impl AuthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            bail!("JWT_SECRET must be set and at least {MIN_JWT_SECRET_LEN} characters long");
        }
        if self.jwt_expire_minutes <= 0 {
            bail!("JWT_EXPIRE_MINUTES must be positive");
        }
        Ok(())
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct TelegramConfig {
    #[arg(long, env = "BOT_TOKEN", default_value = "", hide_env_values = true)]
    pub bot_token: String,

    /// Chat that receives new orders and customer pings.
    #[arg(long, env = "KITCHEN_CHAT_ID", default_value = "")]
    pub kitchen_chat_id: String,

    /// Bot username used to build per-table deep links (`t.me/<bot>?start=<code>`).
    #[arg(long, env = "BOT_USERNAME")]
    pub bot_username: Option<String>,

    #[arg(long, env = "TELEGRAM_API_BASE", default_value = "https://api.telegram.org")]
    pub api_base: String,

    #[arg(long, env = "TELEGRAM_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    #[arg(long, env = "APP_BASE_URL")]
    pub app_base_url: Option<String>,

    #[arg(long, env = "TELEGRAM_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    #[arg(
        long,
        env = "TELEGRAM_AUTO_SET_WEBHOOK",
        action = clap::ArgAction::Set,
        default_value_t = false,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub auto_set_webhook: bool,

    #[arg(long, env = "TELEGRAM_TIMEOUT_SECS", default_value_t = 20)]
    pub timeout_secs: u64,
}

impl TelegramConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            bail!("BOT_TOKEN is required");
        }
        if self.kitchen_chat_id.trim().is_empty() {
            bail!("KITCHEN_CHAT_ID is required");
        }
        if self.timeout_secs == 0 {
            bail!("TELEGRAM_TIMEOUT_SECS must be positive");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Explicit webhook URL, else `<APP_BASE_URL>/telegram/webhook`.
    pub fn resolved_webhook_url(&self) -> Option<String> {
        let explicit = self.webhook_url.as_deref().map(str::trim).filter(|u| !u.is_empty());
        if let Some(url) = explicit {
            return Some(url.to_string());
        }
        self.app_base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|base| format!("{}/telegram/webhook", base.trim_end_matches('/')))
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn bot_username(&self) -> Option<&str> {
        self.bot_username
            .as_deref()
            .map(|u| u.trim().trim_start_matches('@'))
            .filter(|u| !u.is_empty())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn telegram_config() -> TelegramConfig {
        TelegramConfig {
            bot_token: "123:abc".into(),
            kitchen_chat_id: "-100200".into(),
            bot_username: Some("@table_order_bot".into()),
            api_base: "http://127.0.0.1:9".into(),
            webhook_url: None,
            app_base_url: None,
            webhook_secret: None,
            auto_set_webhook: false,
            timeout_secs: 1,
        }
    }

    pub(crate) fn auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef".into(),
            jwt_expire_minutes: 60,
        }
    }

    #[test]
    fn missing_mandatory_fields_fail_fast() {
        let mut cfg = telegram_config();
        cfg.bot_token = " ".into();
        assert!(cfg.validate().is_err());

        let mut cfg = telegram_config();
        cfg.kitchen_chat_id.clear();
        assert!(cfg.validate().unwrap_err().to_string().contains("KITCHEN_CHAT_ID"));

        assert!(telegram_config().validate().is_ok());

        let mut auth = auth_config();
        auth.jwt_secret = "short".into();
        assert!(auth.validate().is_err());
        assert!(auth_config().validate().is_ok());
    }

    #[test]
    fn webhook_url_falls_back_to_app_base_url() {
        let mut cfg = telegram_config();
        assert_eq!(cfg.resolved_webhook_url(), None);

        cfg.app_base_url = Some("https://food.example.com/".into());
        assert_eq!(
            cfg.resolved_webhook_url().as_deref(),
            Some("https://food.example.com/telegram/webhook")
        );

        cfg.webhook_url = Some("https://hooks.example.com/tg".into());
        assert_eq!(cfg.resolved_webhook_url().as_deref(), Some("https://hooks.example.com/tg"));
    }

    #[test]
    fn bot_username_drops_at_sign() {
        assert_eq!(telegram_config().bot_username(), Some("table_order_bot"));
        let mut cfg = telegram_config();
        cfg.bot_username = Some("  ".into());
        assert_eq!(cfg.bot_username(), None);
    }
}
