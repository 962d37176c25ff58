use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use url::Url;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub transit: TransitConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Public host Telegram delivers updates to
    #[serde(default = "default_webhook_host")]
    pub host: String,
    #[serde(default = "default_listen_address")]
    pub listen_address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: default_webhook_host(),
            listen_address: default_listen_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransitConfig {
    #[serde(default = "default_transit_base_url")]
    pub base_url: String,
}

impl Default for TransitConfig {
    fn default() -> Self {
        Self {
            base_url: default_transit_base_url(),
        }
    }
}

fn default_webhook_host() -> String {
    "transtgo-bot.herokuapp.com".to_string()
}

fn default_listen_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8443
}

fn default_transit_base_url() -> String {
    "https://api.scltrans.it".to_string()
}

impl Config {
    /// Load the optional TOML file, then apply the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override file values with environment variables looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // TS_TOKEN is the name older deployments used
        if let Some(token) = var("BOT_TOKEN").or_else(|| var("TS_TOKEN")) {
            self.telegram.bot_token = token;
        }

        if let Some(port) = var("PORT") {
            self.webhook.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {port}"))?;
        }

        if let Some(host) = var("WEBHOOK_HOST") {
            self.webhook.host = host;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            bail!("BOT_TOKEN is not set");
        }

        let base = Url::parse(&self.transit.base_url)
            .with_context(|| format!("Invalid transit base_url: {}", self.transit.base_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            bail!(
                "Transit base_url must be http or https: {}",
                self.transit.base_url
            );
        }

        Ok(())
    }

    /// Public URL registered with Telegram: `https://<host>/<token>`.
    pub fn webhook_url(&self) -> Result<Url> {
        let raw = format!("https://{}/{}", self.webhook.host, self.telegram.bot_token);
        Url::parse(&raw).with_context(|| format!("Invalid webhook host: {}", self.webhook.host))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.webhook.listen_address, self.webhook.port)
    }

    /// Token with everything but the bot id hidden, for log output.
    pub fn masked_token(&self) -> String {
        match self.telegram.bot_token.split_once(':') {
            Some((id, _)) => format!("{id}:***"),
            None => "***".to_string(),
        }
    }
}
