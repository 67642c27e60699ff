//! Configuration loading.
//!
//! Everything is read from the process environment (optionally seeded from a
//! `.env` file). Identifiers that subscriptions depend on are optional here:
//! a missing account or contract only skips the subscriptions that need it.

// Rust guideline compliant 2026-02

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

use crate::constants;
use crate::hub::HubKind;

/// Configuration for the bridge process.
#[derive(Clone)]
pub struct Config {
    /// Base URL of the gateway hubs (`https://` or `wss://`).
    pub hub_url: String,
    /// Credential to start with, if the operator supplied one.
    pub initial_token: Option<String>,
    /// Account identifier used by user-hub subscriptions.
    pub account_id: Option<i64>,
    /// Instrument identifiers used by market-hub subscriptions.
    pub contract_ids: Vec<String>,
    /// Webhook receiving user-classified events.
    pub user_webhook_url: Option<String>,
    /// Webhook receiving market-classified events.
    pub market_webhook_url: Option<String>,
    /// Shared secret required on `POST /update-token`, when set.
    pub control_secret: Option<String>,
    /// Address the control endpoint binds to.
    pub bind_addr: String,
    /// Port the control endpoint listens on.
    pub port: u16,
    /// Hubs to run a session for.
    pub hubs: Vec<HubKind>,
    /// Reconnection backoff floor.
    pub reconnect_initial: Duration,
    /// Reconnection backoff ceiling.
    pub reconnect_max: Duration,
    /// Timeout of a single webhook delivery.
    pub forward_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub_url: constants::DEFAULT_HUB_URL.to_string(),
            initial_token: None,
            account_id: None,
            contract_ids: Vec::new(),
            user_webhook_url: None,
            market_webhook_url: None,
            control_secret: None,
            bind_addr: constants::DEFAULT_BIND_ADDR.to_string(),
            port: constants::DEFAULT_PORT,
            hubs: HubKind::ALL.to_vec(),
            reconnect_initial: constants::RECONNECT_INITIAL_DELAY,
            reconnect_max: constants::RECONNECT_MAX_DELAY,
            forward_timeout: constants::FORWARD_TIMEOUT,
        }
    }
}

// Secrets stay out of Debug output (and therefore out of logs).
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("hub_url", &self.hub_url)
            .field("initial_token", &self.initial_token.as_ref().map(|_| "<redacted>"))
            .field("account_id", &self.account_id)
            .field("contract_ids", &self.contract_ids)
            .field("user_webhook_url", &self.user_webhook_url)
            .field("market_webhook_url", &self.market_webhook_url)
            .field("control_secret", &self.control_secret.as_ref().map(|_| "<redacted>"))
            .field("bind_addr", &self.bind_addr)
            .field("port", &self.port)
            .field("hubs", &self.hubs)
            .field("reconnect_initial", &self.reconnect_initial)
            .field("reconnect_max", &self.reconnect_max)
            .field("forward_timeout", &self.forward_timeout)
            .finish()
    }
}

impl Config {
    /// Loads configuration from `.env` (if present) and the environment.
    pub fn load() -> Result<Self> {
        match dotenv::dotenv() {
            Ok(path) => log::info!("[Config] Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => log::warn!("[Config] Ignoring unreadable .env file: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// `load()` passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = get("GATEWAY_HUB_URL") {
            self.hub_url = url.trim_end_matches('/').to_string();
        }

        self.initial_token = get("GATEWAY_TOKEN");

        if let Some(account) = get("ACCOUNT_ID") {
            match account.parse::<i64>() {
                Ok(id) => self.account_id = Some(id),
                Err(_) => log::warn!(
                    "[Config] ACCOUNT_ID '{}' is not an integer; account subscriptions will be skipped",
                    account
                ),
            }
        }

        if let Some(contracts) = get("CONTRACT_IDS").or_else(|| get("CONTRACT_ID")) {
            self.contract_ids = contracts
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        self.user_webhook_url = get("USER_WEBHOOK_URL");
        self.market_webhook_url = get("MARKET_WEBHOOK_URL");
        self.control_secret = get("CONTROL_SECRET");

        if let Some(addr) = get("BIND_ADDR") {
            self.bind_addr = addr;
        }

        if let Some(port) = get("PORT") {
            self.port = port
                .parse::<u16>()
                .with_context(|| format!("PORT '{}' is not a valid port number", port))?;
        }

        if let Some(hubs) = get("HUBS") {
            let parsed = hubs
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::parse::<HubKind>)
                .collect::<Result<Vec<_>>>()?;
            self.hubs.clear();
            for hub in parsed {
                if !self.hubs.contains(&hub) {
                    self.hubs.push(hub);
                }
            }
        }

        if let Some(secs) = get("RECONNECT_INITIAL_SECS").and_then(|v| parse_secs("RECONNECT_INITIAL_SECS", &v)) {
            self.reconnect_initial = secs;
        }
        if let Some(secs) = get("RECONNECT_MAX_SECS").and_then(|v| parse_secs("RECONNECT_MAX_SECS", &v)) {
            self.reconnect_max = secs;
        }
        if let Some(secs) = get("FORWARD_TIMEOUT_SECS").and_then(|v| parse_secs("FORWARD_TIMEOUT_SECS", &v)) {
            self.forward_timeout = secs;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.hub_url)
            .with_context(|| format!("GATEWAY_HUB_URL '{}' is not a valid URL", self.hub_url))?;

        for (name, value) in [
            ("USER_WEBHOOK_URL", &self.user_webhook_url),
            ("MARKET_WEBHOOK_URL", &self.market_webhook_url),
        ] {
            if let Some(url) = value {
                url::Url::parse(url).with_context(|| format!("{} '{}' is not a valid URL", name, url))?;
            }
        }

        if self.hubs.is_empty() {
            bail!("HUBS must name at least one hub");
        }
        if self.reconnect_initial.is_zero() {
            bail!("RECONNECT_INITIAL_SECS must be greater than zero");
        }
        if self.reconnect_max < self.reconnect_initial {
            bail!("RECONNECT_MAX_SECS must not be smaller than RECONNECT_INITIAL_SECS");
        }
        Ok(())
    }

    /// Socket address of the control endpoint.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.bind_addr, self.port))
    }
}

fn parse_secs(name: &str, value: &str) -> Option<Duration> {
    match value.parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            log::warn!("[Config] {} '{}' is not a whole number of seconds; keeping default", name, value);
            None
        }
    }
}
