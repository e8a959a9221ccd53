use anyhow::Result;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BUS_PORT: u16 = 8081;
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_PUBLIC_ADDRESS: &str = "localhost:8080";

const DEFAULT_FEDERATION_SCHEME: &str = "https";
const DEFAULT_FEDERATION_TIMEOUT_SECS: u64 = 10;

// The TTL itself is fixed; this only controls how often expired tokens are purged
const DEFAULT_TOKEN_SWEEP_INTERVAL_SECS: u64 = 5;

/// Largest request body the authentication stage will buffer
pub const MAX_REQUEST_BODY_SIZE: usize = 2 * 1024 * 1024; // 2 MB

// ============================================================================
// Configuration Structures
// ============================================================================

/// Outbound requests to other pods
#[derive(Clone, Debug)]
pub struct FederationConfig {
    /// "https" in production; integration tests run plain "http"
    pub scheme: String,
    /// Upper bound for a single remote key fetch
    pub timeout: Duration,
}

impl FederationConfig {
    fn from_env() -> Result<Self> {
        let scheme = env_or("FEDERATION_SCHEME", DEFAULT_FEDERATION_SCHEME);
        if scheme != "https" && scheme != "http" {
            anyhow::bail!("FEDERATION_SCHEME must be 'https' or 'http', got '{}'", scheme);
        }

        Ok(Self {
            scheme,
            timeout: Duration::from_secs(parse_env(
                "FEDERATION_TIMEOUT_SECS",
                DEFAULT_FEDERATION_TIMEOUT_SECS,
            )?),
        })
    }
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_FEDERATION_SCHEME.to_string(),
            timeout: Duration::from_secs(DEFAULT_FEDERATION_TIMEOUT_SECS),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Host (and optional port) other pods use to reach this one.
    /// Senders addressed as `alias@<public_address>` are resolved locally.
    pub public_address: String,
    pub bind_address: String,
    pub port: u16,
    /// Push-channel (WebSocket) listener
    pub bus_port: u16,
    /// PostgreSQL for identities, aliases, envelopes and DHT entries.
    /// When unset everything lives in memory.
    pub database_url: Option<String>,
    /// Redis for capability tokens. When unset tokens live in memory.
    pub redis_url: Option<String>,
    pub federation: FederationConfig,
    pub token_sweep_interval: Duration,
    /// Redirect requests that did not arrive over TLS
    pub force_https: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            public_address: env_or("POD_PUBLIC_ADDRESS", DEFAULT_PUBLIC_ADDRESS),
            bind_address: env_or("BIND_ADDRESS", DEFAULT_BIND_ADDRESS),
            port: parse_env("PORT", DEFAULT_PORT)?,
            bus_port: parse_env("BUS_PORT", DEFAULT_BUS_PORT)?,
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            federation: FederationConfig::from_env()?,
            token_sweep_interval: Duration::from_secs(parse_env(
                "TOKEN_SWEEP_INTERVAL_SECS",
                DEFAULT_TOKEN_SWEEP_INTERVAL_SECS,
            )?),
            force_https: parse_env("FORCE_HTTPS", false)?,
        })
    }

    /// In-memory configuration answering to `public_address`
    pub fn local(public_address: impl Into<String>) -> Self {
        Self {
            public_address: public_address.into(),
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            bus_port: 0,
            database_url: None,
            redis_url: None,
            federation: FederationConfig::default(),
            token_sweep_interval: Duration::from_secs(DEFAULT_TOKEN_SWEEP_INTERVAL_SECS),
            force_https: false,
        }
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn bus_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.bus_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::local(DEFAULT_PUBLIC_ADDRESS)
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_config() {
        let config = Config::local("pod.example.com");
        assert_eq!(config.public_address, "pod.example.com");
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
        assert_eq!(config.federation.scheme, "https");
        assert_eq!(config.http_addr(), "127.0.0.1:0");
    }

    #[test]
    fn test_parse_env_default_and_error() {
        assert_eq!(parse_env("MUTTR_TEST_UNSET_VARIABLE", 42u16).unwrap(), 42);

        std::env::set_var("MUTTR_TEST_BAD_PORT", "not-a-port");
        assert!(parse_env::<u16>("MUTTR_TEST_BAD_PORT", 1).is_err());
        std::env::remove_var("MUTTR_TEST_BAD_PORT");
    }
}
