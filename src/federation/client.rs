// ============================================================================
// Federation Client - Fetch public keys from remote pods
// ============================================================================

use muttr_crypto::{ArmorError, PublicKey};
use muttr_types::PeerAddress;
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::FederationConfig;
use crate::metrics;

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("Remote pod answered {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Federation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Remote pod returned an invalid public key: {0}")]
    InvalidKey(#[from] ArmorError),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl FederationError {
    /// The remote pod answered but has no such identity
    pub fn is_not_found(&self) -> bool {
        matches!(self, FederationError::Status { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
    }
}

/// HTTP client for other pods' public alias endpoints
#[derive(Clone)]
pub struct FederationClient {
    http_client: reqwest::Client,
    scheme: String,
}

impl FederationClient {
    pub fn new(config: &FederationConfig) -> Result<Self, FederationError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FederationError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            scheme: config.scheme.clone(),
        })
    }

    /// Where a pod publishes the key bound to `address.alias`
    pub fn alias_url(&self, address: &PeerAddress) -> String {
        format!("{}://{}/aliases/{}", self.scheme, address.host, address.alias)
    }

    /// Resolve `alias@host` to the public key its home pod publishes
    pub async fn lookup_alias(&self, address: &PeerAddress) -> Result<PublicKey, FederationError> {
        let url = self.alias_url(address);
        self.fetch_key(&url).await
    }

    /// GET an armored public key from `url`
    ///
    /// Anything other than 200 is an error; 404 reads as "no such identity".
    pub async fn fetch_key(&self, url: &str) -> Result<PublicKey, FederationError> {
        tracing::debug!(url = %url, "Fetching remote public key");

        let result = self.fetch_key_inner(url).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) if e.is_not_found() => "not_found",
            Err(_) => "error",
        };
        metrics::FEDERATION_LOOKUPS_TOTAL
            .with_label_values(&[outcome])
            .inc();

        if let Err(e) = &result {
            tracing::warn!(url = %url, error = %e, "Remote public key lookup failed");
        }
        result
    }

    async fn fetch_key_inner(&self, url: &str) -> Result<PublicKey, FederationError> {
        let response = self.http_client.get(url).send().await?;

        if response.status() != StatusCode::OK {
            return Err(FederationError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let armored = response.text().await?;
        Ok(PublicKey::from_armored(&armored)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_url_uses_configured_scheme() {
        let config = FederationConfig {
            scheme: "http".into(),
            ..FederationConfig::default()
        };
        let client = FederationClient::new(&config).unwrap();
        let address = PeerAddress::parse("bob@pod.example.com:8080").unwrap();

        assert_eq!(
            client.alias_url(&address),
            "http://pod.example.com:8080/aliases/bob"
        );
    }

    #[test]
    fn test_only_404_is_not_found() {
        let missing = FederationError::Status {
            url: "u".into(),
            status: 404,
        };
        let broken = FederationError::Status {
            url: "u".into(),
            status: 500,
        };
        assert!(missing.is_not_found());
        assert!(!broken.is_not_found());
        assert!(!FederationError::InvalidKey(ArmorError::Empty).is_not_found());
    }
}
