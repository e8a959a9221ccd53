use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered public key
///
/// `pubkeyhash` is derived from `pubkey` and is the canonical identifier.
/// `last_nonce` is the replay ledger: it only ever increases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub pubkey: String,
    pub pubkeyhash: String,
    #[serde(default)]
    pub last_nonce: u64,
    pub registered: DateTime<Utc>,
}

impl Identity {
    pub fn new(pubkey: String, pubkeyhash: String) -> Self {
        Self {
            pubkey,
            pubkeyhash,
            last_nonce: 0,
            registered: Utc::now(),
        }
    }

    /// Whether `nonce` would advance the replay ledger
    pub fn accepts_nonce(&self, nonce: u64) -> bool {
        nonce > self.last_nonce
    }
}

/// A human-readable name bound to exactly one identity on this pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alias {
    pub name: String,
    pub pubkeyhash: String,
    pub created: DateTime<Utc>,
}

impl Alias {
    pub fn new(name: impl Into<String>, pubkeyhash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pubkeyhash: pubkeyhash.into(),
            created: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_identity_starts_at_zero() {
        let identity = Identity::new("key".into(), "hash".into());
        assert_eq!(identity.last_nonce, 0);
        assert!(identity.accepts_nonce(1));
        assert!(!identity.accepts_nonce(0));
    }

    #[test]
    fn test_identity_json_shape() {
        let identity = Identity::new("key".into(), "hash".into());
        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["pubkeyhash"], "hash");
        assert_eq!(value["lastNonce"], 0);
        assert!(value.get("registered").is_some());
    }
}
