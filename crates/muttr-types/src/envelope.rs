// ============================================================================
// Envelopes and Inboxes
// ============================================================================
//
// An envelope is a store-and-forward record pointing at an opaque ciphertext
// blob by its content-reference key. The pod never sees the blob itself.
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a content-reference key in hex characters
pub const CONTENT_KEY_LENGTH: usize = 40;

/// One side of an envelope: the opaque user id and the resolved identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub pubkeyhash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub recipient: Party,
    pub sender: Party,
    pub key: String,
    pub timestamp: DateTime<Utc>,
}

/// Envelopes from one sender, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub messages: Vec<Envelope>,
}

/// Validate a content-reference key: exactly 40 hex characters
pub fn validate_content_key(key: &str) -> Result<(), ContentKeyError> {
    if key.len() != CONTENT_KEY_LENGTH {
        return Err(ContentKeyError::Length(key.len()));
    }
    if !key.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ContentKeyError::NotHex);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentKeyError {
    #[error("Content key must be 40 hex characters, got {0}")]
    Length(usize),
    #[error("Content key must be hexadecimal")]
    NotHex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_validation() {
        assert!(validate_content_key("0123456789012345678901234567890123456789").is_ok());
        assert!(validate_content_key("abcdefABCDEF0123456789abcdef0123456789ab").is_ok());
        assert_eq!(
            validate_content_key("0123"),
            Err(ContentKeyError::Length(4))
        );
        assert_eq!(
            validate_content_key("g123456789012345678901234567890123456789"),
            Err(ContentKeyError::NotHex)
        );
    }

    #[test]
    fn test_envelope_json_uses_user_id_spelling() {
        let envelope = Envelope {
            recipient: Party {
                user_id: "alice".into(),
                pubkeyhash: "aaa".into(),
            },
            sender: Party {
                user_id: "bob@pod.net".into(),
                pubkeyhash: "bbb".into(),
            },
            key: "0123456789012345678901234567890123456789".into(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["recipient"]["userID"], "alice");
        assert_eq!(value["sender"]["pubkeyhash"], "bbb");
    }
}
