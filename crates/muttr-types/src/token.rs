// ============================================================================
// Capability Tokens
// ============================================================================
//
// Single-use credentials that stand in for a signed request on read and
// delete operations against exactly one resource path.
//
// ============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tokens expire this many seconds after issuance, redeemed or not
pub const TOKEN_TTL_SECS: i64 = 30;

/// HTTP methods a token can be minted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenMethod {
    Get,
    Delete,
}

impl TokenMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenMethod::Get => "GET",
            TokenMethod::Delete => "DELETE",
        }
    }
}

impl std::str::FromStr for TokenMethod {
    type Err = TokenMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(TokenMethod::Get),
            "DELETE" => Ok(TokenMethod::Delete),
            _ => Err(TokenMethodError(s.to_string())),
        }
    }
}

impl std::fmt::Display for TokenMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Token method must be GET or DELETE, got {0}")]
pub struct TokenMethodError(pub String);

/// A capability token as held by the token store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub value: String,
    pub resource: String,
    pub method: TokenMethod,
    /// Owning identity
    pub pubkeyhash: String,
    pub issued: DateTime<Utc>,
}

impl Token {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued + Duration::seconds(TOKEN_TTL_SECS)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Whether this token authorizes `method` on exactly `resource`
    pub fn grants(&self, resource: &str, method: TokenMethod) -> bool {
        self.resource == resource && self.method == method
    }
}
