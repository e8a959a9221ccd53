// ============================================================================
// Authentication and Authorization Stages
// ============================================================================
//
// Authentication decodes a cleartext-signed body, resolves the signer's key
// (local registry for `pubkeyhash`, remote pod for `href`) and verifies the
// signature. It never rejects; the outcome is left on the request for
// Authorization, which requires a verified signer and a fresh nonce.
//
// ============================================================================

use muttr_crypto::{CleartextMessage, PublicKey};
use muttr_types::Identity;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{PodError, PodResult};
use crate::federation::FederationClient;
use crate::metrics;
use crate::registry::{stored_key, IdentityRegistry, INVALID_NONCE_MESSAGE};

// ============================================================================
// Signed claim payload
// ============================================================================

/// How the `identity` field of a claim names its signer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityType {
    /// A pubkeyhash registered on this pod
    Pubkeyhash,
    /// A URL serving the signer's armored public key
    Href,
}

impl std::str::FromStr for IdentityType {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pubkeyhash" => Ok(IdentityType::Pubkeyhash),
            "href" => Ok(IdentityType::Href),
            other => Err(ClaimError::IdentityType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("Signed payload is not a JSON object")]
    NotAnObject,
    #[error("Signed payload is missing {0}")]
    Missing(&'static str),
    #[error("Unsupported identity type: {0}")]
    IdentityType(String),
    #[error("Nonce must be a non-negative integer")]
    Nonce,
}

/// The key/value payload inside a signed message
#[derive(Debug, Clone, PartialEq)]
pub struct SignedClaim {
    pub identity: String,
    pub identity_type: IdentityType,
    pub nonce: Option<u64>,
    /// Everything else: route parameters such as `alias`, `from`, `key`
    pub params: Map<String, Value>,
}

impl SignedClaim {
    pub fn from_text(text: &str) -> Result<Self, ClaimError> {
        let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(text) else {
            return Err(ClaimError::NotAnObject);
        };

        let identity = match fields.remove("identity") {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => return Err(ClaimError::Missing("identity")),
        };

        let identity_type = match fields
            .remove("identity_type")
            .or_else(|| fields.remove("identityType"))
        {
            Some(Value::String(s)) => s.parse()?,
            _ => return Err(ClaimError::Missing("identity_type")),
        };
        fields.remove("identityType");

        let nonce = match fields.remove("nonce") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(n.as_u64().ok_or(ClaimError::Nonce)?),
            Some(Value::String(s)) => Some(s.trim().parse().map_err(|_| ClaimError::Nonce)?),
            Some(_) => return Err(ClaimError::Nonce),
        };

        Ok(Self {
            identity,
            identity_type,
            nonce,
            params: fields,
        })
    }

    /// String-valued route parameter
    pub fn param(&self, name: &str) -> PodResult<&str> {
        match self.params.get(name) {
            Some(Value::String(s)) => Ok(s),
            _ => Err(PodError::bad_request(format!("Missing parameter: {name}"))),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Key that produced a verified signature
#[derive(Debug, Clone)]
pub struct Signer {
    pub key: PublicKey,
    pub pubkeyhash: String,
    pub claim: SignedClaim,
}

/// Outcome of the authentication stage, stored in request extensions
#[derive(Debug, Clone)]
pub enum Authentication {
    /// Body is not a well-formed signed message
    Malformed(String),
    /// Well-formed, but no signer could be established
    Unverified(String),
    Verified(Signer),
}

impl Authentication {
    pub fn is_verified(&self) -> bool {
        matches!(self, Authentication::Verified(_))
    }
}

/// Decode and verify a signed request body
pub async fn authenticate(
    registry: &IdentityRegistry,
    federation: &FederationClient,
    body: &[u8],
) -> Authentication {
    let Ok(text) = std::str::from_utf8(body) else {
        return Authentication::Malformed("Request body is not UTF-8 text".to_string());
    };

    let message = match CleartextMessage::parse(text) {
        Ok(message) => message,
        Err(e) => return Authentication::Malformed(e.to_string()),
    };

    let claim = match SignedClaim::from_text(message.text()) {
        Ok(claim) => claim,
        Err(e) => return Authentication::Malformed(e.to_string()),
    };

    let key = match resolve_signer_key(registry, federation, &claim).await {
        Ok(key) => key,
        Err(e) => {
            tracing::debug!(
                identity = %claim.identity,
                error = %e,
                "Could not resolve signer key"
            );
            return Authentication::Unverified(e.to_string());
        }
    };

    if !verify_offloaded(message, key).await {
        tracing::debug!(identity = %claim.identity, "Request signature did not verify");
        return Authentication::Unverified("Signature verification failed".to_string());
    }

    Authentication::Verified(Signer {
        pubkeyhash: key.pubkeyhash(),
        key,
        claim,
    })
}

async fn resolve_signer_key(
    registry: &IdentityRegistry,
    federation: &FederationClient,
    claim: &SignedClaim,
) -> PodResult<PublicKey> {
    match claim.identity_type {
        IdentityType::Pubkeyhash => {
            let identity = registry
                .find_identity(&claim.identity)
                .await?
                .ok_or(PodError::NotFound(None))?;
            stored_key(&identity)
        }
        IdentityType::Href => Ok(federation.fetch_key(&claim.identity).await?),
    }
}

/// Check a signature on the blocking pool
pub async fn verify_offloaded(message: CleartextMessage, key: PublicKey) -> bool {
    tokio::task::spawn_blocking(move || message.verify(&key).is_ok())
        .await
        .unwrap_or(false)
}

// ============================================================================
// Authorization
// ============================================================================

/// A verified signer whose nonce has been committed
#[derive(Debug, Clone)]
pub struct Authorized {
    pub identity: Identity,
    pub claim: SignedClaim,
}

/// Require a verified signer and advance its nonce ledger
pub async fn authorize(
    registry: &IdentityRegistry,
    authentication: Option<&Authentication>,
) -> PodResult<Authorized> {
    let signer = match authentication {
        Some(Authentication::Verified(signer)) => signer,
        Some(Authentication::Malformed(reason)) => {
            metrics::AUTH_FAILURES_TOTAL
                .with_label_values(&["malformed"])
                .inc();
            return Err(PodError::bad_request(reason.clone()));
        }
        Some(Authentication::Unverified(_)) | None => {
            metrics::AUTH_FAILURES_TOTAL
                .with_label_values(&["unverified"])
                .inc();
            return Err(PodError::Unauthorized(None));
        }
    };

    let Some(nonce) = signer.claim.nonce else {
        metrics::AUTH_FAILURES_TOTAL
            .with_label_values(&["nonce"])
            .inc();
        return Err(PodError::unauthorized(INVALID_NONCE_MESSAGE));
    };

    let pubkeyhash = signer.key.pubkeyhash();
    let identity = registry
        .advance_nonce(&pubkeyhash, nonce)
        .await
        .inspect_err(|e| {
            if matches!(e, PodError::Unauthorized(_)) {
                metrics::AUTH_FAILURES_TOTAL
                    .with_label_values(&["nonce"])
                    .inc();
            }
        })?;

    Ok(Authorized {
        identity,
        claim: signer.claim.clone(),
    })
}
