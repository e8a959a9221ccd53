//! ASCII armor framing
//!
//! Blocks look like
//!
//! ```text
//! -----BEGIN MUTTR PUBLIC KEY BLOCK-----
//! Comment: optional header lines
//!
//! <base64 payload>
//! -----END MUTTR PUBLIC KEY BLOCK-----
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;

/// Label of an armored public-key block
pub const PUBLIC_KEY_LABEL: &str = "MUTTR PUBLIC KEY BLOCK";
/// Label opening a cleartext-signed message
pub const SIGNED_MESSAGE_LABEL: &str = "MUTTR SIGNED MESSAGE";
/// Label of the signature block closing a cleartext-signed message
pub const SIGNATURE_LABEL: &str = "MUTTR SIGNATURE";

/// Errors raised while decoding armored data
#[derive(Debug, Error)]
pub enum ArmorError {
    /// Input was empty or whitespace only
    #[error("Armored input is empty")]
    Empty,
    /// The expected `-----BEGIN ...-----` line was not found
    #[error("Missing armor header for {0}")]
    MissingHeader(&'static str),
    /// The expected `-----END ...-----` line was not found
    #[error("Missing armor footer for {0}")]
    MissingFooter(&'static str),
    /// The payload was not valid base64
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    /// A key block decoded to the wrong number of bytes
    #[error("Public key must be 32 bytes, got {0}")]
    KeyLength(usize),
    /// The key bytes are not a valid Ed25519 point
    #[error("Invalid public key: {0}")]
    InvalidKey(String),
    /// A signature block decoded to the wrong number of bytes
    #[error("Signature must be 64 bytes, got {0}")]
    SignatureLength(usize),
    /// A signed message ended before its signature block
    #[error("Signed message has no signature block")]
    MissingSignature,
}

/// `-----BEGIN <label>-----`
pub fn begin_line(label: &str) -> String {
    format!("-----BEGIN {label}-----")
}

/// `-----END <label>-----`
pub fn end_line(label: &str) -> String {
    format!("-----END {label}-----")
}

/// Wrap `bytes` in an armor block with the given label
pub fn encode_block(label: &str, bytes: &[u8]) -> String {
    let payload = BASE64.encode(bytes);
    let mut out = String::with_capacity(payload.len() + 2 * label.len() + 32);
    out.push_str(&begin_line(label));
    out.push_str("\n\n");
    for chunk in payload.as_bytes().chunks(64) {
        // base64 output is ASCII
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&end_line(label));
    out.push('\n');
    out
}

/// Find the block labelled `label` in `input` and decode its payload
pub fn decode_block(input: &str, label: &'static str) -> Result<Vec<u8>, ArmorError> {
    if input.trim().is_empty() {
        return Err(ArmorError::Empty);
    }

    let begin = begin_line(label);
    let end = end_line(label);

    let mut lines = input.lines().map(str::trim_end);
    if !lines.by_ref().any(|line| line.trim_start() == begin) {
        return Err(ArmorError::MissingHeader(label));
    }

    let mut body = Vec::new();
    let mut closed = false;
    for line in lines {
        if line.trim_start() == end {
            closed = true;
            break;
        }
        body.push(line);
    }
    if !closed {
        return Err(ArmorError::MissingFooter(label));
    }

    decode_payload(&body)
}

/// Decode the base64 lines of a block body, skipping headers and checksums
pub fn decode_payload(body: &[&str]) -> Result<Vec<u8>, ArmorError> {
    let payload: String = body
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.contains(':') && !line.starts_with('='))
        .collect();

    Ok(BASE64.decode(payload)?)
}
