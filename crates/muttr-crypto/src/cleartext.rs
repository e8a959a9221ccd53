//! Cleartext-signed messages
//!
//! Framing follows the OpenPGP cleartext signature framework (RFC 4880 §7):
//! the text travels readable, lines starting with `-` are dash-escaped, and
//! the signature covers the text with trailing whitespace stripped from each
//! line and lines joined by CRLF.

use ed25519_dalek::{Signature, Signer, SigningKey};
use thiserror::Error;

use crate::armor::{
    begin_line, decode_payload, encode_block, end_line, ArmorError, SIGNATURE_LABEL,
    SIGNED_MESSAGE_LABEL,
};
use crate::key::{PublicKey, ED25519_SIGNATURE};

/// Signature did not verify against the supplied key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Signature verification failed")]
pub struct VerificationError;

/// A parsed cleartext-signed message
#[derive(Debug, Clone)]
pub struct CleartextMessage {
    text: String,
    signature: Signature,
}

impl CleartextMessage {
    /// Parse an armored cleartext-signed message
    pub fn parse(input: &str) -> Result<Self, ArmorError> {
        if input.trim().is_empty() {
            return Err(ArmorError::Empty);
        }

        let message_begin = begin_line(SIGNED_MESSAGE_LABEL);
        let signature_begin = begin_line(SIGNATURE_LABEL);
        let signature_end = end_line(SIGNATURE_LABEL);

        let mut lines = input.lines().map(str::trim_end);

        if !lines.by_ref().any(|line| line.trim_start() == message_begin) {
            return Err(ArmorError::MissingHeader(SIGNED_MESSAGE_LABEL));
        }

        // Armor headers ("Hash: ...") end at the first blank line
        loop {
            match lines.next() {
                Some(line) if line.is_empty() => break,
                Some(_) => continue,
                None => return Err(ArmorError::MissingSignature),
            }
        }

        let mut text_lines = Vec::new();
        let mut signed = false;
        for line in lines.by_ref() {
            if line == signature_begin {
                signed = true;
                break;
            }
            text_lines.push(line.strip_prefix("- ").unwrap_or(line));
        }
        if !signed {
            return Err(ArmorError::MissingSignature);
        }

        let mut signature_lines = Vec::new();
        let mut closed = false;
        for line in lines {
            if line.trim_start() == signature_end {
                closed = true;
                break;
            }
            signature_lines.push(line);
        }
        if !closed {
            return Err(ArmorError::MissingFooter(SIGNATURE_LABEL));
        }

        let signature_bytes = decode_payload(&signature_lines)?;
        let raw: [u8; ED25519_SIGNATURE] = signature_bytes
            .as_slice()
            .try_into()
            .map_err(|_| ArmorError::SignatureLength(signature_bytes.len()))?;

        Ok(Self {
            text: text_lines.join("\n"),
            signature: Signature::from_bytes(&raw),
        })
    }

    /// The signed text, dash-escaping removed
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Verify the signature against `key`
    pub fn verify(&self, key: &PublicKey) -> Result<(), VerificationError> {
        let canonical = canonical_text(&self.text);
        if key.verify(canonical.as_bytes(), &self.signature) {
            Ok(())
        } else {
            Err(VerificationError)
        }
    }
}

/// Sign `text` and produce an armored cleartext-signed message
pub fn sign_cleartext(text: &str, signing_key: &SigningKey) -> String {
    let canonical = canonical_text(text);
    let signature = signing_key.sign(canonical.as_bytes());

    let mut out = begin_line(SIGNED_MESSAGE_LABEL);
    out.push_str("\n\n");
    for line in text.lines() {
        if line.starts_with('-') {
            out.push_str("- ");
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.push_str(&encode_block(SIGNATURE_LABEL, &signature.to_bytes()));
    out
}

fn canonical_text(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn keypair() -> (SigningKey, PublicKey) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = PublicKey::from(signing_key.verifying_key());
        (signing_key, public)
    }

    #[test]
    fn test_sign_parse_verify() {
        let (signing_key, public) = keypair();
        let text = r#"{"identity":"abc","identity_type":"pubkeyhash","nonce":1}"#;

        let armored = sign_cleartext(text, &signing_key);
        let message = CleartextMessage::parse(&armored).unwrap();

        assert_eq!(message.text(), text);
        assert!(message.verify(&public).is_ok());
    }

    #[test]
    fn test_wrong_key_fails() {
        let (signing_key, _) = keypair();
        let (_, other) = keypair();

        let message = CleartextMessage::parse(&sign_cleartext("hello", &signing_key)).unwrap();
        assert_eq!(message.verify(&other), Err(VerificationError));
    }

    #[test]
    fn test_tampered_text_fails() {
        let (signing_key, public) = keypair();
        let armored = sign_cleartext("nonce 1", &signing_key).replace("nonce 1", "nonce 2");

        let message = CleartextMessage::parse(&armored).unwrap();
        assert!(message.verify(&public).is_err());
    }

    #[test]
    fn test_dash_escaping_and_line_endings() {
        let (signing_key, public) = keypair();
        let text = "-----BEGIN trick\nsecond line   \n\n- dash";

        let armored = sign_cleartext(text, &signing_key).replace('\n', "\r\n");
        let message = CleartextMessage::parse(&armored).unwrap();

        assert_eq!(message.text(), "-----BEGIN trick\nsecond line\n\n- dash");
        assert!(message.verify(&public).is_ok());
    }

    #[test]
    fn test_armor_headers_are_skipped() {
        let (signing_key, public) = keypair();
        let armored = sign_cleartext("body", &signing_key).replacen(
            "-----BEGIN MUTTR SIGNED MESSAGE-----\n",
            "-----BEGIN MUTTR SIGNED MESSAGE-----\nHash: SHA512\n",
            1,
        );

        let message = CleartextMessage::parse(&armored).unwrap();
        assert_eq!(message.text(), "body");
        assert!(message.verify(&public).is_ok());
    }

    #[test]
    fn test_structural_failures() {
        assert!(matches!(CleartextMessage::parse(""), Err(ArmorError::Empty)));
        assert!(matches!(
            CleartextMessage::parse("just text"),
            Err(ArmorError::MissingHeader(_))
        ));
        assert!(matches!(
            CleartextMessage::parse("-----BEGIN MUTTR SIGNED MESSAGE-----\n\nbody\n"),
            Err(ArmorError::MissingSignature)
        ));

        let short_sig = format!(
            "-----BEGIN MUTTR SIGNED MESSAGE-----\n\nbody\n{}",
            encode_block(SIGNATURE_LABEL, &[0u8; 10])
        );
        assert!(matches!(
            CleartextMessage::parse(&short_sig),
            Err(ArmorError::SignatureLength(10))
        ));
    }
}
