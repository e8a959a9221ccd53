//! # Muttr Crypto
//!
//! Signature primitives for the muttr pod.
//!
//! ## Contents
//!
//! - **armor**: ASCII armor framing shared by keys and signatures
//! - **key**: armored Ed25519 public-key blocks and their pubkeyhash
//! - **cleartext**: cleartext-signed messages (sign, parse, verify)
//! - **digest**: content-reference keys for opaque blobs
//!
//! Message contents are never decrypted here; the pod only checks who
//! signed a request.

#![warn(missing_docs)]

pub mod armor;
pub mod cleartext;
pub mod digest;
pub mod key;

pub use armor::ArmorError;
pub use cleartext::{sign_cleartext, CleartextMessage, VerificationError};
pub use digest::content_key;
pub use ed25519_dalek::SigningKey;
pub use key::{pubkeyhash, PublicKey};
