// ============================================================================
// Federation Module - Cross-Pod Key Lookup
// ============================================================================
//
// Pods never forward messages to each other. The only outbound traffic is
// fetching a remote identity's armored public key, either by alias
// (`GET <scheme>://<host>/aliases/<alias>`) or from an explicit URL.
//
// ============================================================================

pub mod client;

pub use client::{FederationClient, FederationError};
