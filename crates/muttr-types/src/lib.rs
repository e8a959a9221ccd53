// ============================================================================
// Muttr Types - Core Data Records
// ============================================================================
//
// Plain data records used across the pod. Nothing here talks to storage,
// the network or the signature layer.
//
// Contents:
// - Identities and alias bindings
// - Capability tokens
// - Envelopes and inbox contact groups
// - Peer addresses ("alias@host") and content-reference keys
//
// ============================================================================

pub mod address;
pub mod envelope;
pub mod identity;
pub mod token;

pub use address::*;
pub use envelope::*;
pub use identity::*;
pub use token::*;
