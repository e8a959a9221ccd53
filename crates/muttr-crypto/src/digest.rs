//! Content-reference keys

use sha1::{Digest, Sha1};

/// Hex SHA-1 digest of an opaque blob, used as its key in the distributed store
pub fn content_key(blob: &[u8]) -> String {
    hex::encode(Sha1::digest(blob))
}
