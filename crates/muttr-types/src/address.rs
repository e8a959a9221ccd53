// ============================================================================
// Peer Addresses
// ============================================================================
//
// A sender is named by an opaque "<alias>@<podHost>" string. The host part
// decides whether the sender is resolved against this pod's alias table or
// fetched from a remote pod.
//
// ============================================================================

use thiserror::Error;

/// Longest alias name accepted by the registry
pub const MAX_ALIAS_LENGTH: usize = 64;

/// A parsed "<alias>@<podHost>" address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    pub alias: String,
    pub host: String,
}

impl PeerAddress {
    /// Parse an address string
    ///
    /// The split happens on the last `@`, so hosts never contain one.
    ///
    /// # Examples
    /// ```
    /// use muttr_types::PeerAddress;
    ///
    /// let addr = PeerAddress::parse("bob@pod.example.com").unwrap();
    /// assert_eq!(addr.alias, "bob");
    /// assert_eq!(addr.host, "pod.example.com");
    /// ```
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let (alias, host) = s.rsplit_once('@').ok_or(AddressError::MissingHost)?;

        if alias.is_empty() {
            return Err(AddressError::EmptyAlias);
        }
        if host.is_empty() {
            return Err(AddressError::MissingHost);
        }
        if host.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(AddressError::InvalidHost(host.to_string()));
        }

        Ok(Self {
            alias: alias.to_string(),
            host: host.to_string(),
        })
    }

    /// Whether this address lives on the pod reachable at `host`
    pub fn is_hosted_on(&self, host: &str) -> bool {
        self.host.eq_ignore_ascii_case(host)
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.alias, self.host)
    }
}

/// Check an alias name: 1 to 64 characters of `[A-Za-z0-9._-]`
pub fn validate_alias_name(name: &str) -> Result<(), AddressError> {
    if name.is_empty() {
        return Err(AddressError::EmptyAlias);
    }
    if name.len() > MAX_ALIAS_LENGTH {
        return Err(AddressError::AliasTooLong(name.len()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(AddressError::InvalidAlias(name.to_string()));
    }
    Ok(())
}

/// Errors that can occur when parsing addresses or alias names
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Address cannot be empty")]
    Empty,
    #[error("Address must be of the form alias@host")]
    MissingHost,
    #[error("Alias cannot be empty")]
    EmptyAlias,
    #[error("Alias is longer than 64 characters ({0})")]
    AliasTooLong(usize),
    #[error("Invalid alias: {0}")]
    InvalidAlias(String),
    #[error("Invalid host: {0}")]
    InvalidHost(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        let addr = PeerAddress::parse("alice@pod.example.com").unwrap();
        assert_eq!(addr.alias, "alice");
        assert_eq!(addr.host, "pod.example.com");
        assert_eq!(addr.to_string(), "alice@pod.example.com");
    }

    #[test]
    fn test_parse_address_with_port() {
        let addr = PeerAddress::parse("alice@127.0.0.1:8080").unwrap();
        assert_eq!(addr.host, "127.0.0.1:8080");
        assert!(addr.is_hosted_on("127.0.0.1:8080"));
        assert!(!addr.is_hosted_on("127.0.0.1:8081"));
    }

    #[test]
    fn test_parse_splits_on_last_at() {
        let addr = PeerAddress::parse("a@b@pod.net").unwrap();
        assert_eq!(addr.alias, "a@b");
        assert_eq!(addr.host, "pod.net");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(PeerAddress::parse(""), Err(AddressError::Empty));
        assert_eq!(PeerAddress::parse("alice"), Err(AddressError::MissingHost));
        assert_eq!(PeerAddress::parse("alice@"), Err(AddressError::MissingHost));
        assert_eq!(PeerAddress::parse("@pod.net"), Err(AddressError::EmptyAlias));
        assert!(matches!(
            PeerAddress::parse("alice@pod net"),
            Err(AddressError::InvalidHost(_))
        ));
    }

    #[test]
    fn test_alias_names() {
        assert!(validate_alias_name("alice").is_ok());
        assert!(validate_alias_name("a.b_c-9").is_ok());
        assert_eq!(validate_alias_name(""), Err(AddressError::EmptyAlias));
        assert!(matches!(
            validate_alias_name("al ice"),
            Err(AddressError::InvalidAlias(_))
        ));
        assert!(matches!(
            validate_alias_name("a/b"),
            Err(AddressError::InvalidAlias(_))
        ));
        assert_eq!(
            validate_alias_name(&"x".repeat(65)),
            Err(AddressError::AliasTooLong(65))
        );
    }
}
