//! Credential wrapper that zeroizes its memory on drop.
//!
//! The Inthreat API key is the only secret Intel Relay handles. It is kept in a
//! `SecureString` from the moment it is read out of configuration until the
//! bearer header is built.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

/// A string whose contents are wiped when dropped and never printed.
///
/// # Example
///
/// ```
/// use ir_connectors::SecureString;
///
/// let key = SecureString::new("sekoia-api-key".to_string());
/// assert_eq!(key.expose_secret(), "sekoia-api-key");
/// assert_eq!(format!("{:?}", key), "SecureString([REDACTED])");
/// ```
#[derive(Clone, Default)]
pub struct SecureString(Zeroizing<String>);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(Zeroizing::new(s))
    }

    /// Borrows the secret. Copies made from the returned slice are not zeroized.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString([REDACTED])")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for SecureString {}

impl Serialize for SecureString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecureString::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expose_secret() {
        let key: SecureString = "abc123".into();
        assert_eq!(key.expose_secret(), "abc123");
        assert_eq!(key.len(), 6);
    }

    #[test]
    fn test_blank_key_is_empty() {
        assert!(SecureString::default().is_empty());
        assert!(SecureString::from("   ").is_empty());
        assert!(!SecureString::from("k").is_empty());
    }

    #[test]
    fn test_formatting_is_redacted() {
        let key = SecureString::from("super-secret");
        assert!(!format!("{:?}", key).contains("super-secret"));
        assert_eq!(key.to_string(), "[REDACTED]");
    }

    #[test]
    fn test_equality() {
        assert_eq!(SecureString::from("same"), SecureString::from("same"));
        assert_ne!(SecureString::from("same"), SecureString::from("other"));
    }

    #[test]
    fn test_yaml_style_deserialize() {
        let key: SecureString = serde_json::from_str("\"from-config\"").unwrap();
        assert_eq!(key.expose_secret(), "from-config");
    }
}
