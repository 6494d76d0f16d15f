//! Redacting wrapper for secret material.
//!
//! Passwords, the Vault root token and unseal key shares all travel through
//! [`SecretString`] so that structured logs and error messages never carry
//! them in clear text.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string whose Debug, Display and Serialize output is `[REDACTED]`.
///
/// The value is zeroed when dropped. Call [`SecretString::expose_secret`]
/// only at the point the raw value must leave the process (a SQL literal,
/// an HTTP body, the credentials file).
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the raw value. Never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(SecretString(value))
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_are_redacted() {
        let token = SecretString::new("hvs.root-token");
        assert_eq!(format!("{:?}", token), "SecretString([REDACTED])");
        assert_eq!(format!("{}", token), "[REDACTED]");
    }

    #[test]
    fn test_expose_returns_raw_value() {
        let password = SecretString::new("app-password");
        assert_eq!(password.expose_secret(), "app-password");
    }

    #[test]
    fn test_serialization_redacts_inside_structs() {
        #[derive(Serialize)]
        struct Principal {
            name: String,
            password: SecretString,
        }

        let principal =
            Principal { name: "todo_app".to_string(), password: SecretString::new("hunter2") };
        let json = serde_json::to_string(&principal).unwrap();

        assert!(json.contains("todo_app"));
        assert!(json.contains("[REDACTED]"));
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_deserialization_accepts_raw_values() {
        let secret: SecretString = serde_json::from_str("\"unseal-share\"").unwrap();
        assert_eq!(secret.expose_secret(), "unseal-share");
    }
}
