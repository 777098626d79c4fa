use std::fmt::Display;

use blake3::Hash;

/// Represents a hashed session token.
///
/// Session tokens are handed to clients once and never stored in clear,
/// the database only keeps this digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHash(pub Hash);

impl TokenHash {
    pub fn of(token: &str) -> Self {
        Self(blake3::hash(token.as_bytes()))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl Display for TokenHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// creates a fresh random session token
pub fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
