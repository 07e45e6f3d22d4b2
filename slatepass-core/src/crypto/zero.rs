//! Zeroize-on-drop holder for the master secret

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Master secret that is wiped from memory when dropped.
///
/// `Debug` never prints the contents.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret {
    secret: String,
}

impl MasterSecret {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn len(&self) -> usize {
        self.secret.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }

    /// Borrow the secret (use carefully!)
    pub fn expose(&self) -> &str {
        &self.secret
    }

    /// Wipe the secret in place
    pub fn clear(&mut self) {
        self.secret.zeroize();
    }
}

impl From<String> for MasterSecret {
    fn from(secret: String) -> Self {
        Self::new(secret)
    }
}

impl From<&str> for MasterSecret {
    fn from(secret: &str) -> Self {
        Self::new(secret.to_string())
    }
}

impl PartialEq for MasterSecret {
    fn eq(&self, other: &Self) -> bool {
        self.secret == other.secret
    }
}

impl Eq for MasterSecret {}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterSecret")
            .field("len", &self.secret.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expose() {
        let secret = MasterSecret::from("hunter2");
        assert_eq!(secret.expose(), "hunter2");
        assert_eq!(secret.len(), 7);
        assert!(!secret.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut secret = MasterSecret::from("hunter2");
        secret.clear();
        assert!(secret.is_empty());
    }

    #[test]
    fn test_debug_redacts() {
        let secret = MasterSecret::from("hunter2");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("len: 7"));
    }
}
