//! Identity keys for the long-term cache.

use sha2::{Digest, Sha256};
use std::fmt;

/// What the registry caches by.
///
/// Live objects are keyed by identity, never by value: two equal but
/// independently built objects get separate ids. Files are keyed by path
/// plus a digest of their text so an edited file is registered afresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    Object(u64),
    File { path: String, digest: [u8; 32] },
}

impl IdentityKey {
    pub fn object(identity: u64) -> Self {
        IdentityKey::Object(identity)
    }

    pub fn file(path: &str, text: &str) -> Self {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(text.as_bytes()));
        IdentityKey::File {
            path: path.to_owned(),
            digest,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Object(identity) => write!(f, "object@{}", identity),
            IdentityKey::File { path, digest } => {
                write!(f, "file:{}@", path)?;
                for byte in &digest[..4] {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_key_changes_with_text() {
        let a = IdentityKey::file("m.py", "x = 1\n");
        let b = IdentityKey::file("m.py", "x = 1\n");
        let c = IdentityKey::file("m.py", "x = 2\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn display_is_short() {
        assert_eq!(IdentityKey::object(12).to_string(), "object@12");
        let shown = IdentityKey::file("m.py", "").to_string();
        // sha256("") starts with e3b0c442
        assert_eq!(shown, "file:m.py@e3b0c442");
    }
}
