//! The ledger's signing secret.

use rand::RngCore;
use tracing::warn;

use crate::error::{CapabilityError, CapabilityResult};

/// Minimum acceptable key length in bytes.
pub(crate) const MIN_SECRET_LEN: usize = 32;

/// The shared HMAC key capability tokens are signed with.
#[derive(Clone)]
pub struct LedgerSecret(Vec<u8>);

impl LedgerSecret {
    /// Generate a fresh 32-byte secret from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; MIN_SECRET_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Use a provided key.
    ///
    /// A key shorter than 32 bytes is rejected in strict mode and
    /// tolerated with a warning otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::WeakSecret`] in strict mode when the
    /// key is too short.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, strict: bool) -> CapabilityResult<Self> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_LEN {
            if strict {
                return Err(CapabilityError::WeakSecret { len: bytes.len() });
            }
            warn!(len = bytes.len(), "capability secret is shorter than 32 bytes");
        }
        Ok(Self(bytes))
    }

    /// The raw key material.
    #[must_use]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for LedgerSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("LedgerSecret")
            .field("len", &self.0.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_full_length() {
        let secret = LedgerSecret::generate();
        assert_eq!(secret.as_bytes().len(), MIN_SECRET_LEN);
    }

    #[test]
    fn test_short_key_strict() {
        assert!(matches!(
            LedgerSecret::from_bytes(vec![0u8; 8], true),
            Err(CapabilityError::WeakSecret { len: 8 })
        ));
    }

    #[test]
    fn test_short_key_lenient() {
        assert!(LedgerSecret::from_bytes(vec![0u8; 8], false).is_ok());
    }

    #[test]
    fn test_debug_hides_material() {
        let secret = LedgerSecret::from_bytes(vec![42u8; 32], true).unwrap();
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("42"));
        assert!(rendered.contains("32"));
    }
}
