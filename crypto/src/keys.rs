//! Secret keys and identity derivation.

use crate::error::CryptoError;
use crate::sign::address_from_verifying_key;
use k256::ecdsa::SigningKey;
use warden_types::Address;

/// A secp256k1 secret key together with its derived participant address.
#[derive(Clone)]
pub struct SecretKey {
    signing_key: SigningKey,
    address: Address,
}

impl SecretKey {
    /// Generate a fresh random key.
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    /// Build a key from 32 raw scalar bytes.
    ///
    /// Fails if the bytes are not a valid non-zero scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// The participant address this key signs as.
    pub fn address(&self) -> Address {
        self.address
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_keys_have_distinct_addresses() {
        let a = SecretKey::random();
        let b = SecretKey::random();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn from_bytes_is_deterministic() {
        let seed = [7u8; 32];
        let a = SecretKey::from_bytes(&seed).unwrap();
        let b = SecretKey::from_bytes(&seed).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn zero_scalar_rejected() {
        assert!(SecretKey::from_bytes(&[0u8; 32]).is_err());
    }
}
