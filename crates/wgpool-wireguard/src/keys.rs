//! Curve25519 key material for interfaces and clients.
//!
//! Keys are 32 bytes and appear base64-encoded (standard alphabet) in every
//! artifact this crate renders.

use crate::error::{Result, WireGuardError};
use base64::Engine;
use rand_core::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// Key size in bytes.
pub const KEY_SIZE: usize = 32;

fn decode_key(s: &str) -> Result<[u8; KEY_SIZE]> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(s.trim())?;
    <[u8; KEY_SIZE]>::try_from(bytes.as_slice())
        .map_err(|_| WireGuardError::InvalidKeyLength(bytes.len()))
}

fn encode_key(bytes: &[u8; KEY_SIZE]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// A public key, shared with the other side of a tunnel.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Creates a public key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        encode_key(&self.0)
    }

    /// Decodes a public key from base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or has the wrong length.
    pub fn from_base64(s: &str) -> Result<Self> {
        decode_key(s).map(Self)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        write!(f, "PublicKey({}...)", &b64[..8])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// A private key. Never printed.
#[derive(Clone)]
pub struct PrivateKey([u8; KEY_SIZE]);

impl PrivateKey {
    /// Generates a new random private key from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(OsRng).to_bytes())
    }

    /// Creates a private key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Derives the matching public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.0);
        PublicKey(*X25519PublicKey::from(&secret).as_bytes())
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        encode_key(&self.0)
    }

    /// Decodes a private key from base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or has the wrong length.
    pub fn from_base64(s: &str) -> Result<Self> {
        decode_key(s).map(Self)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PrivateKey {}

/// A private key together with its derived public key.
#[derive(Clone)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a new random key pair.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_private_key(PrivateKey::generate())
    }

    /// Builds a key pair around an existing private key.
    #[must_use]
    pub fn from_private_key(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    /// Returns the private half.
    #[must_use]
    pub const fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// Returns the public half.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private", &"[REDACTED]")
            .field("public", &self.public)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_derivation_is_deterministic() {
        let private = PrivateKey::generate();
        assert_eq!(private.public_key(), private.public_key());
    }

    #[test]
    fn distinct_private_keys_give_distinct_public_keys() {
        let a = PrivateKey::generate();
        let b = PrivateKey::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn private_key_base64_roundtrip() {
        let private = PrivateKey::generate();
        let decoded = PrivateKey::from_base64(&private.to_base64()).expect("decode");
        assert_eq!(private, decoded);
    }

    #[test]
    fn base64_tolerates_surrounding_whitespace() {
        let public = PrivateKey::generate().public_key();
        let padded = format!("  {}\n", public.to_base64());
        assert_eq!(PublicKey::from_base64(&padded).expect("decode"), public);
    }

    #[test]
    fn short_key_rejected() {
        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert!(matches!(
            PublicKey::from_base64(&short),
            Err(WireGuardError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            PrivateKey::from_base64("not base64!"),
            Err(WireGuardError::InvalidBase64(_))
        ));
    }

    #[test]
    fn private_key_debug_redacts() {
        let debug = format!("{:?}", PrivateKey::generate());
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn keypair_matches_private_half() {
        let pair = KeyPair::generate();
        assert_eq!(pair.private_key().public_key(), *pair.public_key());
    }

    #[test]
    fn public_key_serde_uses_base64() {
        let public = PrivateKey::generate().public_key();
        let json = serde_json::to_string(&public).expect("serialize");
        assert_eq!(json, format!("\"{}\"", public.to_base64()));
        let back: PublicKey = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, public);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn derivation_consistent(seed: [u8; 32]) {
                let private = PrivateKey::from_bytes(seed);
                prop_assert_eq!(private.public_key(), private.public_key());
            }
        }
    }
}
