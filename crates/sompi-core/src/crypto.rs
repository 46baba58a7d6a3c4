//! secp256k1 Schnorr keys and BLAKE2b hashing.
//!
//! Keys are BIP-340 Schnorr keys over secp256k1. Public keys travel in their
//! 32-byte x-only form (the 33-byte compressed encoding with its parity byte
//! dropped). Owner hashes and transaction digests use BLAKE2b-256; digests
//! that need domain separation use the BLAKE2b key parameter.

use secp256k1::{schnorr, All, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey};
use std::fmt;

use crate::error::SigningError;

/// BLAKE2b key for transaction signing digests.
pub const SIGNING_HASH_DOMAIN: &[u8] = b"TransactionSigningHash";

/// BLAKE2b key for transaction ids.
pub const TRANSACTION_ID_DOMAIN: &[u8] = b"TransactionID";

/// BLAKE2b-256 of `data`, keyed with `domain` when it is non-empty.
pub fn blake2b_256(domain: &[u8], data: &[u8]) -> [u8; 32] {
    let mut params = blake2b_simd::Params::new();
    params.hash_length(32);
    if !domain.is_empty() {
        params.key(domain);
    }
    let hash = params.hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Hash of an x-only public key as embedded in addresses and locking scripts.
pub fn pubkey_hash(pubkey: &[u8; 32]) -> [u8; 32] {
    blake2b_256(&[], pubkey)
}

/// A secp256k1 private key owned by the wallet.
///
/// Debug output never shows key material.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PrivateKey {
    secret: SecretKey,
}

impl PrivateKey {
    /// Build a key from 32 bytes; fails for zero or out-of-range scalars.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SigningError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| SigningError::InvalidPrivateKey)?;
        Ok(Self { secret })
    }

    /// Raw secret bytes. Handle with care.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    /// The x-only public key for this private key.
    pub fn public_key(&self, secp: &Secp256k1<All>) -> PublicKey {
        let keypair = Keypair::from_secret_key(secp, &self.secret);
        PublicKey { inner: keypair.x_only_public_key().0 }
    }

    /// BIP-340 Schnorr signature over a 32-byte digest.
    ///
    /// Uses no auxiliary randomness so the same digest always yields the
    /// same signature.
    pub fn sign_schnorr(&self, secp: &Secp256k1<All>, digest: [u8; 32]) -> [u8; 64] {
        let keypair = Keypair::from_secret_key(secp, &self.secret);
        let msg = Message::from_digest(digest);
        let sig = secp.sign_schnorr_no_aux_rand(&msg, &keypair);
        let mut out = [0u8; 64];
        out.copy_from_slice(&sig[..]);
        out
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey").field("secret", &"[REDACTED]").finish()
    }
}

/// An x-only (32-byte) Schnorr public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    inner: XOnlyPublicKey,
}

impl PublicKey {
    /// Parse a 32-byte x-only public key.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SigningError> {
        let inner = XOnlyPublicKey::from_slice(bytes).map_err(|_| SigningError::InvalidPublicKey)?;
        Ok(Self { inner })
    }

    /// The 32-byte x-only encoding.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.serialize()
    }

    /// BLAKE2b-256 hash of the x-only key.
    pub fn pubkey_hash(&self) -> [u8; 32] {
        pubkey_hash(&self.to_bytes())
    }

    /// Verify a BIP-340 signature over a 32-byte digest.
    pub fn verify_schnorr(
        &self,
        secp: &Secp256k1<All>,
        digest: [u8; 32],
        signature: &[u8; 64],
    ) -> Result<(), SigningError> {
        let sig = schnorr::Signature::from_slice(signature).map_err(|_| SigningError::InvalidSignature)?;
        let msg = Message::from_digest(digest);
        secp.verify_schnorr(&sig, &msg, &self.inner)
            .map_err(|_| SigningError::InvalidSignature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}
