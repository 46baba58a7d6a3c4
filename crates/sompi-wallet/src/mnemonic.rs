//! BIP-39 mnemonic generation and parsing.

use bip39::{Language, Mnemonic};

use crate::error::WalletError;
use crate::keys::Seed;

/// Entropy length for a 24-word phrase.
const ENTROPY_LEN: usize = 32;

/// Generate a fresh 24-word mnemonic from the OS cryptographic RNG.
pub fn generate_mnemonic() -> Result<Mnemonic, WalletError> {
    use rand::RngCore;
    let mut entropy = [0u8; ENTROPY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()));
    zeroize::Zeroize::zeroize(&mut entropy);
    mnemonic
}

/// Parse a BIP-39 mnemonic phrase.
///
/// Normalizes whitespace and converts to lowercase before parsing.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, WalletError> {
    let normalized = phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

/// Parse a phrase and stretch it into its 64-byte seed.
pub fn mnemonic_to_seed(phrase: &str) -> Result<Seed, WalletError> {
    Ok(Seed::from_mnemonic(&parse_mnemonic(phrase)?))
}
