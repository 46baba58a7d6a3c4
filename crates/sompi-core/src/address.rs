//! Address encoding.
//!
//! Addresses are `prefix:data` strings where the prefix names the network
//! (`kaspa`, `kaspatest`, `kaspadev`, `kaspasim`) and the data part is the
//! bech32 character set over `version || pubkey_hash`, followed by an
//! 8-character (40-bit) BCH checksum that commits to the prefix.
//!
//! Version 0 is the only version this wallet issues or accepts: a 32-byte
//! BLAKE2b hash of the owner's x-only public key.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::constants::Network;
use crate::crypto::PublicKey;
use crate::error::AddressError;
use crate::script::{self, ScriptPublicKey};

/// Bech32 character set for encoding 5-bit values.
const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Number of 5-bit checksum characters.
const CHECKSUM_LEN: usize = 8;

/// Pay-to-pubkey-hash address version.
pub const ADDRESS_VERSION: u8 = 0;

/// A wallet address: network, version byte and 32-byte pubkey hash.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    network: Network,
    version: u8,
    pubkey_hash: [u8; 32],
}

impl Address {
    /// Create an address from a pubkey hash and network.
    pub fn from_pubkey_hash(pubkey_hash: [u8; 32], network: Network) -> Self {
        Self {
            network,
            version: ADDRESS_VERSION,
            pubkey_hash,
        }
    }

    /// Create an address from an x-only public key and network.
    pub fn from_public_key(public_key: &PublicKey, network: Network) -> Self {
        Self::from_pubkey_hash(public_key.pubkey_hash(), network)
    }

    /// The pubkey hash encoded in this address.
    pub fn pubkey_hash(&self) -> [u8; 32] {
        self.pubkey_hash
    }

    /// The network this address belongs to.
    pub fn network(&self) -> Network {
        self.network
    }

    /// The address version byte.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Locking script paying to this address.
    pub fn script_public_key(&self) -> ScriptPublicKey {
        script::pay_to_pubkey_hash(&self.pubkey_hash)
    }

    /// Encode this address as a `prefix:data` string.
    pub fn encode(&self) -> String {
        let prefix = self.network.prefix();
        let mut payload = Vec::with_capacity(33);
        payload.push(self.version);
        payload.extend_from_slice(&self.pubkey_hash);
        let data = convert_bits(&payload, 8, 5, true)
            .expect("padded 8-to-5 conversion cannot fail");

        let checksum = checksum(prefix, &data);

        let mut result = String::with_capacity(prefix.len() + 1 + data.len() + CHECKSUM_LEN);
        result.push_str(prefix);
        result.push(':');
        for &d in &data {
            result.push(CHARSET[d as usize] as char);
        }
        for i in 0..CHECKSUM_LEN {
            let d = (checksum >> (5 * (CHECKSUM_LEN - 1 - i))) & 31;
            result.push(CHARSET[d as usize] as char);
        }
        result
    }

    /// Decode a `prefix:data` address string.
    pub fn decode(s: &str) -> Result<Self, AddressError> {
        let has_lower = s.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper {
            return Err(AddressError::MixedCase);
        }
        let s_lower = s.to_ascii_lowercase();

        let (prefix, data_part) = s_lower.split_once(':').ok_or(AddressError::MissingSeparator)?;
        let network = Network::from_prefix(prefix)?;

        if data_part.len() <= CHECKSUM_LEN {
            return Err(AddressError::InvalidLength);
        }

        let mut data = Vec::with_capacity(data_part.len());
        for c in data_part.chars() {
            let pos = CHARSET
                .iter()
                .position(|&ch| ch as char == c)
                .ok_or(AddressError::InvalidCharacter(c))?;
            data.push(pos as u8);
        }

        let (payload_5bit, checksum_5bit) = data.split_at(data.len() - CHECKSUM_LEN);
        let expected = checksum(prefix, payload_5bit);
        let actual = checksum_5bit
            .iter()
            .fold(0u64, |acc, &d| (acc << 5) | d as u64);
        if expected != actual {
            return Err(AddressError::InvalidChecksum);
        }

        let payload = convert_bits(payload_5bit, 5, 8, false).ok_or(AddressError::InvalidPadding)?;
        if payload.len() != 33 {
            return Err(AddressError::InvalidLength);
        }
        let version = payload[0];
        if version != ADDRESS_VERSION {
            return Err(AddressError::InvalidVersion(version));
        }

        let mut pubkey_hash = [0u8; 32];
        pubkey_hash.copy_from_slice(&payload[1..]);

        Ok(Self {
            network,
            version,
            pubkey_hash,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::decode(&s).map_err(serde::de::Error::custom)
    }
}

// --- Checksum internals ---

/// 40-bit BCH polymod over 5-bit values.
fn polymod(values: impl Iterator<Item = u8>) -> u64 {
    const GEN: [u64; 5] = [
        0x98f2bc8e61,
        0x79b76d99e2,
        0xf33e5fb3c4,
        0xae2eabe2a8,
        0x1e4f43e470,
    ];
    let mut c: u64 = 1;
    for d in values {
        let c0 = c >> 35;
        c = ((c & 0x07_ffff_ffff) << 5) ^ d as u64;
        for (i, &g) in GEN.iter().enumerate() {
            if (c0 >> i) & 1 != 0 {
                c ^= g;
            }
        }
    }
    c ^ 1
}

/// Checksum over the lower 5 bits of each prefix byte, a zero separator,
/// the 5-bit payload and eight zero placeholders.
fn checksum(prefix: &str, payload: &[u8]) -> u64 {
    polymod(
        prefix
            .bytes()
            .map(|c| c & 0x1f)
            .chain(std::iter::once(0))
            .chain(payload.iter().copied())
            .chain([0u8; CHECKSUM_LEN]),
    )
}

/// Convert between bit widths (8-bit bytes to 5-bit groups and back).
fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut ret = Vec::new();
    let maxv = (1u32 << to_bits) - 1;
    for &value in data {
        let v = value as u32;
        if v >> from_bits != 0 {
            return None;
        }
        acc = (acc << from_bits) | v;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            ret.push(((acc >> bits) & maxv) as u8);
        }
    }
    if pad {
        if bits > 0 {
            ret.push(((acc << (to_bits - bits)) & maxv) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & maxv) != 0 {
        return None;
    }
    Some(ret)
}
