//! Locking and unlocking scripts for the pay-to-pubkey-hash path.
//!
//! Locking script:
//! ```text
//! OP_DUP OP_BLAKE2B OP_DATA_32 <pubkey_hash> OP_EQUALVERIFY OP_CHECKSIG
//! ```
//! Unlocking script:
//! ```text
//! OP_DATA_65 <signature(64) || sighash_type(1)> OP_DATA_32 <x-only pubkey>
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

pub const OP_DATA_32: u8 = 0x20;
pub const OP_DATA_65: u8 = 0x41;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_BLAKE2B: u8 = 0xaa;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;

/// Script version of every locking script this wallet produces.
pub const SCRIPT_VERSION: u16 = 0;

/// Length of a serialized pay-to-pubkey-hash locking script.
pub const P2PKH_SCRIPT_LEN: usize = 37;

/// Length of a serialized unlocking script.
pub const UNLOCKING_SCRIPT_LEN: usize = 1 + 65 + 1 + 32;

/// A versioned locking script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptPublicKey {
    pub version: u16,
    #[serde(with = "hex_bytes")]
    pub script: Vec<u8>,
}

impl ScriptPublicKey {
    pub fn new(version: u16, script: Vec<u8>) -> Self {
        Self { version, script }
    }
}

/// Build the locking script paying to `pubkey_hash`.
pub fn pay_to_pubkey_hash(pubkey_hash: &[u8; 32]) -> ScriptPublicKey {
    let mut script = Vec::with_capacity(P2PKH_SCRIPT_LEN);
    script.push(OP_DUP);
    script.push(OP_BLAKE2B);
    script.push(OP_DATA_32);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    ScriptPublicKey::new(SCRIPT_VERSION, script)
}

/// Extract the pubkey hash from a pay-to-pubkey-hash locking script.
pub fn extract_pubkey_hash(script: &[u8]) -> Option<[u8; 32]> {
    if script.len() != P2PKH_SCRIPT_LEN
        || script[0] != OP_DUP
        || script[1] != OP_BLAKE2B
        || script[2] != OP_DATA_32
        || script[35] != OP_EQUALVERIFY
        || script[36] != OP_CHECKSIG
    {
        return None;
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&script[3..35]);
    Some(hash)
}

/// Build an unlocking script from a signature, its sighash type and the
/// signer's x-only public key.
pub fn unlocking_script(signature: &[u8; 64], sighash_type: u8, pubkey: &[u8; 32]) -> Vec<u8> {
    let mut script = Vec::with_capacity(UNLOCKING_SCRIPT_LEN);
    script.push(OP_DATA_65);
    script.extend_from_slice(signature);
    script.push(sighash_type);
    script.push(OP_DATA_32);
    script.extend_from_slice(pubkey);
    script
}

/// Split an unlocking script into `(signature, sighash_type, pubkey)`.
pub fn parse_unlocking_script(script: &[u8]) -> Result<([u8; 64], u8, [u8; 32]), CodecError> {
    if script.len() != UNLOCKING_SCRIPT_LEN || script[0] != OP_DATA_65 || script[66] != OP_DATA_32 {
        return Err(CodecError::MalformedScript(format!(
            "expected {UNLOCKING_SCRIPT_LEN}-byte signature script, got {} bytes",
            script.len()
        )));
    }
    let mut signature = [0u8; 64];
    signature.copy_from_slice(&script[1..65]);
    let mut pubkey = [0u8; 32];
    pubkey.copy_from_slice(&script[67..]);
    Ok((signature, script[65], pubkey))
}

/// Count signature operations in a script, skipping over pushed data.
pub fn sig_op_count(script: &[u8]) -> Result<u64, CodecError> {
    let mut count = 0u64;
    let mut i = 0usize;
    while i < script.len() {
        let op = script[i];
        i += 1;
        let push_len = match op {
            0x01..=0x4b => op as usize,
            OP_PUSHDATA1 => read_len(script, &mut i, 1)?,
            OP_PUSHDATA2 => read_len(script, &mut i, 2)?,
            OP_PUSHDATA4 => read_len(script, &mut i, 4)?,
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                count += 1;
                0
            }
            _ => 0,
        };
        i = i
            .checked_add(push_len)
            .filter(|&end| end <= script.len())
            .ok_or_else(|| CodecError::MalformedScript("push past end of script".into()))?;
    }
    Ok(count)
}

fn read_len(script: &[u8], i: &mut usize, width: usize) -> Result<usize, CodecError> {
    let bytes = script
        .get(*i..*i + width)
        .ok_or_else(|| CodecError::MalformedScript("truncated push length".into()))?;
    *i += width;
    Ok(bytes
        .iter()
        .rev()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize))
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
