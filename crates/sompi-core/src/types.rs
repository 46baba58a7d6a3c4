//! Core wallet types: transaction ids, UTXO identities, transactions and
//! the unspent outputs a wallet tracks.
//!
//! All monetary values are in sompi.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::Address;
use crate::constants::{NetworkParameters, SUBNETWORK_ID_LEN};
use crate::error::CodecError;
use crate::script::{self, ScriptPublicKey};

/// Serialized size of one signed pay-to-pubkey-hash input:
/// prev tx id, output index, script length prefix, unlocking script, sequence.
pub const SIGNED_INPUT_SIZE: u64 = 32 + 4 + 8 + script::UNLOCKING_SCRIPT_LEN as u64 + 8;

/// A 32-byte transaction id, kept in natural byte order.
#[derive(
    Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct TransactionId(#[serde(with = "hex_array")] pub [u8; 32]);

impl TransactionId {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 64-character hex id.
    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let bytes = hex::decode(s).map_err(|e| CodecError::InvalidTransactionId(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CodecError::InvalidTransactionId("expected 32 bytes".into()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({self})")
    }
}

/// Identity of an unspent output: `(transaction_id, output_index)`.
///
/// Ordering is by transaction id bytes, then by index.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtxoId {
    pub transaction_id: TransactionId,
    pub output_index: u32,
}

impl UtxoId {
    pub fn new(transaction_id: TransactionId, output_index: u32) -> Self {
        Self {
            transaction_id,
            output_index,
        }
    }
}

impl fmt::Display for UtxoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.output_index)
    }
}

/// A transaction input spending a previous output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    pub previous_outpoint: UtxoId,
    /// Unlocking script. Empty until signed.
    pub signature_script: Vec<u8>,
    pub sequence: u64,
}

/// A transaction output creating a new UTXO.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub amount: u64,
    pub script_public_key: ScriptPublicKey,
}

/// A transaction in the wallet's wire model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u64,
    pub subnetwork_id: [u8; SUBNETWORK_ID_LEN],
    pub gas: u64,
}

impl Transaction {
    /// Sum of all output amounts. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.amount))
    }
}

/// A UTXO as reported by the ledger service for one address.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UtxoEntryRecord {
    pub transaction_id: TransactionId,
    pub output_index: u32,
    pub amount: u64,
    pub script_public_key: ScriptPublicKey,
    pub block_daa_score: u64,
    pub is_coinbase: bool,
}

impl UtxoEntryRecord {
    pub fn id(&self) -> UtxoId {
        UtxoId::new(self.transaction_id, self.output_index)
    }
}

/// A spendable output tracked by the wallet. Immutable once constructed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UnspentOutput {
    pub id: UtxoId,
    pub address: Address,
    pub amount: u64,
    pub script_public_key: ScriptPublicKey,
    pub block_daa_score: u64,
    pub is_coinbase: bool,
    /// Mass this output adds to a transaction when spent.
    pub mass: u64,
}

impl UnspentOutput {
    /// Build from a service record, deriving the spend mass from `params`.
    pub fn from_record(record: UtxoEntryRecord, address: Address, params: &NetworkParameters) -> Self {
        // Scripts we cannot parse are costed as a single signature operation.
        let sig_ops = script::sig_op_count(&record.script_public_key.script).unwrap_or(1);
        let mass = sig_ops
            .saturating_mul(params.mass_per_sig_op)
            .saturating_add(SIGNED_INPUT_SIZE.saturating_mul(params.mass_per_byte));
        Self {
            id: record.id(),
            address,
            amount: record.amount,
            script_public_key: record.script_public_key,
            block_daa_score: record.block_daa_score,
            is_coinbase: record.is_coinbase,
            mass,
        }
    }

    /// Confirmations at the given blue score.
    pub fn confirmations(&self, blue_score: u64) -> u64 {
        blue_score.saturating_sub(self.block_daa_score)
    }
}

mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}
