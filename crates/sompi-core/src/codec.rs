//! Transaction composition, wire serialization, signature hashing and
//! Schnorr signing.
//!
//! # Wire format
//!
//! All integers little-endian:
//! ```text
//! version(i32) | input_count(u64) | inputs | output_count(u64) | outputs |
//! lock_time(u64) | subnetwork_id(20) | gas(u64) | payload_hash(33, zero) |
//! reserved(u64, zero)
//!
//! input  = prev_tx_id(32, natural order) | output_index(u32) |
//!          script_len(u64) | script | sequence(u64)
//! output = amount(u64) | script_len(u64) | script
//! ```
//!
//! # Signature hash
//!
//! For input `i`, a copy of the transaction has every unlocking script
//! blanked except input `i`, which carries the spent output's locking script.
//! The sighash type then prunes the copy (`NONE` drops outputs, `SINGLE`
//! keeps outputs up to `i` and neutralizes the ones before it, both zero the
//! other inputs' sequences, `ANYONECANPAY` keeps only input `i`). The copy is
//! serialized, the 4-byte type appended, and the buffer hashed with
//! BLAKE2b-256 keyed by `TransactionSigningHash`. The digest bytes are
//! reversed before signing.

use secp256k1::{All, Secp256k1};
use std::collections::HashMap;

use crate::address::Address;
use crate::constants::{NetworkParameters, PAYLOAD_HASH_LEN};
use crate::crypto::{self, PrivateKey, PublicKey};
use crate::error::{CodecError, SigningError};
use crate::script::{self, ScriptPublicKey};
use crate::types::{Transaction, TransactionId, TxInput, TxOutput, UnspentOutput};

/// Bytes per input excluded from the fee-bearing size.
pub const FEE_EXEMPT_BYTES_PER_INPUT: u64 = 2;

/// Signature hash type: a base mode plus the optional `ANYONECANPAY` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigHashType(u32);

impl SigHashType {
    pub const ALL: Self = Self(0x01);
    pub const NONE: Self = Self(0x02);
    pub const SINGLE: Self = Self(0x03);
    pub const ANYONE_CAN_PAY: u32 = 0x80;
    const BASE_MASK: u32 = 0x1f;

    /// Parse and validate a raw sighash type.
    pub fn from_u32(raw: u32) -> Result<Self, CodecError> {
        let known_bits = Self::BASE_MASK | Self::ANYONE_CAN_PAY;
        let base = raw & Self::BASE_MASK;
        if raw & !known_bits != 0 || !(1..=3).contains(&base) {
            return Err(CodecError::UnknownSigHashType(raw));
        }
        Ok(Self(raw))
    }

    /// This type with the `ANYONECANPAY` flag set.
    pub fn with_anyone_can_pay(self) -> Self {
        Self(self.0 | Self::ANYONE_CAN_PAY)
    }

    pub fn anyone_can_pay(&self) -> bool {
        self.0 & Self::ANYONE_CAN_PAY != 0
    }

    pub fn is_none(&self) -> bool {
        self.0 & Self::BASE_MASK == Self::NONE.0
    }

    pub fn is_single(&self) -> bool {
        self.0 & Self::BASE_MASK == Self::SINGLE.0
    }

    pub fn to_u32(self) -> u32 {
        self.0
    }

    /// The single byte appended to a signature.
    pub fn to_u8(self) -> u8 {
        self.0 as u8
    }
}

/// An unsigned transaction together with the outputs it spends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub tx: Transaction,
    /// Spent outputs, in input order.
    pub utxos: Vec<UnspentOutput>,
    pub destination: Address,
    pub amount: u64,
    /// Fee actually paid, including any change folded in as dust.
    pub fee: u64,
    pub change_address: Address,
    pub change: u64,
}

impl TransactionDraft {
    /// Sum of the spent outputs.
    pub fn input_total(&self) -> u64 {
        self.utxos.iter().map(|u| u.amount).sum()
    }
}

/// A fully signed transaction and its wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub draft: TransactionDraft,
    /// The draft with unlocking scripts filled in.
    pub tx: Transaction,
    pub id: TransactionId,
    pub bytes: Vec<u8>,
}

/// Builds, serializes, hashes and signs transactions for one network.
pub struct TransactionCodec {
    params: NetworkParameters,
    secp: Secp256k1<All>,
}

impl TransactionCodec {
    pub fn new(params: NetworkParameters) -> Self {
        Self {
            params,
            secp: Secp256k1::new(),
        }
    }

    pub fn params(&self) -> &NetworkParameters {
        &self.params
    }

    /// The secp256k1 context shared by signing and verification.
    pub fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    /// Compose an unsigned transaction paying `amount` to `destination`,
    /// with `Σ inputs - amount - fee` returned to `change_address`.
    ///
    /// Change below the dust threshold is added to the fee instead of
    /// creating an output.
    pub fn compose(
        &self,
        utxos: Vec<UnspentOutput>,
        destination: &Address,
        amount: u64,
        fee: u64,
        change_address: &Address,
    ) -> Result<TransactionDraft, CodecError> {
        if utxos.is_empty() {
            return Err(CodecError::NoInputs);
        }
        let available = utxos
            .iter()
            .try_fold(0u64, |acc, u| acc.checked_add(u.amount))
            .ok_or(CodecError::ValueOverflow)?;
        let required = amount.checked_add(fee).ok_or(CodecError::ValueOverflow)?;
        if available < required {
            return Err(CodecError::InsufficientInputs { available, required });
        }

        let inputs = utxos
            .iter()
            .map(|u| TxInput {
                previous_outpoint: u.id,
                signature_script: Vec::new(),
                sequence: 0,
            })
            .collect();

        let mut outputs = vec![TxOutput {
            amount,
            script_public_key: destination.script_public_key(),
        }];

        let mut change = available - required;
        let mut fee = fee;
        if change >= self.params.dust_threshold {
            outputs.push(TxOutput {
                amount: change,
                script_public_key: change_address.script_public_key(),
            });
        } else {
            fee += change;
            change = 0;
        }

        let tx = Transaction {
            version: self.params.tx_version,
            inputs,
            outputs,
            lock_time: 0,
            subnetwork_id: self.params.subnetwork_id,
            gas: 0,
        };

        Ok(TransactionDraft {
            tx,
            utxos,
            destination: destination.clone(),
            amount,
            fee,
            change_address: change_address.clone(),
            change,
        })
    }

    /// Serialize a transaction into its wire form.
    pub fn serialize(tx: &Transaction) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::serialized_len(tx));
        buf.extend_from_slice(&tx.version.to_le_bytes());

        buf.extend_from_slice(&(tx.inputs.len() as u64).to_le_bytes());
        for input in &tx.inputs {
            buf.extend_from_slice(input.previous_outpoint.transaction_id.as_bytes());
            buf.extend_from_slice(&input.previous_outpoint.output_index.to_le_bytes());
            buf.extend_from_slice(&(input.signature_script.len() as u64).to_le_bytes());
            buf.extend_from_slice(&input.signature_script);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }

        buf.extend_from_slice(&(tx.outputs.len() as u64).to_le_bytes());
        for output in &tx.outputs {
            buf.extend_from_slice(&output.amount.to_le_bytes());
            buf.extend_from_slice(&(output.script_public_key.script.len() as u64).to_le_bytes());
            buf.extend_from_slice(&output.script_public_key.script);
        }

        buf.extend_from_slice(&tx.lock_time.to_le_bytes());
        buf.extend_from_slice(&tx.subnetwork_id);
        buf.extend_from_slice(&tx.gas.to_le_bytes());
        buf.extend_from_slice(&[0u8; PAYLOAD_HASH_LEN]);
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf
    }

    /// Length of [`serialize`](Self::serialize) without allocating.
    pub fn serialized_len(tx: &Transaction) -> usize {
        let inputs: usize = tx
            .inputs
            .iter()
            .map(|i| 32 + 4 + 8 + i.signature_script.len() + 8)
            .sum();
        let outputs: usize = tx
            .outputs
            .iter()
            .map(|o| 8 + 8 + o.script_public_key.script.len())
            .sum();
        4 + 8 + inputs + 8 + outputs + 8 + 20 + 8 + PAYLOAD_HASH_LEN + 8
    }

    /// Transaction id: keyed BLAKE2b-256 of the wire form.
    pub fn transaction_id(tx: &Transaction) -> TransactionId {
        TransactionId(crypto::blake2b_256(
            crypto::TRANSACTION_ID_DOMAIN,
            &Self::serialize(tx),
        ))
    }

    /// Size that fees are charged on: wire size less the script-version
    /// bytes exempted per input.
    pub fn fee_bearing_size(tx: &Transaction) -> u64 {
        (Self::serialized_len(tx) as u64)
            .saturating_sub(FEE_EXEMPT_BYTES_PER_INPUT * tx.inputs.len() as u64)
    }

    /// The exact byte buffer that is hashed to produce the signing digest.
    pub fn signature_hash_preimage(
        tx: &Transaction,
        input_index: usize,
        locking_script: &ScriptPublicKey,
        sighash: SigHashType,
    ) -> Result<Vec<u8>, SigningError> {
        if input_index >= tx.inputs.len() {
            return Err(CodecError::InputIndexOutOfBounds {
                index: input_index,
                len: tx.inputs.len(),
            }
            .into());
        }

        let mut copy = tx.clone();
        for (i, input) in copy.inputs.iter_mut().enumerate() {
            input.signature_script = if i == input_index {
                locking_script.script.clone()
            } else {
                Vec::new()
            };
        }

        if sighash.is_none() || sighash.is_single() {
            for (i, input) in copy.inputs.iter_mut().enumerate() {
                if i != input_index {
                    input.sequence = 0;
                }
            }
        }

        if sighash.is_none() {
            copy.outputs.clear();
        } else if sighash.is_single() {
            if input_index >= copy.outputs.len() {
                return Err(SigningError::SingleOutOfRange {
                    index: input_index,
                    outputs: copy.outputs.len(),
                });
            }
            copy.outputs.truncate(input_index + 1);
            for output in copy.outputs.iter_mut().take(input_index) {
                output.amount = u64::MAX;
                output.script_public_key.script.clear();
            }
        }

        if sighash.anyone_can_pay() {
            let signed = copy.inputs.swap_remove(input_index);
            copy.inputs = vec![signed];
        }

        let mut buf = Self::serialize(&copy);
        buf.extend_from_slice(&sighash.to_u32().to_le_bytes());
        Ok(buf)
    }

    /// The 32-byte digest a signature on `input_index` commits to.
    pub fn signature_hash(
        tx: &Transaction,
        input_index: usize,
        locking_script: &ScriptPublicKey,
        sighash: SigHashType,
    ) -> Result<[u8; 32], SigningError> {
        let preimage = Self::signature_hash_preimage(tx, input_index, locking_script, sighash)?;
        let mut digest = crypto::blake2b_256(crypto::SIGNING_HASH_DOMAIN, &preimage);
        digest.reverse();
        Ok(digest)
    }

    /// Sign every input of `draft` with `SIGHASH_ALL`.
    ///
    /// Fails with [`SigningError::MissingKey`] if any spent output belongs to
    /// an address absent from `keys`; no partial signature is produced.
    pub fn sign(
        &self,
        draft: TransactionDraft,
        keys: &HashMap<Address, PrivateKey>,
    ) -> Result<SignedTransaction, SigningError> {
        let sighash = SigHashType::ALL;
        let mut unlocking = Vec::with_capacity(draft.utxos.len());
        for (i, utxo) in draft.utxos.iter().enumerate() {
            let key = keys
                .get(&utxo.address)
                .ok_or_else(|| SigningError::MissingKey(utxo.address.to_string()))?;
            let digest = Self::signature_hash(&draft.tx, i, &utxo.script_public_key, sighash)?;
            let signature = key.sign_schnorr(&self.secp, digest);
            let pubkey = key.public_key(&self.secp).to_bytes();
            unlocking.push(script::unlocking_script(&signature, sighash.to_u8(), &pubkey));
        }

        let mut tx = draft.tx.clone();
        for (input, script) in tx.inputs.iter_mut().zip(unlocking) {
            input.signature_script = script;
        }

        let bytes = Self::serialize(&tx);
        let id = TransactionId(crypto::blake2b_256(crypto::TRANSACTION_ID_DOMAIN, &bytes));
        Ok(SignedTransaction { draft, tx, id, bytes })
    }

    /// Check a signed input against the output it spends.
    pub fn verify_input(
        &self,
        tx: &Transaction,
        input_index: usize,
        utxo: &UnspentOutput,
    ) -> Result<(), SigningError> {
        let input = tx.inputs.get(input_index).ok_or(CodecError::InputIndexOutOfBounds {
            index: input_index,
            len: tx.inputs.len(),
        })?;
        let (signature, raw_type, pubkey_bytes) = script::parse_unlocking_script(&input.signature_script)?;
        let expected_hash = script::extract_pubkey_hash(&utxo.script_public_key.script)
            .ok_or_else(|| CodecError::MalformedScript("not a pay-to-pubkey-hash script".into()))?;
        if crypto::pubkey_hash(&pubkey_bytes) != expected_hash {
            return Err(SigningError::VerificationFailed(input_index));
        }
        let sighash = SigHashType::from_u32(raw_type as u32)?;
        let digest = Self::signature_hash(tx, input_index, &utxo.script_public_key, sighash)?;
        PublicKey::from_bytes(&pubkey_bytes)?
            .verify_schnorr(&self.secp, digest, &signature)
            .map_err(|_| SigningError::VerificationFailed(input_index))
    }

    /// Transaction mass:
    /// `Σ sig_ops(spent script) * mass_per_sig_op + size * mass_per_byte + overhead`.
    pub fn mass(&self, tx: &Transaction, utxos: &[UnspentOutput]) -> u64 {
        let sig_op_mass: u64 = utxos
            .iter()
            .map(|u| {
                script::sig_op_count(&u.script_public_key.script)
                    .unwrap_or(1)
                    .saturating_mul(self.params.mass_per_sig_op)
            })
            .sum();
        let size = Self::serialized_len(tx) as u64;
        sig_op_mass
            .saturating_add(size.saturating_mul(self.params.mass_per_byte))
            .saturating_add(self.params.mass_overhead)
    }

    /// Fee-bearing size once every unsigned input carries a full
    /// unlocking script.
    pub fn signed_fee_bearing_size(tx: &Transaction) -> u64 {
        let unsigned = tx
            .inputs
            .iter()
            .filter(|i| i.signature_script.is_empty())
            .count() as u64;
        Self::fee_bearing_size(tx) + unsigned * script::UNLOCKING_SCRIPT_LEN as u64
    }

    /// [`mass`](Self::mass) of the transaction once every unsigned input
    /// carries a full unlocking script.
    pub fn estimated_mass(&self, tx: &Transaction, utxos: &[UnspentOutput]) -> u64 {
        let unsigned = tx
            .inputs
            .iter()
            .filter(|i| i.signature_script.is_empty())
            .count() as u64;
        self.mass(tx, utxos).saturating_add(
            (unsigned * script::UNLOCKING_SCRIPT_LEN as u64).saturating_mul(self.params.mass_per_byte),
        )
    }

    /// Minimum relay fee for a transaction, sized as if fully signed.
    pub fn minimum_fee(&self, tx: &Transaction) -> u64 {
        Self::signed_fee_bearing_size(tx).saturating_mul(self.params.fee_per_byte)
    }
}

impl std::fmt::Debug for TransactionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCodec")
            .field("network", &self.params.network)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::Network;
    use crate::types::{UtxoEntryRecord, UtxoId, SIGNED_INPUT_SIZE};

    fn codec() -> TransactionCodec {
        TransactionCodec::new(NetworkParameters::for_network(Network::Testnet))
    }

    fn key(byte: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[byte; 32]).unwrap()
    }

    fn address_of(codec: &TransactionCodec, key: &PrivateKey) -> Address {
        Address::from_public_key(&key.public_key(codec.secp()), Network::Testnet)
    }

    fn utxo(codec: &TransactionCodec, owner: &Address, tx: u8, amount: u64) -> UnspentOutput {
        let record = UtxoEntryRecord {
            transaction_id: TransactionId([tx; 32]),
            output_index: tx as u32,
            amount,
            script_public_key: owner.script_public_key(),
            block_daa_score: 100,
            is_coinbase: false,
        };
        UnspentOutput::from_record(record, owner.clone(), codec.params())
    }

    fn destination() -> Address {
        Address::from_pubkey_hash([0xDD; 32], Network::Testnet)
    }

    fn draft_with_two_inputs(codec: &TransactionCodec) -> (TransactionDraft, HashMap<Address, PrivateKey>) {
        let k1 = key(1);
        let k2 = key(2);
        let a1 = address_of(codec, &k1);
        let a2 = address_of(codec, &k2);
        let utxos = vec![utxo(codec, &a1, 1, 50_000), utxo(codec, &a2, 2, 70_000)];
        let change = a1.clone();
        let draft = codec.compose(utxos, &destination(), 100_000, 1_000, &change).unwrap();
        let mut keys = HashMap::new();
        keys.insert(a1, k1);
        keys.insert(a2, k2);
        (draft, keys)
    }

    #[test]
    fn compose_outputs_and_change() {
        let codec = codec();
        let (draft, _) = draft_with_two_inputs(&codec);
        assert_eq!(draft.tx.inputs.len(), 2);
        assert_eq!(draft.tx.outputs.len(), 2);
        assert_eq!(draft.tx.outputs[0].amount, 100_000);
        assert_eq!(draft.tx.outputs[1].amount, 120_000 - 100_000 - 1_000);
        assert_eq!(draft.change, 19_000);
        assert_eq!(draft.tx.lock_time, 0);
        assert_eq!(draft.tx.version, codec.params().tx_version);
        assert_eq!(draft.tx.subnetwork_id, codec.params().subnetwork_id);
    }

    #[test]
    fn compose_folds_dust_change_into_fee() {
        let codec = codec();
        let k = key(3);
        let a = address_of(&codec, &k);
        let utxos = vec![utxo(&codec, &a, 1, 10_100)];
        let draft = codec.compose(utxos, &destination(), 10_000, 0, &a).unwrap();
        assert_eq!(draft.tx.outputs.len(), 1);
        assert_eq!(draft.fee, 100);
        assert_eq!(draft.change, 0);
    }

    #[test]
    fn compose_rejects_insufficient_inputs() {
        let codec = codec();
        let k = key(3);
        let a = address_of(&codec, &k);
        let err = codec
            .compose(vec![utxo(&codec, &a, 1, 500)], &destination(), 1_000, 10, &a)
            .unwrap_err();
        assert_eq!(err, CodecError::InsufficientInputs { available: 500, required: 1_010 });
    }

    #[test]
    fn compose_rejects_no_inputs() {
        let codec = codec();
        let err = codec.compose(vec![], &destination(), 1, 0, &destination()).unwrap_err();
        assert_eq!(err, CodecError::NoInputs);
    }

    #[test]
    fn serialize_layout() {
        let codec = codec();
        let (draft, _) = draft_with_two_inputs(&codec);
        let bytes = TransactionCodec::serialize(&draft.tx);
        assert_eq!(bytes.len(), TransactionCodec::serialized_len(&draft.tx));
        assert_eq!(&bytes[0..4], &0i32.to_le_bytes());
        assert_eq!(&bytes[4..12], &2u64.to_le_bytes());
        // first input: prev txid in natural order, then index
        assert_eq!(&bytes[12..44], &[1u8; 32]);
        assert_eq!(&bytes[44..48], &1u32.to_le_bytes());
        assert_eq!(&bytes[48..56], &0u64.to_le_bytes());
        // trailer: payload hash + reserved are zero
        assert!(bytes[bytes.len() - 41..].iter().all(|&b| b == 0));
    }

    #[test]
    fn signed_size_matches_input_estimate() {
        let codec = codec();
        let (draft, keys) = draft_with_two_inputs(&codec);
        let unsigned_len = TransactionCodec::serialized_len(&draft.tx) as u64;
        let signed = codec.sign(draft, &keys).unwrap();
        let per_input_script = SIGNED_INPUT_SIZE - (32 + 4 + 8 + 8);
        assert_eq!(signed.bytes.len() as u64, unsigned_len + 2 * per_input_script);
    }

    #[test]
    fn sighash_is_stable() {
        let codec = codec();
        let (draft, _) = draft_with_two_inputs(&codec);
        let spk = &draft.utxos[0].script_public_key;
        let p1 = TransactionCodec::signature_hash_preimage(&draft.tx, 0, spk, SigHashType::ALL).unwrap();
        let p2 = TransactionCodec::signature_hash_preimage(&draft.tx, 0, spk, SigHashType::ALL).unwrap();
        assert_eq!(p1, p2);
        let d1 = TransactionCodec::signature_hash(&draft.tx, 0, spk, SigHashType::ALL).unwrap();
        let d2 = TransactionCodec::signature_hash(&draft.tx, 0, spk, SigHashType::ALL).unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn sighash_preimage_ends_with_type() {
        let codec = codec();
        let (draft, _) = draft_with_two_inputs(&codec);
        let spk = &draft.utxos[1].script_public_key;
        let p = TransactionCodec::signature_hash_preimage(&draft.tx, 1, spk, SigHashType::NONE).unwrap();
        assert_eq!(&p[p.len() - 4..], &2u32.to_le_bytes());
    }

    #[test]
    fn sighash_digest_is_reversed_keyed_hash() {
        let codec = codec();
        let (draft, _) = draft_with_two_inputs(&codec);
        let spk = &draft.utxos[0].script_public_key;
        let pre = TransactionCodec::signature_hash_preimage(&draft.tx, 0, spk, SigHashType::ALL).unwrap();
        let mut expected = crypto::blake2b_256(crypto::SIGNING_HASH_DOMAIN, &pre);
        expected.reverse();
        assert_eq!(
            TransactionCodec::signature_hash(&draft.tx, 0, spk, SigHashType::ALL).unwrap(),
            expected
        );
    }

    #[test]
    fn sighash_types_differ() {
        let codec = codec();
        let (draft, _) = draft_with_two_inputs(&codec);
        let spk = &draft.utxos[0].script_public_key;
        let all = TransactionCodec::signature_hash(&draft.tx, 0, spk, SigHashType::ALL).unwrap();
        let none = TransactionCodec::signature_hash(&draft.tx, 0, spk, SigHashType::NONE).unwrap();
        let single = TransactionCodec::signature_hash(&draft.tx, 0, spk, SigHashType::SINGLE).unwrap();
        assert_ne!(all, none);
        assert_ne!(all, single);
        assert_ne!(none, single);
    }

    #[test]
    fn sighash_none_ignores_outputs() {
        let codec = codec();
        let (draft, _) = draft_with_two_inputs(&codec);
        let spk = &draft.utxos[0].script_public_key;
        let mut changed = draft.tx.clone();
        changed.outputs[0].amount += 1;
        assert_eq!(
            TransactionCodec::signature_hash(&draft.tx, 0, spk, SigHashType::NONE).unwrap(),
            TransactionCodec::signature_hash(&changed, 0, spk, SigHashType::NONE).unwrap()
        );
        assert_ne!(
            TransactionCodec::signature_hash(&draft.tx, 0, spk, SigHashType::ALL).unwrap(),
            TransactionCodec::signature_hash(&changed, 0, spk, SigHashType::ALL).unwrap()
        );
    }

    #[test]
    fn sighash_anyone_can_pay_ignores_other_inputs() {
        let codec = codec();
        let (draft, _) = draft_with_two_inputs(&codec);
        let spk = &draft.utxos[0].script_public_key;
        let acp = SigHashType::ALL.with_anyone_can_pay();
        let mut changed = draft.tx.clone();
        changed.inputs[1].previous_outpoint = UtxoId::new(TransactionId([9; 32]), 9);
        assert_eq!(
            TransactionCodec::signature_hash(&draft.tx, 0, spk, acp).unwrap(),
            TransactionCodec::signature_hash(&changed, 0, spk, acp).unwrap()
        );
    }

    #[test]
    fn sighash_single_out_of_range() {
        let codec = codec();
        let (mut draft, _) = draft_with_two_inputs(&codec);
        draft.tx.outputs.truncate(1);
        let spk = draft.utxos[1].script_public_key.clone();
        let err = TransactionCodec::signature_hash(&draft.tx, 1, &spk, SigHashType::SINGLE).unwrap_err();
        assert_eq!(err, SigningError::SingleOutOfRange { index: 1, outputs: 1 });
    }

    #[test]
    fn sighash_index_out_of_bounds() {
        let codec = codec();
        let (draft, _) = draft_with_two_inputs(&codec);
        let spk = draft.utxos[0].script_public_key.clone();
        let err = TransactionCodec::signature_hash(&draft.tx, 5, &spk, SigHashType::ALL).unwrap_err();
        assert_eq!(
            err,
            SigningError::Codec(CodecError::InputIndexOutOfBounds { index: 5, len: 2 })
        );
    }

    #[test]
    fn sighash_type_parsing() {
        assert_eq!(SigHashType::from_u32(0x01).unwrap(), SigHashType::ALL);
        assert!(SigHashType::from_u32(0x83).unwrap().anyone_can_pay());
        assert!(SigHashType::from_u32(0x00).is_err());
        assert!(SigHashType::from_u32(0x04).is_err());
        assert!(SigHashType::from_u32(0x101).is_err());
    }

    #[test]
    fn sign_and_verify_all_inputs() {
        let codec = codec();
        let (draft, keys) = draft_with_two_inputs(&codec);
        let signed = codec.sign(draft, &keys).unwrap();
        for (i, utxo) in signed.draft.utxos.iter().enumerate() {
            assert_eq!(signed.tx.inputs[i].signature_script.len(), script::UNLOCKING_SCRIPT_LEN);
            codec.verify_input(&signed.tx, i, utxo).unwrap();
        }
        assert_eq!(signed.id, TransactionCodec::transaction_id(&signed.tx));
        assert_eq!(signed.bytes, TransactionCodec::serialize(&signed.tx));
    }

    #[test]
    fn tampered_output_fails_verification() {
        let codec = codec();
        let (draft, keys) = draft_with_two_inputs(&codec);
        let signed = codec.sign(draft, &keys).unwrap();
        let mut tx = signed.tx.clone();
        tx.outputs[0].amount -= 1;
        let err = codec.verify_input(&tx, 0, &signed.draft.utxos[0]).unwrap_err();
        assert_eq!(err, SigningError::VerificationFailed(0));
    }

    #[test]
    fn sign_missing_key_fails() {
        let codec = codec();
        let (draft, mut keys) = draft_with_two_inputs(&codec);
        let missing = draft.utxos[1].address.clone();
        keys.remove(&missing);
        let err = codec.sign(draft, &keys).unwrap_err();
        assert_eq!(err, SigningError::MissingKey(missing.to_string()));
    }

    #[test]
    fn signing_is_deterministic() {
        let codec = codec();
        let (draft, keys) = draft_with_two_inputs(&codec);
        let a = codec.sign(draft.clone(), &keys).unwrap();
        let b = codec.sign(draft, &keys).unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn mass_formula() {
        let codec = codec();
        let (draft, keys) = draft_with_two_inputs(&codec);
        let signed = codec.sign(draft, &keys).unwrap();
        let p = codec.params();
        let expected = 2 * p.mass_per_sig_op + signed.bytes.len() as u64 * p.mass_per_byte + p.mass_overhead;
        assert_eq!(codec.mass(&signed.tx, &signed.draft.utxos), expected);
    }

    #[test]
    fn estimated_mass_matches_signed_mass() {
        let codec = codec();
        let (draft, keys) = draft_with_two_inputs(&codec);
        let estimated = codec.estimated_mass(&draft.tx, &draft.utxos);
        let signed = codec.sign(draft, &keys).unwrap();
        assert_eq!(codec.mass(&signed.tx, &signed.draft.utxos), estimated);
    }

    #[test]
    fn fee_bearing_size_excludes_per_input_bytes() {
        let codec = codec();
        let (draft, _) = draft_with_two_inputs(&codec);
        let full = TransactionCodec::serialized_len(&draft.tx) as u64;
        assert_eq!(TransactionCodec::fee_bearing_size(&draft.tx), full - 4);
    }

    #[test]
    fn minimum_fee_matches_signed_size() {
        let codec = codec();
        let (draft, keys) = draft_with_two_inputs(&codec);
        let estimated = codec.minimum_fee(&draft.tx);
        let signed = codec.sign(draft, &keys).unwrap();
        assert_eq!(estimated, TransactionCodec::fee_bearing_size(&signed.tx) * codec.params().fee_per_byte);
        assert_eq!(codec.minimum_fee(&signed.tx), estimated);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn compose_conserves_value(
                amounts in prop::collection::vec(1_000u64..10_000_000, 1..8),
                pay_pct in 1u64..100,
                fee in 0u64..5_000,
            ) {
                let codec = codec();
                let k = key(4);
                let owner = address_of(&codec, &k);
                let total: u64 = amounts.iter().sum();
                let amount = total * pay_pct / 100;
                prop_assume!(amount > 0 && amount + fee <= total);
                let utxos = amounts
                    .iter()
                    .enumerate()
                    .map(|(i, &a)| utxo(&codec, &owner, i as u8, a))
                    .collect();
                let draft = codec.compose(utxos, &destination(), amount, fee, &owner).unwrap();
                let outputs = draft.tx.total_output_value().unwrap();
                prop_assert_eq!(outputs + draft.fee, total);
                prop_assert!(draft.fee >= fee);
                prop_assert!(draft.change == 0 || draft.change >= codec.params().dust_threshold);
            }
        }
    }
}
