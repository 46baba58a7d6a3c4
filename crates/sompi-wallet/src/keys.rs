//! Seed management and deterministic key derivation.
//!
//! Keys follow the hardened BIP-32 path `m/44'/972'/0'/{chain}'/{index}'`,
//! where chain 0 is the receive chain and chain 1 the change chain. The
//! chain-level extended key is derived once and cached; each address key is a
//! single hardened child step from it.

use bip32::{ChildNumber, DerivationPath, XPrv};
use secp256k1::{All, Secp256k1};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use sompi_core::address::Address;
use sompi_core::constants::{Network, COIN_TYPE};
use sompi_core::crypto::PrivateKey;

use crate::error::WalletError;

/// Length of a BIP-39 seed.
pub const SEED_LEN: usize = 64;

/// A 64-byte BIP-39 seed for deterministic key derivation.
///
/// Secret material is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; SEED_LEN],
}

impl Seed {
    /// Create a seed from raw bytes.
    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self { bytes }
    }

    /// Stretch a mnemonic into its seed with an empty passphrase.
    pub fn from_mnemonic(mnemonic: &bip39::Mnemonic) -> Self {
        Self {
            bytes: mnemonic.to_seed(""),
        }
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.bytes
    }
}

impl Clone for Seed {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}

/// Address chain: external receive addresses or internal change addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Receive,
    Change,
}

impl Chain {
    /// Chain component of the derivation path.
    pub fn index(self) -> u32 {
        match self {
            Self::Receive => 0,
            Self::Change => 1,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Receive => write!(f, "receive"),
            Self::Change => write!(f, "change"),
        }
    }
}

/// A (chain, index) pair naming one derived key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyPath {
    pub chain: Chain,
    pub index: u32,
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m/44'/{COIN_TYPE}'/0'/{}'/{}'",
            self.chain.index(),
            self.index
        )
    }
}

/// One key produced by [`KeyDerivation::get_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub index: u32,
    pub address: Address,
    pub private_key: PrivateKey,
}

/// Per-chain derivation state. `keypairs` and `at_index` only grow.
struct AddressSlot {
    chain_key: XPrv,
    counter: u32,
    current: Option<Address>,
    keypairs: HashMap<Address, PrivateKey>,
    at_index: BTreeMap<u32, Address>,
}

impl AddressSlot {
    fn record(&mut self, index: u32, address: &Address, key: PrivateKey) {
        self.keypairs.insert(address.clone(), key);
        self.at_index.insert(index, address.clone());
    }
}

/// Deterministic receive/change address derivation from a master seed.
pub struct KeyDerivation {
    network: Network,
    secp: Secp256k1<All>,
    receive: AddressSlot,
    change: AddressSlot,
}

impl KeyDerivation {
    /// Create the derivation state for `network` from a seed.
    pub fn new(seed: &Seed, network: Network) -> Result<Self, WalletError> {
        let slot = |chain: Chain| -> Result<AddressSlot, WalletError> {
            let path: DerivationPath = format!("m/44'/{COIN_TYPE}'/0'/{}'", chain.index())
                .parse()
                .map_err(|e: bip32::Error| WalletError::KeyDerivation(e.to_string()))?;
            let chain_key = XPrv::derive_from_path(seed.as_bytes(), &path)
                .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
            Ok(AddressSlot {
                chain_key,
                counter: 0,
                current: None,
                keypairs: HashMap::new(),
                at_index: BTreeMap::new(),
            })
        };
        Ok(Self {
            network,
            secp: Secp256k1::new(),
            receive: slot(Chain::Receive)?,
            change: slot(Chain::Change)?,
        })
    }

    fn slot(&self, chain: Chain) -> &AddressSlot {
        match chain {
            Chain::Receive => &self.receive,
            Chain::Change => &self.change,
        }
    }

    fn slot_mut(&mut self, chain: Chain) -> &mut AddressSlot {
        match chain {
            Chain::Receive => &mut self.receive,
            Chain::Change => &mut self.change,
        }
    }

    /// Derive the address and private key at `(chain, index)`.
    ///
    /// Pure: records nothing.
    pub fn derive_address(&self, chain: Chain, index: u32) -> Result<(Address, PrivateKey), WalletError> {
        let child = ChildNumber::new(index, true)
            .and_then(|n| self.slot(chain).chain_key.derive_child(n))
            .map_err(|e| {
                WalletError::KeyDerivation(format!("{}: {e}", KeyPath { chain, index }))
            })?;
        let private_key = PrivateKey::from_bytes(&child.to_bytes())?;
        let address = Address::from_public_key(&private_key.public_key(&self.secp), self.network);
        Ok((address, private_key))
    }

    /// Derive at the chain's counter, make it current and advance the counter.
    pub fn next(&mut self, chain: Chain) -> Result<Address, WalletError> {
        let index = self.slot(chain).counter;
        let (address, key) = self.derive_address(chain, index)?;
        let slot = self.slot_mut(chain);
        slot.record(index, &address, key);
        slot.current = Some(address.clone());
        slot.counter = index.saturating_add(1);
        Ok(address)
    }

    /// Set the chain's counter to `n`.
    ///
    /// The receive chain derives the address at `n` as its current address
    /// straight away. Change addresses stay lazy.
    pub fn advance(&mut self, chain: Chain, n: u32) -> Result<(), WalletError> {
        self.slot_mut(chain).counter = n;
        if chain == Chain::Receive {
            let (address, key) = self.derive_address(chain, n)?;
            let slot = self.slot_mut(chain);
            slot.record(n, &address, key);
            slot.current = Some(address);
        }
        Ok(())
    }

    /// Undo the last counter increment, floored at zero.
    pub fn reverse(&mut self, chain: Chain) {
        let slot = self.slot_mut(chain);
        slot.counter = slot.counter.saturating_sub(1);
    }

    /// Derive `n` keys starting at `offset` without moving the counter.
    ///
    /// Every derived key is recorded, so repeated calls are idempotent.
    pub fn get_batch(&mut self, n: u32, chain: Chain, offset: u32) -> Result<Vec<DerivedKey>, WalletError> {
        let mut batch = Vec::with_capacity(n as usize);
        for index in offset..offset.saturating_add(n) {
            let (address, private_key) = self.derive_address(chain, index)?;
            self.slot_mut(chain).record(index, &address, private_key);
            batch.push(DerivedKey {
                index,
                address,
                private_key,
            });
        }
        Ok(batch)
    }

    pub fn owns_address(&self, address: &Address) -> bool {
        self.receive.keypairs.contains_key(address) || self.change.keypairs.contains_key(address)
    }

    pub fn owns_change_address(&self, address: &Address) -> bool {
        self.change.keypairs.contains_key(address)
    }

    /// Every recorded address and its key, across both chains.
    pub fn all_keys(&self) -> HashMap<Address, PrivateKey> {
        self.receive
            .keypairs
            .iter()
            .chain(self.change.keypairs.iter())
            .map(|(a, k)| (a.clone(), *k))
            .collect()
    }

    /// The last address made current on a chain.
    pub fn current(&self, chain: Chain) -> Option<&Address> {
        self.slot(chain).current.as_ref()
    }

    /// The next index `next` will derive on a chain.
    pub fn counter(&self, chain: Chain) -> u32 {
        self.slot(chain).counter
    }

    /// Recorded addresses on a chain, in index order.
    pub fn known_addresses(&self, chain: Chain) -> Vec<Address> {
        self.slot(chain).at_index.values().cloned().collect()
    }

    /// Recorded address at an index, if derived.
    pub fn address_at(&self, chain: Chain, index: u32) -> Option<&Address> {
        self.slot(chain).at_index.get(&index)
    }

    pub fn network(&self) -> Network {
        self.network
    }
}

impl fmt::Debug for KeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDerivation")
            .field("network", &self.network)
            .field("receive_counter", &self.receive.counter)
            .field("change_counter", &self.change.counter)
            .field("cached_keys", &(self.receive.keypairs.len() + self.change.keypairs.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Seed {
        Seed::from_bytes([0x42; SEED_LEN])
    }

    fn derivation() -> KeyDerivation {
        KeyDerivation::new(&seed(), Network::Testnet).unwrap()
    }

    #[test]
    fn derive_is_deterministic() {
        let kd = derivation();
        let a = kd.derive_address(Chain::Receive, 7).unwrap();
        let b = kd.derive_address(Chain::Receive, 7).unwrap();
        assert_eq!(a, b);

        let other = KeyDerivation::new(&seed(), Network::Testnet).unwrap();
        assert_eq!(other.derive_address(Chain::Receive, 7).unwrap(), a);
    }

    #[test]
    fn chains_and_indices_differ() {
        let kd = derivation();
        let r0 = kd.derive_address(Chain::Receive, 0).unwrap().0;
        let r1 = kd.derive_address(Chain::Receive, 1).unwrap().0;
        let c0 = kd.derive_address(Chain::Change, 0).unwrap().0;
        assert_ne!(r0, r1);
        assert_ne!(r0, c0);
    }

    #[test]
    fn different_seeds_differ() {
        let a = derivation().derive_address(Chain::Receive, 0).unwrap().0;
        let b = KeyDerivation::new(&Seed::from_bytes([0x43; SEED_LEN]), Network::Testnet)
            .unwrap()
            .derive_address(Chain::Receive, 0)
            .unwrap()
            .0;
        assert_ne!(a, b);
    }

    #[test]
    fn address_uses_network_prefix() {
        let (address, _) = derivation().derive_address(Chain::Receive, 0).unwrap();
        assert!(address.to_string().starts_with("kaspatest:"));
    }

    #[test]
    fn derive_does_not_record() {
        let kd = derivation();
        let (address, _) = kd.derive_address(Chain::Receive, 0).unwrap();
        assert!(!kd.owns_address(&address));
    }

    #[test]
    fn next_advances_counter_and_records() {
        let mut kd = derivation();
        let a0 = kd.next(Chain::Receive).unwrap();
        let a1 = kd.next(Chain::Receive).unwrap();
        assert_ne!(a0, a1);
        assert_eq!(kd.counter(Chain::Receive), 2);
        assert_eq!(kd.current(Chain::Receive), Some(&a1));
        assert!(kd.owns_address(&a0));
        assert!(!kd.owns_change_address(&a0));
        assert_eq!(kd.address_at(Chain::Receive, 0), Some(&a0));
    }

    #[test]
    fn advance_receive_derives_current() {
        let mut kd = derivation();
        kd.advance(Chain::Receive, 3).unwrap();
        assert_eq!(kd.counter(Chain::Receive), 3);
        let expected = kd.derive_address(Chain::Receive, 3).unwrap().0;
        assert_eq!(kd.current(Chain::Receive), Some(&expected));
    }

    #[test]
    fn advance_change_is_lazy() {
        let mut kd = derivation();
        kd.advance(Chain::Change, 4).unwrap();
        assert_eq!(kd.counter(Chain::Change), 4);
        assert_eq!(kd.current(Chain::Change), None);
        assert!(kd.known_addresses(Chain::Change).is_empty());
    }

    #[test]
    fn reverse_floors_at_zero() {
        let mut kd = derivation();
        kd.next(Chain::Change).unwrap();
        kd.reverse(Chain::Change);
        assert_eq!(kd.counter(Chain::Change), 0);
        kd.reverse(Chain::Change);
        assert_eq!(kd.counter(Chain::Change), 0);
    }

    #[test]
    fn reverse_then_next_reuses_address() {
        let mut kd = derivation();
        let first = kd.next(Chain::Change).unwrap();
        kd.reverse(Chain::Change);
        assert_eq!(kd.next(Chain::Change).unwrap(), first);
    }

    #[test]
    fn get_batch_leaves_counter() {
        let mut kd = derivation();
        let batch = kd.get_batch(3, Chain::Receive, 5).unwrap();
        assert_eq!(batch.iter().map(|k| k.index).collect::<Vec<_>>(), vec![5, 6, 7]);
        assert_eq!(kd.counter(Chain::Receive), 0);
        for key in &batch {
            assert!(kd.owns_address(&key.address));
        }
        // idempotent
        let again = kd.get_batch(3, Chain::Receive, 5).unwrap();
        assert_eq!(batch, again);
        assert_eq!(kd.known_addresses(Chain::Receive).len(), 3);
    }

    #[test]
    fn all_keys_spans_both_chains() {
        let mut kd = derivation();
        let r = kd.next(Chain::Receive).unwrap();
        let c = kd.next(Chain::Change).unwrap();
        let keys = kd.all_keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains_key(&r));
        assert!(kd.owns_change_address(&c));
        assert_eq!(keys[&c], kd.derive_address(Chain::Change, 0).unwrap().1);
    }

    #[test]
    fn key_path_display() {
        let path = KeyPath {
            chain: Chain::Change,
            index: 9,
        };
        assert_eq!(path.to_string(), "m/44'/972'/0'/1'/9'");
    }

    #[test]
    fn seed_debug_redacted() {
        let debug = format!("{:?}", seed());
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("42"));
    }
}
