//! Collaborator interfaces consumed by the wallet.
//!
//! - [`LedgerService`]: remote ledger API (scores, UTXOs, subscriptions, submission)
//! - [`SecretStore`] / [`CacheStore`]: opaque blob persistence
//! - [`TransactionLog`]: append-only record of ledger movements
//!
//! Only in-memory implementations of the persistence and log traits live
//! here; transports and durable backends belong to the embedding application.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedSender;

use sompi_core::address::Address;
use sompi_core::types::{TransactionId, UtxoEntryRecord, UtxoId};

use crate::error::{ServiceError, WalletError};

/// A UTXO reported together with the address it pays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressedUtxo {
    pub address: Address,
    pub entry: UtxoEntryRecord,
}

/// Push notifications delivered by a [`LedgerService`] subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerNotification {
    /// UTXOs appeared on or vanished from subscribed addresses.
    UtxosChanged {
        added: Vec<AddressedUtxo>,
        removed: Vec<UtxoId>,
    },
    /// The virtual blue score advanced.
    ScoreChanged(u64),
    /// The transport (re)connected.
    Connected,
    /// The transport dropped.
    Disconnected,
}

/// Remote ledger API.
///
/// Implementations own transport, retries and timeouts.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Current virtual blue score.
    async fn get_virtual_score(&self) -> Result<u64, ServiceError>;

    /// Unspent outputs for each address. Addresses without UTXOs may be
    /// omitted or map to an empty list.
    async fn get_utxos_by_addresses(
        &self,
        addresses: &[Address],
    ) -> Result<BTreeMap<Address, Vec<UtxoEntryRecord>>, ServiceError>;

    /// Subscribe `addresses` for UTXO changes and the connection for score
    /// changes; notifications are pushed into `sink`.
    async fn subscribe(
        &self,
        addresses: &[Address],
        sink: UnboundedSender<LedgerNotification>,
    ) -> Result<(), ServiceError>;

    /// Submit a serialized signed transaction; returns its id.
    async fn submit_transaction(&self, bytes: Vec<u8>) -> Result<TransactionId, ServiceError>;

    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// Storage for the encrypted wallet secret.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn save_secret(&self, blob: Vec<u8>) -> Result<(), WalletError>;
    async fn load_secret(&self) -> Result<Option<Vec<u8>>, WalletError>;
}

/// Storage for the wallet's address and ledger cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn save_cache(&self, blob: Vec<u8>) -> Result<(), WalletError>;
    async fn load_cache(&self) -> Result<Option<Vec<u8>>, WalletError>;
}

/// In-memory blob store, usable as both [`SecretStore`] and [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    secret: Mutex<Option<Vec<u8>>>,
    cache: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn save_secret(&self, blob: Vec<u8>) -> Result<(), WalletError> {
        *self.secret.lock() = Some(blob);
        Ok(())
    }

    async fn load_secret(&self) -> Result<Option<Vec<u8>>, WalletError> {
        Ok(self.secret.lock().clone())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn save_cache(&self, blob: Vec<u8>) -> Result<(), WalletError> {
        *self.cache.lock() = Some(blob);
        Ok(())
    }

    async fn load_cache(&self) -> Result<Option<Vec<u8>>, WalletError> {
        Ok(self.cache.lock().clone())
    }
}

/// Direction of a logged ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
    /// Value arrived.
    In,
    /// Value left.
    Out,
    /// A pending output vanished near the tip; likely re-reported, not spent.
    Moved,
}

/// One transaction-log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLogEntry {
    pub direction: TxDirection,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Transaction id, or `txid:index` for a single output.
    pub id: String,
    pub amount: u64,
    pub address: Option<Address>,
    pub note: String,
}

impl TxLogEntry {
    /// Build an entry stamped with the current wall-clock time.
    pub fn now(
        direction: TxDirection,
        id: impl Into<String>,
        amount: u64,
        address: Option<Address>,
        note: impl Into<String>,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            direction,
            timestamp,
            id: id.into(),
            amount,
            address,
            note: note.into(),
        }
    }
}

/// Append-only sink for ledger movements. Never read back by the wallet.
pub trait TransactionLog: Send + Sync {
    fn append(&self, entry: TxLogEntry);
}

/// Discards every entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransactionLog;

impl TransactionLog for NoopTransactionLog {
    fn append(&self, _entry: TxLogEntry) {}
}

/// Keeps every entry in memory.
#[derive(Debug, Default)]
pub struct MemoryTransactionLog {
    entries: Mutex<Vec<TxLogEntry>>,
}

impl MemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries appended so far.
    pub fn entries(&self) -> Vec<TxLogEntry> {
        self.entries.lock().clone()
    }
}

impl TransactionLog for MemoryTransactionLog {
    fn append(&self, entry: TxLogEntry) {
        self.entries.lock().push(entry);
    }
}
