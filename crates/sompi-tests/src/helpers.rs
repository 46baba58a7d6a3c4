//! Shared test helpers for integration tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;

use sompi_core::address::Address;
use sompi_core::constants::Network;
use sompi_core::crypto;
use sompi_core::types::{TransactionId, UtxoEntryRecord, UtxoId};
use sompi_wallet::config::WalletOptions;
use sompi_wallet::error::{ServiceError, WalletError};
use sompi_wallet::traits::{
    AddressedUtxo, CacheStore, LedgerNotification, LedgerService, SecretStore, TransactionLog,
};
use sompi_wallet::wallet::Wallet;

/// Fixed test phrase.
pub const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
    abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
    abandon abandon abandon abandon abandon art";

/// Install a test-writer subscriber honouring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Testnet wallet from [`PHRASE`] wired to `service`.
pub fn wallet_with(
    service: &Arc<MockLedgerService>,
    options: WalletOptions,
    tx_log: Arc<dyn TransactionLog>,
) -> Wallet {
    let mut wallet = Wallet::from_mnemonic(PHRASE, Network::Testnet, options, tx_log)
        .expect("test phrase is valid");
    wallet.set_service(service.clone());
    wallet
}

/// Options with a small gap limit for fast discovery.
pub fn options(extent: u32) -> WalletOptions {
    WalletOptions {
        address_discovery_extent: extent,
        ..WalletOptions::default()
    }
}

/// Address owned by nobody in the tests.
pub fn foreign_address() -> Address {
    Address::from_pubkey_hash([0xEE; 32], Network::Testnet)
}

#[derive(Default)]
struct MockState {
    score: u64,
    next_tx: u32,
    utxos: BTreeMap<Address, Vec<UtxoEntryRecord>>,
    subscribed: BTreeSet<Address>,
    sinks: Vec<UnboundedSender<LedgerNotification>>,
    queries: Vec<Vec<Address>>,
    submitted: Vec<Vec<u8>>,
    fail_submit: Option<ServiceError>,
    fail_queries: bool,
    score_gate: Option<Arc<Notify>>,
}

/// In-process ledger service with scriptable UTXO state.
pub struct MockLedgerService {
    state: Mutex<MockState>,
    connected: AtomicBool,
}

impl MockLedgerService {
    pub fn new(score: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                score,
                ..MockState::default()
            }),
            connected: AtomicBool::new(true),
        })
    }

    /// Create an output paying `address` and return its record.
    pub fn fund(&self, address: &Address, amount: u64, daa_score: u64) -> UtxoEntryRecord {
        let mut state = self.state.lock();
        state.next_tx += 1;
        let mut txid = [0u8; 32];
        txid[..4].copy_from_slice(&state.next_tx.to_le_bytes());
        let record = UtxoEntryRecord {
            transaction_id: TransactionId(txid),
            output_index: 0,
            amount,
            script_public_key: address.script_public_key(),
            block_daa_score: daa_score,
            is_coinbase: false,
        };
        state.utxos.entry(address.clone()).or_default().push(record.clone());
        record
    }

    /// Fund `address` and push the change to every subscriber.
    pub fn fund_and_notify(&self, address: &Address, amount: u64, daa_score: u64) -> UtxoId {
        let record = self.fund(address, amount, daa_score);
        let id = record.id();
        self.notify(LedgerNotification::UtxosChanged {
            added: vec![AddressedUtxo {
                address: address.clone(),
                entry: record,
            }],
            removed: vec![],
        });
        id
    }

    /// Drop an output silently, as if spent while nobody was listening.
    pub fn spend(&self, id: &UtxoId) {
        let mut state = self.state.lock();
        for records in state.utxos.values_mut() {
            records.retain(|r| r.id() != *id);
        }
    }

    pub fn set_score(&self, score: u64) {
        self.state.lock().score = score;
    }

    /// Push a notification to every subscriber.
    pub fn notify(&self, notification: LedgerNotification) {
        let state = self.state.lock();
        for sink in &state.sinks {
            let _ = sink.send(notification.clone());
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn fail_submissions(&self, error: Option<ServiceError>) {
        self.state.lock().fail_submit = error;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.state.lock().fail_queries = fail;
    }

    /// Make `get_virtual_score` wait until the returned handle is notified.
    pub fn gate_score(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().score_gate = Some(gate.clone());
        gate
    }

    pub fn open_score_gate(&self) {
        self.state.lock().score_gate = None;
    }

    /// Every address batch passed to `get_utxos_by_addresses`, in order.
    pub fn queries(&self) -> Vec<Vec<Address>> {
        self.state.lock().queries.clone()
    }

    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.state.lock().submitted.clone()
    }

    pub fn subscribed(&self) -> BTreeSet<Address> {
        self.state.lock().subscribed.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().sinks.len()
    }
}

#[async_trait]
impl LedgerService for MockLedgerService {
    async fn get_virtual_score(&self) -> Result<u64, ServiceError> {
        let gate = self.state.lock().score_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.state.lock().score)
    }

    async fn get_utxos_by_addresses(
        &self,
        addresses: &[Address],
    ) -> Result<BTreeMap<Address, Vec<UtxoEntryRecord>>, ServiceError> {
        let mut state = self.state.lock();
        state.queries.push(addresses.to_vec());
        if state.fail_queries {
            return Err(ServiceError::Connection("query refused".into()));
        }
        Ok(addresses
            .iter()
            .filter_map(|a| state.utxos.get(a).map(|u| (a.clone(), u.clone())))
            .collect())
    }

    async fn subscribe(
        &self,
        addresses: &[Address],
        sink: UnboundedSender<LedgerNotification>,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        state.subscribed.extend(addresses.iter().cloned());
        if !state.sinks.iter().any(|s| s.same_channel(&sink)) {
            state.sinks.push(sink);
        }
        Ok(())
    }

    async fn submit_transaction(&self, bytes: Vec<u8>) -> Result<TransactionId, ServiceError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_submit.clone() {
            return Err(error);
        }
        let id = TransactionId(crypto::blake2b_256(crypto::TRANSACTION_ID_DOMAIN, &bytes));
        state.submitted.push(bytes);
        Ok(id)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Blob store writing one file per blob under a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    async fn write(&self, name: &str, blob: Vec<u8>) -> Result<(), WalletError> {
        tokio::fs::write(self.dir.join(name), blob)
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))
    }

    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, WalletError> {
        match tokio::fs::read(self.dir.join(name)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WalletError::Storage(e.to_string())),
        }
    }
}

#[async_trait]
impl SecretStore for FileStore {
    async fn save_secret(&self, blob: Vec<u8>) -> Result<(), WalletError> {
        self.write("wallet.secret", blob).await
    }

    async fn load_secret(&self) -> Result<Option<Vec<u8>>, WalletError> {
        self.read("wallet.secret").await
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn save_cache(&self, blob: Vec<u8>) -> Result<(), WalletError> {
        self.write("wallet.cache", blob).await
    }

    async fn load_cache(&self) -> Result<Option<Vec<u8>>, WalletError> {
        self.read("wallet.cache").await
    }
}
