//! Wallet composition: keys, ledger, sync and encrypted export.
//!
//! [`Wallet`] owns one [`SyncEngine`] and the mnemonic it was built from.
//! Everything network-facing is delegated to the engine; the wallet adds
//! secret handling and cache restore on top.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};
use zeroize::Zeroizing;

use sompi_core::address::Address;
use sompi_core::codec::SignedTransaction;
use sompi_core::constants::{Network, NetworkParameters};
use sompi_core::types::TransactionId;

use crate::config::WalletOptions;
use crate::encryption;
use crate::error::WalletError;
use crate::events::WalletEvent;
use crate::keys::{KeyDerivation, Seed};
use crate::ledger::Balance;
use crate::mnemonic;
use crate::sync::{CacheSnapshot, SyncEngine, TransactionEstimate, TransactionRequest};
use crate::traits::{CacheStore, LedgerService, SecretStore, TransactionLog};

/// Magic bytes identifying an exported wallet.
const WALLET_MAGIC: &[u8; 8] = b"SOMPIWLT";

/// Current export format version.
const WALLET_VERSION: u32 = 1;

/// Unencrypted header of an export.
#[derive(Serialize, Deserialize)]
struct ExportHeader {
    magic: String,
    version: u32,
    network: Network,
}

/// Encrypted payload of an export.
#[derive(Serialize, Deserialize)]
struct ExportPayload {
    mnemonic: String,
}

/// An HD wallet bound to one network.
pub struct Wallet {
    network: Network,
    mnemonic: Option<Zeroizing<String>>,
    engine: SyncEngine,
}

impl Wallet {
    /// Create a wallet from a fresh 24-word mnemonic.
    ///
    /// The phrase is kept for [`export_encrypted`](Self::export_encrypted)
    /// and can be read back with [`mnemonic`](Self::mnemonic).
    pub fn create(
        network: Network,
        options: WalletOptions,
        tx_log: Arc<dyn TransactionLog>,
    ) -> Result<Self, WalletError> {
        let phrase = mnemonic::generate_mnemonic()?.to_string();
        Self::from_mnemonic(&phrase, network, options, tx_log)
    }

    /// Restore a wallet from a BIP-39 phrase.
    pub fn from_mnemonic(
        phrase: &str,
        network: Network,
        options: WalletOptions,
        tx_log: Arc<dyn TransactionLog>,
    ) -> Result<Self, WalletError> {
        let parsed = mnemonic::parse_mnemonic(phrase)?;
        let seed = Seed::from_mnemonic(&parsed);
        let mut wallet = Self::from_seed(seed, network, options, tx_log)?;
        wallet.mnemonic = Some(Zeroizing::new(parsed.to_string()));
        Ok(wallet)
    }

    /// Build a wallet straight from a seed. Such a wallet cannot be exported.
    pub fn from_seed(
        seed: Seed,
        network: Network,
        options: WalletOptions,
        tx_log: Arc<dyn TransactionLog>,
    ) -> Result<Self, WalletError> {
        let keys = KeyDerivation::new(&seed, network)?;
        let params = NetworkParameters::for_network(network);
        let mut engine = SyncEngine::new(keys, params, options, tx_log);
        engine.receive_address()?;
        debug!(?network, "wallet: created");
        Ok(Self {
            network,
            mnemonic: None,
            engine,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// The recovery phrase, if the wallet was built from one.
    pub fn mnemonic(&self) -> Option<&str> {
        self.mnemonic.as_ref().map(|m| m.as_str())
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SyncEngine {
        &mut self.engine
    }

    pub fn set_service(&mut self, service: Arc<dyn LedgerService>) {
        self.engine.set_service(service);
    }

    pub fn set_cache_store(&mut self, cache: Arc<dyn CacheStore>) {
        self.engine.set_cache_store(cache);
    }

    pub fn subscribe_events(&mut self) -> UnboundedReceiver<WalletEvent> {
        self.engine.subscribe_events()
    }

    // --- Export ---

    /// Export the mnemonic encrypted under `password`.
    ///
    /// # Format
    /// ```text
    /// header_len (4 bytes LE) || header_json || encrypted_payload
    /// ```
    /// The header carries magic bytes, the format version and the network.
    pub fn export_encrypted(&self, password: &[u8]) -> Result<Vec<u8>, WalletError> {
        let phrase = self
            .mnemonic
            .as_ref()
            .ok_or_else(|| WalletError::InvalidMnemonic("wallet has no mnemonic to export".into()))?;
        let header = ExportHeader {
            magic: String::from_utf8_lossy(WALLET_MAGIC).to_string(),
            version: WALLET_VERSION,
            network: self.network,
        };
        let header_json = serde_json::to_vec(&header)?;
        let payload = Zeroizing::new(serde_json::to_vec(&ExportPayload {
            mnemonic: phrase.as_str().to_string(),
        })?);
        let encrypted = encryption::encrypt(&payload, password)?;

        let header_len = header_json.len() as u32;
        let mut data = Vec::with_capacity(4 + header_json.len() + encrypted.len());
        data.extend_from_slice(&header_len.to_le_bytes());
        data.extend_from_slice(&header_json);
        data.extend_from_slice(&encrypted);
        Ok(data)
    }

    /// Rebuild a wallet from [`export_encrypted`](Self::export_encrypted) output.
    pub fn import_encrypted(
        data: &[u8],
        password: &[u8],
        options: WalletOptions,
        tx_log: Arc<dyn TransactionLog>,
    ) -> Result<Self, WalletError> {
        let Some((len_bytes, rest)) = data.split_first_chunk::<4>() else {
            return Err(WalletError::CorruptedFile("export too short".into()));
        };
        let header_len = u32::from_le_bytes(*len_bytes) as usize;
        if rest.len() < header_len {
            return Err(WalletError::CorruptedFile("header truncated".into()));
        }
        let (header_json, encrypted) = rest.split_at(header_len);

        let header: ExportHeader = serde_json::from_slice(header_json)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid header: {e}")))?;
        if header.magic.as_bytes() != WALLET_MAGIC {
            return Err(WalletError::CorruptedFile("invalid magic bytes".into()));
        }
        if header.version != WALLET_VERSION {
            return Err(WalletError::CorruptedFile(format!(
                "unsupported version: {}",
                header.version
            )));
        }

        let payload_json = Zeroizing::new(encryption::decrypt(encrypted, password)?);
        let payload: ExportPayload = serde_json::from_slice(&payload_json)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid payload: {e}")))?;
        let phrase = Zeroizing::new(payload.mnemonic);

        info!(network = ?header.network, "wallet: imported");
        Self::from_mnemonic(&phrase, header.network, options, tx_log)
    }

    /// Encrypt and hand the secret to `store`.
    pub async fn save_secret(&self, store: &dyn SecretStore, password: &[u8]) -> Result<(), WalletError> {
        store.save_secret(self.export_encrypted(password)?).await
    }

    /// Load and decrypt a secret previously written by [`save_secret`](Self::save_secret).
    pub async fn load_secret(
        store: &dyn SecretStore,
        password: &[u8],
        options: WalletOptions,
        tx_log: Arc<dyn TransactionLog>,
    ) -> Result<Self, WalletError> {
        let data = store
            .load_secret()
            .await?
            .ok_or_else(|| WalletError::Storage("no wallet secret stored".into()))?;
        Self::import_encrypted(&data, password, options, tx_log)
    }

    /// Restore counters and ledger from the cache store, if it holds a
    /// snapshot. Returns whether anything was restored.
    pub async fn load_cache(&mut self, store: &dyn CacheStore) -> Result<bool, WalletError> {
        let Some(blob) = store.load_cache().await? else {
            return Ok(false);
        };
        let snapshot: CacheSnapshot = serde_json::from_slice(&blob)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid cache: {e}")))?;
        debug!(
            receive = snapshot.receive_counter,
            change = snapshot.change_counter,
            "wallet: restoring cache"
        );
        self.engine.restore_cache(snapshot)?;
        Ok(true)
    }

    // --- Delegates ---

    /// Sync using the configured `sync_once` mode.
    pub async fn sync(&mut self) -> Result<(), WalletError> {
        let sync_once = self.engine.options().sync_once;
        self.engine.sync(sync_once).await
    }

    pub fn balance(&self) -> Balance {
        self.engine.balance()
    }

    pub fn receive_address(&mut self) -> Result<Address, WalletError> {
        self.engine.receive_address()
    }

    pub async fn new_receive_address(&mut self) -> Result<Address, WalletError> {
        self.engine.new_receive_address().await
    }

    pub fn estimate(&self, request: &TransactionRequest) -> Result<TransactionEstimate, WalletError> {
        self.engine.estimate(request)
    }

    pub fn compose_transaction(&mut self, request: &TransactionRequest) -> Result<SignedTransaction, WalletError> {
        self.engine.compose_transaction(request)
    }

    pub async fn submit_transaction(&mut self, request: &TransactionRequest) -> Result<TransactionId, WalletError> {
        self.engine.submit_transaction(request).await
    }

    pub async fn compound_utxos(&mut self) -> Result<TransactionId, WalletError> {
        self.engine.compound_utxos().await
    }

    pub async fn process_pending_notifications(&mut self) -> Result<usize, WalletError> {
        self.engine.process_pending_notifications().await
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("network", &self.network)
            .field("has_mnemonic", &self.mnemonic.is_some())
            .field("engine", &self.engine)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{Chain, SEED_LEN};
    use crate::traits::{MemoryStore, NoopTransactionLog};

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
        abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
        abandon abandon abandon abandon abandon art";

    fn log() -> Arc<dyn TransactionLog> {
        Arc::new(NoopTransactionLog)
    }

    fn wallet() -> Wallet {
        Wallet::from_mnemonic(PHRASE, Network::Testnet, WalletOptions::default(), log()).unwrap()
    }

    #[test]
    fn receive_address_exists_on_creation() {
        let mut w = wallet();
        let addr = w.receive_address().unwrap();
        assert_eq!(addr.network(), Network::Testnet);
        assert_eq!(w.engine().keys().counter(Chain::Receive), 0);
    }

    #[test]
    fn same_phrase_same_addresses() {
        let mut a = wallet();
        let mut b = wallet();
        assert_eq!(a.receive_address().unwrap(), b.receive_address().unwrap());
    }

    #[test]
    fn invalid_phrase_rejected() {
        let err = Wallet::from_mnemonic("not a phrase", Network::Mainnet, WalletOptions::default(), log())
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidMnemonic(_)));
    }

    #[test]
    fn export_import_roundtrip() {
        let mut original = wallet();
        let data = original.export_encrypted(b"hunter2").unwrap();
        let mut restored =
            Wallet::import_encrypted(&data, b"hunter2", WalletOptions::default(), log()).unwrap();
        assert_eq!(restored.network(), Network::Testnet);
        assert_eq!(restored.mnemonic(), original.mnemonic());
        assert_eq!(restored.receive_address().unwrap(), original.receive_address().unwrap());
    }

    #[test]
    fn import_wrong_password() {
        let data = wallet().export_encrypted(b"right").unwrap();
        let err = Wallet::import_encrypted(&data, b"wrong", WalletOptions::default(), log()).unwrap_err();
        assert_eq!(err, WalletError::InvalidPassword);
    }

    #[test]
    fn import_bad_magic() {
        let mut data = wallet().export_encrypted(b"pw").unwrap();
        // first byte of the magic string inside the header JSON
        let pos = data.windows(8).position(|w| w == WALLET_MAGIC).unwrap();
        data[pos] = b'X';
        let err = Wallet::import_encrypted(&data, b"pw", WalletOptions::default(), log()).unwrap_err();
        assert_eq!(err, WalletError::CorruptedFile("invalid magic bytes".into()));
    }

    #[test]
    fn import_truncated() {
        let err = Wallet::import_encrypted(&[1, 0], b"pw", WalletOptions::default(), log()).unwrap_err();
        assert!(matches!(err, WalletError::CorruptedFile(_)));
        let err = Wallet::import_encrypted(&[200, 0, 0, 0, b'{'], b"pw", WalletOptions::default(), log())
            .unwrap_err();
        assert_eq!(err, WalletError::CorruptedFile("header truncated".into()));
    }

    #[test]
    fn seed_wallet_cannot_export() {
        let w = Wallet::from_seed(
            Seed::from_bytes([3; SEED_LEN]),
            Network::Mainnet,
            WalletOptions::default(),
            log(),
        )
        .unwrap();
        assert!(w.mnemonic().is_none());
        assert!(matches!(w.export_encrypted(b"pw"), Err(WalletError::InvalidMnemonic(_))));
    }

    #[tokio::test]
    async fn secret_store_roundtrip() {
        let store = MemoryStore::new();
        let original = wallet();
        original.save_secret(&store, b"pw").await.unwrap();
        let loaded = Wallet::load_secret(&store, b"pw", WalletOptions::default(), log())
            .await
            .unwrap();
        assert_eq!(loaded.mnemonic(), original.mnemonic());
    }

    #[tokio::test]
    async fn load_secret_from_empty_store() {
        let err = Wallet::load_secret(&MemoryStore::new(), b"pw", WalletOptions::default(), log())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Storage(_)));
    }

    #[tokio::test]
    async fn cache_roundtrip() {
        let store = MemoryStore::new();
        let mut w = wallet();
        w.engine_mut().keys_mut().advance(Chain::Change, 4).unwrap();
        let blob = serde_json::to_vec(&w.engine().cache_snapshot()).unwrap();
        store.save_cache(blob).await.unwrap();

        let mut fresh = wallet();
        assert!(fresh.load_cache(&store).await.unwrap());
        assert_eq!(fresh.engine().keys().counter(Chain::Change), 4);
        assert!(!wallet().load_cache(&MemoryStore::new()).await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_cache_rejected() {
        let store = MemoryStore::new();
        store.save_cache(b"not json".to_vec()).await.unwrap();
        let err = wallet().load_cache(&store).await.unwrap_err();
        assert!(matches!(err, WalletError::CorruptedFile(_)));
    }
}
