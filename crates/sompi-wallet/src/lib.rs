//! # sompi-wallet: HD wallet core for a BlockDAG ledger.
//!
//! Derives receive and change addresses from a BIP-39 seed, tracks the
//! wallet's unspent outputs with confirmation-aware balances, discovers used
//! addresses with a gap limit, and composes, signs and submits transactions
//! through a pluggable [`LedgerService`].
//!
//! # Modules
//!
//! - [`error`]: `WalletError` and `ServiceError`
//! - [`keys`]: Seed and BIP-32 receive/change derivation
//! - [`mnemonic`]: BIP-39 phrase generation and parsing
//! - [`encryption`]: Argon2id + AES-256-GCM export encryption
//! - [`config`]: `WalletOptions`
//! - [`traits`]: ledger service, persistence and transaction log interfaces
//! - [`events`]: wallet event channel
//! - [`ledger`]: UTXO buckets, reservations and balance
//! - [`sync`]: discovery, sync, fee estimation and submission
//! - [`wallet`]: high-level composition

pub mod config;
pub mod encryption;
pub mod error;
pub mod events;
pub mod keys;
pub mod ledger;
pub mod mnemonic;
pub mod sync;
pub mod traits;
pub mod wallet;

// Re-exports for convenient access
pub use config::WalletOptions;
pub use error::{ServiceError, WalletError};
pub use events::{EventSink, WalletEvent};
pub use keys::{Chain, DerivedKey, KeyDerivation, KeyPath, Seed};
pub use ledger::{Balance, Bucket, LedgerSnapshot, UtxoLedger, UtxoSelection};
pub use sync::{
    CacheSnapshot, DiscoveryOutcome, SyncEngine, SyncState, TransactionEstimate, TransactionRequest,
};
pub use traits::{
    AddressedUtxo, CacheStore, LedgerNotification, LedgerService, MemoryStore, MemoryTransactionLog,
    NoopTransactionLog, SecretStore, TransactionLog, TxDirection, TxLogEntry,
};
pub use wallet::Wallet;
