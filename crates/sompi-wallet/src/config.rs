//! Wallet configuration.
//!
//! [`WalletOptions`] can be built programmatically or deserialized from JSON;
//! missing fields take their defaults.

use serde::{Deserialize, Serialize};

/// Default gap limit for address discovery.
pub const DEFAULT_DISCOVERY_EXTENT: u32 = 64;

/// Default cap on inputs gathered by a consolidation send.
pub const DEFAULT_MAX_COMPOUND_UTXOS: usize = 100;

/// Behavioural switches for a wallet instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletOptions {
    /// Do not emit the balance notification that normally closes a sync.
    pub skip_sync_balance: bool,
    /// Sync once and stay `Idle`: no UTXO or score subscriptions.
    pub sync_once: bool,
    /// Gap limit: consecutive unused addresses probed per chain before
    /// discovery stops.
    pub address_discovery_extent: u32,
    /// Skip discovery entirely and only track the current receive address.
    pub disable_address_derivation: bool,
    /// Maximum inputs gathered by [`compound_utxos`](crate::sync::SyncEngine::compound_utxos).
    pub max_compound_utxos: usize,
    /// Log level filter string (e.g. "info", "sompi_wallet=debug"). Read by
    /// the embedding application when it installs a subscriber.
    pub log_level: String,
}

impl Default for WalletOptions {
    fn default() -> Self {
        Self {
            skip_sync_balance: false,
            sync_once: false,
            address_discovery_extent: DEFAULT_DISCOVERY_EXTENT,
            disable_address_derivation: false,
            max_compound_utxos: DEFAULT_MAX_COMPOUND_UTXOS,
            log_level: "info".to_string(),
        }
    }
}

impl WalletOptions {
    /// Parse options from JSON.
    pub fn from_json(json: &str) -> Result<Self, crate::error::WalletError> {
        Ok(serde_json::from_str(json)?)
    }
}
