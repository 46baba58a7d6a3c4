//! Events published to the embedding application.

use sompi_core::address::Address;
use sompi_core::types::UtxoId;
use tokio::sync::mpsc::UnboundedSender;

use crate::keys::Chain;

/// Notifications emitted by the sync engine, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// An address was derived and is now watched.
    NewAddress { chain: Chain, address: Address },
    /// Spendable or pending balance changed.
    BalanceUpdate {
        available: u64,
        pending: u64,
        total: u64,
    },
    SyncStart,
    SyncFinish,
    /// UTXOs entered or left the ledger.
    UtxoChange {
        added: Vec<UtxoId>,
        removed: Vec<UtxoId>,
    },
}

/// Sending half of the event channel. A dropped receiver silences the
/// wallet rather than failing it.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<WalletEvent>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<WalletEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, event: WalletEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::trace!("events: receiver dropped");
            }
        }
    }
}
