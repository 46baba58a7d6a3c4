//! Sync engine: address discovery, ledger ingestion, fee estimation,
//! submission and reconciliation against a remote [`LedgerService`].
//!
//! State machine:
//!
//! ```text
//! Idle ──sync──▶ Discovering ──ok, subscribe──▶ Subscribed
//!                     │                             │
//!                     └──ok (sync once) / err──▶ Idle ◀──disconnect
//! ```
//!
//! Receive discovery always finishes before change discovery starts.
//! Balance notifications are held back while a sync is in progress and while
//! bulk UTXO ingestion is running.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use sompi_core::address::Address;
use sompi_core::codec::{SignedTransaction, TransactionCodec, TransactionDraft};
use sompi_core::constants::NetworkParameters;
use sompi_core::types::{TransactionId, UnspentOutput, UtxoId};

use crate::config::WalletOptions;
use crate::error::WalletError;
use crate::events::{EventSink, WalletEvent};
use crate::keys::{Chain, KeyDerivation};
use crate::ledger::{Balance, LedgerSnapshot, UtxoLedger};
use crate::traits::{CacheStore, LedgerNotification, LedgerService, TransactionLog, TxDirection, TxLogEntry};

/// Sync engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Not syncing and not subscribed.
    Idle,
    /// Discovery and initial ingestion are running.
    Discovering,
    /// Synced and receiving change notifications.
    Subscribed,
}

/// Parameters of a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub destination: Address,
    /// Amount in sompi. With `inclusive_fee` the fee comes out of it.
    pub amount: u64,
    /// Fee paid on top of the network minimum.
    pub priority_fee: u64,
    /// Add the network minimum fee automatically. When false, the priority
    /// fee alone must cover the minimum.
    pub calculate_network_fee: bool,
    /// Deduct the fee from `amount` instead of adding it.
    pub inclusive_fee: bool,
    /// Ceiling for an automatically calculated fee.
    pub max_fee: Option<u64>,
}

impl TransactionRequest {
    /// A request paying `amount` to `destination` with automatic fees.
    pub fn new(destination: Address, amount: u64) -> Self {
        Self {
            destination,
            amount,
            priority_fee: 0,
            calculate_network_fee: true,
            inclusive_fee: false,
            max_fee: None,
        }
    }

    pub fn with_priority_fee(mut self, fee: u64) -> Self {
        self.priority_fee = fee;
        self
    }

    pub fn with_max_fee(mut self, max: u64) -> Self {
        self.max_fee = Some(max);
        self
    }

    pub fn inclusive(mut self) -> Self {
        self.inclusive_fee = true;
        self
    }

    /// Disable automatic fee calculation.
    pub fn fixed_fee(mut self) -> Self {
        self.calculate_network_fee = false;
        self
    }
}

/// A composed, unsigned transaction and its cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEstimate {
    pub draft: TransactionDraft,
    /// Network minimum fee for the signed transaction.
    pub minimum_fee: u64,
    /// Mass of the signed transaction.
    pub mass: u64,
}

/// What a discovery run found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    pub last_receive: Option<u32>,
    pub last_change: Option<u32>,
}

/// Cached wallet state: derivation counters and ledger contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub receive_counter: u32,
    pub change_counter: u32,
    pub ledger: LedgerSnapshot,
}

/// Orchestrates key derivation, the UTXO ledger, the codec and the ledger
/// service for one wallet.
pub struct SyncEngine {
    params: NetworkParameters,
    options: WalletOptions,
    keys: KeyDerivation,
    ledger: UtxoLedger,
    codec: TransactionCodec,
    service: Option<Arc<dyn LedgerService>>,
    cache: Option<Arc<dyn CacheStore>>,
    tx_log: Arc<dyn TransactionLog>,
    events: EventSink,
    state: SyncState,
    sync_in_progress: bool,
    notifications_suppressed: bool,
    last_observed: Option<Balance>,
    notifications_tx: UnboundedSender<LedgerNotification>,
    notifications_rx: UnboundedReceiver<LedgerNotification>,
}

impl SyncEngine {
    pub fn new(
        keys: KeyDerivation,
        params: NetworkParameters,
        options: WalletOptions,
        tx_log: Arc<dyn TransactionLog>,
    ) -> Self {
        let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
        Self {
            ledger: UtxoLedger::with_log(params.clone(), tx_log.clone()),
            codec: TransactionCodec::new(params.clone()),
            params,
            options,
            keys,
            service: None,
            cache: None,
            tx_log,
            events: EventSink::default(),
            state: SyncState::Idle,
            sync_in_progress: false,
            notifications_suppressed: false,
            last_observed: None,
            notifications_tx,
            notifications_rx,
        }
    }

    pub fn set_service(&mut self, service: Arc<dyn LedgerService>) {
        self.service = Some(service);
    }

    pub fn set_cache_store(&mut self, cache: Arc<dyn CacheStore>) {
        self.cache = Some(cache);
    }

    /// Start a fresh event channel; events go to the returned receiver.
    pub fn subscribe_events(&mut self) -> UnboundedReceiver<WalletEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = EventSink::new(tx);
        rx
    }

    /// Sender for pushing ledger notifications into this engine.
    pub fn notification_sender(&self) -> UnboundedSender<LedgerNotification> {
        self.notifications_tx.clone()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.sync_in_progress
    }

    pub fn options(&self) -> &WalletOptions {
        &self.options
    }

    pub fn params(&self) -> &NetworkParameters {
        &self.params
    }

    pub fn keys(&self) -> &KeyDerivation {
        &self.keys
    }

    pub fn keys_mut(&mut self) -> &mut KeyDerivation {
        &mut self.keys
    }

    pub fn ledger(&self) -> &UtxoLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut UtxoLedger {
        &mut self.ledger
    }

    pub fn codec(&self) -> &TransactionCodec {
        &self.codec
    }

    pub fn balance(&self) -> Balance {
        self.ledger.balance()
    }

    fn service(&self) -> Result<Arc<dyn LedgerService>, WalletError> {
        self.service.clone().ok_or(WalletError::MissingServiceProvider)
    }

    /// The current receive address, deriving index 0 on first use.
    pub fn receive_address(&mut self) -> Result<Address, WalletError> {
        if let Some(address) = self.keys.current(Chain::Receive) {
            return Ok(address.clone());
        }
        let n = self.keys.counter(Chain::Receive);
        self.keys.advance(Chain::Receive, n)?;
        self.keys
            .current(Chain::Receive)
            .cloned()
            .ok_or_else(|| WalletError::KeyDerivation("no current receive address".into()))
    }

    /// Derive the next receive address and start watching it.
    pub async fn new_receive_address(&mut self) -> Result<Address, WalletError> {
        let previous = self.keys.current(Chain::Receive).cloned();
        let mut address = self.keys.next(Chain::Receive)?;
        // After `advance` the current address sits at the counter itself.
        if previous.as_ref() == Some(&address) {
            address = self.keys.next(Chain::Receive)?;
        }
        self.watch_address(Chain::Receive, address.clone()).await;
        Ok(address)
    }

    /// Announce a newly derived address and subscribe it when live.
    async fn watch_address(&mut self, chain: Chain, address: Address) {
        debug!(%chain, %address, "sync: new address");
        self.events.emit(WalletEvent::NewAddress {
            chain,
            address: address.clone(),
        });
        if self.state != SyncState::Subscribed {
            return;
        }
        if let Some(service) = self.service.clone() {
            if let Err(e) = service
                .subscribe(std::slice::from_ref(&address), self.notifications_tx.clone())
                .await
            {
                warn!(%address, error = %e, "sync: failed to subscribe new address");
            }
        }
    }

    // --- Discovery ---

    /// Gap-limit discovery over both chains, receive first.
    ///
    /// Advances the receive counter past the last active receive index and
    /// the change counter past the last active change index.
    pub async fn discover(&mut self, threshold: u32) -> Result<DiscoveryOutcome, WalletError> {
        if self.state == SyncState::Discovering {
            return Err(WalletError::SyncConflict);
        }
        let service = self.service()?;
        self.run_discovery(&service, threshold).await
    }

    async fn run_discovery(
        &mut self,
        service: &Arc<dyn LedgerService>,
        threshold: u32,
    ) -> Result<DiscoveryOutcome, WalletError> {
        let last_receive = self.discover_chain(service, Chain::Receive, threshold).await?;
        let last_change = self.discover_chain(service, Chain::Change, threshold).await?;
        self.settle_counter(Chain::Receive, last_receive)?;
        self.settle_counter(Chain::Change, last_change)?;
        info!(?last_receive, ?last_change, "sync: discovery complete");
        Ok(DiscoveryOutcome {
            last_receive,
            last_change,
        })
    }

    /// Move a chain's counter past its last active index. Counters never move
    /// backward, so addresses handed out since the last sync stay reserved.
    fn settle_counter(&mut self, chain: Chain, last_active: Option<u32>) -> Result<(), WalletError> {
        let target = last_active.map_or(0, |i| i.saturating_add(1));
        let counter = self.keys.counter(chain);
        if target > counter || self.keys.current(chain).is_none() {
            self.keys.advance(chain, target.max(counter))?;
        }
        Ok(())
    }

    /// Probe one chain in batches until `threshold` consecutive addresses
    /// past the last active one show no UTXOs.
    async fn discover_chain(
        &mut self,
        service: &Arc<dyn LedgerService>,
        chain: Chain,
        threshold: u32,
    ) -> Result<Option<u32>, WalletError> {
        let threshold = threshold.max(1);
        let mut offset = 0u32;
        let mut batch_size = threshold;
        let mut last_active = None;

        loop {
            let batch = self.keys.get_batch(batch_size, chain, offset)?;
            let addresses: Vec<Address> = batch.iter().map(|k| k.address.clone()).collect();
            let highest = match service.get_utxos_by_addresses(&addresses).await {
                Ok(found) => batch
                    .iter()
                    .filter(|k| found.get(&k.address).is_some_and(|u| !u.is_empty()))
                    .map(|k| k.index)
                    .max(),
                Err(e) => {
                    warn!(%chain, offset, error = %e, "sync: discovery round failed, treating as inactive");
                    None
                }
            };
            debug!(%chain, offset, batch_size, ?highest, "sync: discovery batch");

            let Some(highest) = highest else {
                return Ok(last_active);
            };
            last_active = Some(highest);
            // Unused addresses already probed past `highest` count toward the gap.
            let end = offset.saturating_add(batch_size);
            let trailing = end - 1 - highest;
            offset = end;
            batch_size = threshold - trailing;
        }
    }

    // --- Sync ---

    /// Discover addresses, ingest their UTXOs and, unless `sync_once`,
    /// subscribe for changes.
    pub async fn sync(&mut self, sync_once: bool) -> Result<(), WalletError> {
        if self.state == SyncState::Discovering
            || (sync_once && self.state == SyncState::Subscribed)
        {
            return Err(WalletError::SyncConflict);
        }
        let service = self.service()?;
        self.run_sync(service, sync_once, false).await
    }

    async fn run_sync(
        &mut self,
        service: Arc<dyn LedgerService>,
        sync_once: bool,
        reconcile: bool,
    ) -> Result<(), WalletError> {
        if !service.is_connected() {
            return Err(WalletError::RpcConnection("ledger service not connected".into()));
        }
        info!(sync_once, "sync: starting");
        self.state = SyncState::Discovering;
        self.sync_in_progress = true;
        self.events.emit(WalletEvent::SyncStart);

        let result = self.sync_steps(&service, sync_once, reconcile).await;

        self.sync_in_progress = false;
        self.state = match (&result, sync_once) {
            (Ok(()), false) => SyncState::Subscribed,
            _ => SyncState::Idle,
        };
        self.events.emit(WalletEvent::SyncFinish);

        match result {
            Ok(()) => {
                if self.options.skip_sync_balance {
                    self.last_observed = Some(self.ledger.balance());
                } else {
                    self.notify_balance();
                }
                self.persist_cache().await;
                info!(state = ?self.state, balance = ?self.ledger.balance(), "sync: finished");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "sync: failed");
                Err(e)
            }
        }
    }

    async fn sync_steps(
        &mut self,
        service: &Arc<dyn LedgerService>,
        sync_once: bool,
        reconcile: bool,
    ) -> Result<(), WalletError> {
        let score = service.get_virtual_score().await?;
        self.ledger.set_blue_score(score);

        if self.options.disable_address_derivation {
            self.receive_address()?;
        } else {
            self.run_discovery(service, self.options.address_discovery_extent)
                .await?;
        }

        self.ingest_all(service).await?;

        if reconcile {
            let outcome = self.ledger.reconcile_reservations();
            info!(
                released = outcome.released.len(),
                dropped = outcome.dropped.len(),
                "sync: reconciled reservations"
            );
            if !outcome.dropped.is_empty() {
                self.events.emit(WalletEvent::UtxoChange {
                    added: Vec::new(),
                    removed: outcome.dropped,
                });
            }
        }

        if !sync_once {
            let addresses = self.watched_addresses();
            service
                .subscribe(&addresses, self.notifications_tx.clone())
                .await?;
            debug!(count = addresses.len(), "sync: subscribed");
        }
        Ok(())
    }

    /// Every recorded address plus the current receive address.
    fn watched_addresses(&self) -> Vec<Address> {
        let mut addresses = self.keys.known_addresses(Chain::Receive);
        addresses.extend(self.keys.known_addresses(Chain::Change));
        addresses
    }

    /// Fetch and ingest UTXOs for every watched address.
    async fn ingest_all(&mut self, service: &Arc<dyn LedgerService>) -> Result<(), WalletError> {
        let addresses = self.watched_addresses();
        let found = service.get_utxos_by_addresses(&addresses).await?;

        self.notifications_suppressed = true;
        let mut added = Vec::new();
        for (address, records) in found {
            if !self.keys.owns_address(&address) {
                warn!(%address, "sync: ignoring utxos for unknown address");
                continue;
            }
            added.extend(self.ledger.add(records, &address));
        }
        self.notifications_suppressed = false;

        debug!(count = added.len(), "sync: ingested utxos");
        if !added.is_empty() {
            self.events.emit(WalletEvent::UtxoChange {
                added,
                removed: Vec::new(),
            });
        }
        Ok(())
    }

    // --- Notifications ---

    /// Apply one ledger notification.
    pub async fn handle_notification(&mut self, notification: LedgerNotification) -> Result<(), WalletError> {
        match notification {
            LedgerNotification::UtxosChanged { added, removed } => {
                let receive = self.keys.current(Chain::Receive).cloned();
                let mut receive_used = false;
                let mut added_ids = Vec::new();
                for utxo in added {
                    if !self.keys.owns_address(&utxo.address) {
                        continue;
                    }
                    receive_used |= receive.as_ref() == Some(&utxo.address);
                    added_ids.extend(self.ledger.add(vec![utxo.entry], &utxo.address));
                }
                let removed_ids = self.ledger.remove(&removed);

                if !added_ids.is_empty() || !removed_ids.is_empty() {
                    self.events.emit(WalletEvent::UtxoChange {
                        added: added_ids,
                        removed: removed_ids,
                    });
                }
                if receive_used && !self.options.disable_address_derivation {
                    self.new_receive_address().await?;
                }
                self.notify_balance();
                self.persist_cache().await;
            }
            LedgerNotification::ScoreChanged(score) => {
                let promoted = self.ledger.set_blue_score(score);
                if !promoted.is_empty() {
                    debug!(score, count = promoted.len(), "sync: outputs matured");
                    self.notify_balance();
                }
            }
            LedgerNotification::Connected => {
                self.reconnect().await?;
            }
            LedgerNotification::Disconnected => {
                info!(state = ?self.state, "sync: service disconnected");
                self.state = SyncState::Idle;
                self.sync_in_progress = false;
                self.notifications_suppressed = false;
            }
        }
        Ok(())
    }

    /// Apply every notification already queued; returns how many ran.
    pub async fn process_pending_notifications(&mut self) -> Result<usize, WalletError> {
        let mut count = 0;
        while let Ok(notification) = self.notifications_rx.try_recv() {
            self.handle_notification(notification).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Wait for the next notification and apply it.
    pub async fn process_next_notification(&mut self) -> Result<(), WalletError> {
        match self.notifications_rx.recv().await {
            Some(notification) => self.handle_notification(notification).await,
            None => Ok(()),
        }
    }

    /// Re-run discovery and ingestion from scratch after a reconnect, then
    /// settle reservations against what the service still reports. A failed
    /// resync leaves the ledger as it was before the reconnect.
    async fn reconnect(&mut self) -> Result<(), WalletError> {
        if self.state == SyncState::Discovering {
            debug!("sync: reconnect during discovery ignored");
            return Ok(());
        }
        let service = self.service()?;
        info!("sync: reconnected, resyncing");
        self.state = SyncState::Idle;
        let previous = self.ledger.snapshot();
        self.ledger.reset_for_resync();
        let result = self.run_sync(service, self.options.sync_once, true).await;
        if result.is_err() {
            warn!("sync: resync failed, restoring previous ledger");
            self.ledger.restore(previous);
        }
        result
    }

    /// Emit a balance update if the balance moved since the last one.
    fn notify_balance(&mut self) {
        if self.sync_in_progress || self.notifications_suppressed {
            return;
        }
        let balance = self.ledger.balance();
        if self.last_observed == Some(balance) {
            return;
        }
        self.last_observed = Some(balance);
        self.events.emit(WalletEvent::BalanceUpdate {
            available: balance.confirmed,
            pending: balance.pending,
            total: balance.total(),
        });
    }

    // --- Sending ---

    /// Compose a draft for `request` with change to `change_address`,
    /// iterating the fee until it covers the network minimum.
    fn build_estimate(
        &self,
        request: &TransactionRequest,
        change_address: &Address,
    ) -> Result<TransactionEstimate, WalletError> {
        if request.amount == 0 {
            return Err(WalletError::InvalidAmount("amount must be non-zero".into()));
        }
        let mut fee = request.priority_fee;
        loop {
            let amount = if request.inclusive_fee {
                request.amount.checked_sub(fee).filter(|a| *a > 0).ok_or_else(|| {
                    WalletError::InvalidAmount(format!(
                        "amount {} does not cover fee {fee}",
                        request.amount
                    ))
                })?
            } else {
                request.amount
            };
            let needed = amount
                .checked_add(fee)
                .ok_or_else(|| WalletError::InvalidAmount("amount plus fee overflows".into()))?;
            let selection = self.ledger.select_utxos(needed)?;
            let draft = self.codec.compose(
                selection.utxos,
                &request.destination,
                amount,
                fee,
                change_address,
            )?;
            let minimum_fee = self.codec.minimum_fee(&draft.tx);

            if !request.calculate_network_fee {
                if minimum_fee > request.priority_fee {
                    return Err(WalletError::InsufficientFee {
                        required: minimum_fee,
                        provided: request.priority_fee,
                    });
                }
                return Ok(self.finish_estimate(draft, minimum_fee));
            }

            let required = minimum_fee.saturating_add(request.priority_fee);
            if let Some(max) = request.max_fee {
                if required > max {
                    return Err(WalletError::FeeExceeded { fee: required, max });
                }
            }
            if draft.fee >= required {
                return Ok(self.finish_estimate(draft, minimum_fee));
            }
            debug!(fee, required, inputs = draft.tx.inputs.len(), "sync: raising fee");
            fee = required;
        }
    }

    fn finish_estimate(&self, draft: TransactionDraft, minimum_fee: u64) -> TransactionEstimate {
        let mass = self.codec.estimated_mass(&draft.tx, &draft.utxos);
        TransactionEstimate {
            draft,
            minimum_fee,
            mass,
        }
    }

    /// Estimate a send without allocating a change address.
    pub fn estimate(&self, request: &TransactionRequest) -> Result<TransactionEstimate, WalletError> {
        let index = self.keys.counter(Chain::Change);
        let (change_address, _) = self.keys.derive_address(Chain::Change, index)?;
        self.build_estimate(request, &change_address)
    }

    /// Allocate a change address, compose and sign. Any failure gives the
    /// change address back, as does a draft whose change was folded into
    /// the fee.
    pub fn compose_transaction(&mut self, request: &TransactionRequest) -> Result<SignedTransaction, WalletError> {
        let change_address = self.keys.next(Chain::Change)?;
        let result = self
            .build_estimate(request, &change_address)
            .and_then(|estimate| Ok(self.codec.sign(estimate.draft, &self.keys.all_keys())?));
        match &result {
            Err(e) => {
                debug!(error = %e, "sync: compose failed, releasing change address");
                self.keys.reverse(Chain::Change);
            }
            Ok(signed) if signed.draft.change == 0 => {
                debug!(fee = signed.draft.fee, "sync: no change output, releasing change address");
                self.keys.reverse(Chain::Change);
            }
            Ok(_) => {}
        }
        result
    }

    /// Estimate, sign and submit a send. On success the spent outputs are
    /// reserved; on failure nothing changes.
    pub async fn submit_transaction(&mut self, request: &TransactionRequest) -> Result<TransactionId, WalletError> {
        let service = self.service()?;
        let signed = self.compose_transaction(request)?;
        let change_allocated = signed.draft.change > 0;
        self.submit_signed(&service, signed, "send", change_allocated).await
    }

    /// Consolidate up to `max_compound_utxos` spendable outputs into one
    /// output on a fresh change address.
    pub async fn compound_utxos(&mut self) -> Result<TransactionId, WalletError> {
        let service = self.service()?;
        let selection = self
            .ledger
            .collect_utxos(self.options.max_compound_utxos, self.params.max_consolidation_mass);
        if selection.ids.is_empty() {
            return Err(WalletError::InsufficientBalance {
                requested: 1,
                available: 0,
            });
        }

        let destination = self.keys.next(Chain::Change)?;
        let result = self.compose_compound(selection.utxos, selection.total, &destination);
        let signed = match result {
            Ok(signed) => signed,
            Err(e) => {
                self.keys.reverse(Chain::Change);
                return Err(e);
            }
        };
        self.submit_signed(&service, signed, "compound", true).await
    }

    fn compose_compound(
        &self,
        utxos: Vec<UnspentOutput>,
        total: u64,
        destination: &Address,
    ) -> Result<SignedTransaction, WalletError> {
        let probe = self.codec.compose(utxos.clone(), destination, total, 0, destination)?;
        let fee = self.codec.minimum_fee(&probe.tx);
        let amount = total.checked_sub(fee).filter(|a| *a > 0).ok_or(
            WalletError::InsufficientBalance {
                requested: fee,
                available: total,
            },
        )?;
        let draft = self.codec.compose(utxos, destination, amount, fee, destination)?;
        Ok(self.codec.sign(draft, &self.keys.all_keys())?)
    }

    async fn submit_signed(
        &mut self,
        service: &Arc<dyn LedgerService>,
        signed: SignedTransaction,
        note: &str,
        change_allocated: bool,
    ) -> Result<TransactionId, WalletError> {
        let id = match service.submit_transaction(signed.bytes.clone()).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "sync: submission failed");
                if change_allocated {
                    self.keys.reverse(Chain::Change);
                }
                return Err(e.into());
            }
        };
        if id != signed.id {
            warn!(reported = %id, computed = %signed.id, "sync: service reported a different transaction id");
        }

        let spent: Vec<UtxoId> = signed.draft.utxos.iter().map(|u| u.id).collect();
        self.ledger.mark_in_use(&spent);
        self.tx_log.append(TxLogEntry::now(
            TxDirection::Out,
            id.to_string(),
            signed.draft.amount,
            Some(signed.draft.destination.clone()),
            format!("{note}, fee {}", signed.draft.fee),
        ));
        info!(%id, amount = signed.draft.amount, fee = signed.draft.fee, inputs = spent.len(), "sync: transaction submitted");

        // Consolidations pay a fresh change address directly.
        let fresh = if signed.draft.change > 0 {
            Some(signed.draft.change_address.clone())
        } else if self.keys.owns_change_address(&signed.draft.destination) {
            Some(signed.draft.destination.clone())
        } else {
            None
        };
        if let Some(address) = fresh {
            self.watch_address(Chain::Change, address).await;
        }
        self.notify_balance();
        self.persist_cache().await;
        Ok(id)
    }

    // --- Cache ---

    pub fn cache_snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            receive_counter: self.keys.counter(Chain::Receive),
            change_counter: self.keys.counter(Chain::Change),
            ledger: self.ledger.snapshot(),
        }
    }

    /// Restore counters and ledger from a snapshot, re-deriving every
    /// address below the counters so historical outputs stay owned.
    pub fn restore_cache(&mut self, snapshot: CacheSnapshot) -> Result<(), WalletError> {
        self.keys
            .get_batch(snapshot.receive_counter, Chain::Receive, 0)?;
        self.keys
            .get_batch(snapshot.change_counter, Chain::Change, 0)?;
        self.keys.advance(Chain::Receive, snapshot.receive_counter)?;
        self.keys.advance(Chain::Change, snapshot.change_counter)?;
        self.ledger.restore(snapshot.ledger);
        self.last_observed = Some(self.ledger.balance());
        Ok(())
    }

    async fn persist_cache(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let blob = match serde_json::to_vec(&self.cache_snapshot()) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(error = %e, "sync: failed to serialize cache");
                return;
            }
        };
        if let Err(e) = cache.save_cache(blob).await {
            warn!(error = %e, "sync: failed to save cache");
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state)
            .field("keys", &self.keys)
            .field("ledger", &self.ledger)
            .field("has_service", &self.service.is_some())
            .finish()
    }
}
