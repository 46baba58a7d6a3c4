//! Three-bucket UTXO ledger with confirmation-depth accounting.
//!
//! Every tracked output sits in exactly one bucket:
//!
//! - `confirmed`: deep enough to spend (10 confirmations, 100 for coinbase)
//! - `pending`: seen but not yet deep enough
//! - `used`: reserved by an in-flight send
//!
//! Reserving an output ([`UtxoLedger::mark_in_use`]) moves it into `used` and
//! out of the balance, so `Balance::confirmed` is the spendable total and both
//! accumulators always exclude reserved outputs. Accumulators are adjusted
//! incrementally and must agree with [`UtxoLedger::recompute_balance`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use sompi_core::address::Address;
use sompi_core::constants::NetworkParameters;
use sompi_core::types::{UnspentOutput, UtxoEntryRecord, UtxoId};

use crate::error::WalletError;
use crate::traits::{NoopTransactionLog, TransactionLog, TxDirection, TxLogEntry};

/// Confirmed and pending totals, in sompi.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub confirmed: u64,
    pub pending: u64,
}

impl Balance {
    pub fn total(&self) -> u64 {
        self.confirmed.saturating_add(self.pending)
    }
}

/// Which bucket an output lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Confirmed,
    Pending,
    Used,
}

/// Outputs chosen by [`UtxoLedger::select_utxos`] or
/// [`UtxoLedger::collect_utxos`], in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSelection {
    pub ids: Vec<UtxoId>,
    pub utxos: Vec<UnspentOutput>,
    pub total: u64,
    pub mass: u64,
}

impl UtxoSelection {
    fn push(&mut self, utxo: &UnspentOutput) {
        self.ids.push(utxo.id);
        self.total = self.total.saturating_add(utxo.amount);
        self.mass = self.mass.saturating_add(utxo.mass);
        self.utxos.push(utxo.clone());
    }
}

/// Serializable ledger state for the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub blue_score: u64,
    pub confirmed: Vec<UnspentOutput>,
    pub pending: Vec<UnspentOutput>,
    pub used: Vec<UnspentOutput>,
    pub in_use: Vec<UtxoId>,
}

/// Outcome of reconciling reservations after a resync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Reserved outputs the service still reports; returned to availability.
    pub released: Vec<UtxoId>,
    /// Reserved outputs the service no longer reports; their spend is final.
    pub dropped: Vec<UtxoId>,
}

pub struct UtxoLedger {
    params: NetworkParameters,
    confirmed: BTreeMap<UtxoId, UnspentOutput>,
    pending: BTreeMap<UtxoId, UnspentOutput>,
    used: BTreeMap<UtxoId, UnspentOutput>,
    in_use: BTreeSet<UtxoId>,
    balance: Balance,
    blue_score: u64,
    log: Arc<dyn TransactionLog>,
}

impl UtxoLedger {
    pub fn new(params: NetworkParameters) -> Self {
        Self::with_log(params, Arc::new(NoopTransactionLog))
    }

    pub fn with_log(params: NetworkParameters, log: Arc<dyn TransactionLog>) -> Self {
        Self {
            params,
            confirmed: BTreeMap::new(),
            pending: BTreeMap::new(),
            used: BTreeMap::new(),
            in_use: BTreeSet::new(),
            balance: Balance::default(),
            blue_score: 0,
            log,
        }
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn blue_score(&self) -> u64 {
        self.blue_score
    }

    pub fn params(&self) -> &NetworkParameters {
        &self.params
    }

    pub fn bucket_of(&self, id: &UtxoId) -> Option<Bucket> {
        if self.confirmed.contains_key(id) {
            Some(Bucket::Confirmed)
        } else if self.pending.contains_key(id) {
            Some(Bucket::Pending)
        } else if self.used.contains_key(id) {
            Some(Bucket::Used)
        } else {
            None
        }
    }

    pub fn get(&self, id: &UtxoId) -> Option<&UnspentOutput> {
        self.confirmed
            .get(id)
            .or_else(|| self.pending.get(id))
            .or_else(|| self.used.get(id))
    }

    pub fn is_in_use(&self, id: &UtxoId) -> bool {
        self.in_use.contains(id)
    }

    pub fn in_use(&self) -> impl Iterator<Item = &UtxoId> {
        self.in_use.iter()
    }

    /// Number of tracked outputs across all buckets.
    pub fn len(&self) -> usize {
        self.confirmed.len() + self.pending.len() + self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_mature(&self, utxo: &UnspentOutput) -> bool {
        utxo.confirmations(self.blue_score) >= self.params.required_confirmations(utxo.is_coinbase)
    }

    /// File an output into `confirmed` or `pending` and credit the balance.
    fn place(&mut self, utxo: UnspentOutput) -> Bucket {
        if self.is_mature(&utxo) {
            self.balance.confirmed = self.balance.confirmed.saturating_add(utxo.amount);
            self.confirmed.insert(utxo.id, utxo);
            Bucket::Confirmed
        } else {
            self.balance.pending = self.balance.pending.saturating_add(utxo.amount);
            self.pending.insert(utxo.id, utxo);
            Bucket::Pending
        }
    }

    /// Ingest outputs reported for `address`.
    ///
    /// Known identities are skipped. Reserved identities go to `used`.
    /// Returns the identities newly credited to the balance.
    pub fn add(&mut self, records: Vec<UtxoEntryRecord>, address: &Address) -> Vec<UtxoId> {
        let mut added = Vec::new();
        for record in records {
            let id = record.id();
            if self.bucket_of(&id).is_some() {
                continue;
            }
            let utxo = UnspentOutput::from_record(record, address.clone(), &self.params);
            if self.in_use.contains(&id) {
                self.used.insert(id, utxo);
                continue;
            }
            let amount = utxo.amount;
            let bucket = self.place(utxo);
            debug!(%id, amount, ?bucket, "ledger: added utxo");
            self.log.append(TxLogEntry::now(
                TxDirection::In,
                id.to_string(),
                amount,
                Some(address.clone()),
                "",
            ));
            added.push(id);
        }
        added
    }

    /// Drop outputs that were spent or vanished, clearing any reservation.
    ///
    /// A pending output removed within `moved_window` of the tip is logged as
    /// moved rather than spent. Returns the identities actually removed.
    pub fn remove(&mut self, ids: &[UtxoId]) -> Vec<UtxoId> {
        let mut removed = Vec::new();
        for id in ids {
            self.in_use.remove(id);
            let (utxo, direction, note) = if let Some(u) = self.confirmed.remove(id) {
                self.balance.confirmed = self.balance.confirmed.saturating_sub(u.amount);
                (u, TxDirection::Out, "spent")
            } else if let Some(u) = self.pending.remove(id) {
                self.balance.pending = self.balance.pending.saturating_sub(u.amount);
                if self.blue_score.saturating_sub(u.block_daa_score) <= self.params.moved_window {
                    (u, TxDirection::Moved, "removed near tip")
                } else {
                    (u, TxDirection::Out, "spent")
                }
            } else if let Some(u) = self.used.remove(id) {
                (u, TxDirection::Out, "spend confirmed")
            } else {
                continue;
            };
            debug!(%id, amount = utxo.amount, ?direction, "ledger: removed utxo");
            self.log.append(TxLogEntry::now(
                direction,
                id.to_string(),
                utxo.amount,
                Some(utxo.address),
                note,
            ));
            removed.push(*id);
        }
        removed
    }

    /// Reserve outputs for an in-flight send: move them to `used` and out of
    /// the balance. Unknown identities are ignored.
    pub fn mark_in_use(&mut self, ids: &[UtxoId]) {
        for id in ids {
            let utxo = if let Some(u) = self.confirmed.remove(id) {
                self.balance.confirmed = self.balance.confirmed.saturating_sub(u.amount);
                u
            } else if let Some(u) = self.pending.remove(id) {
                self.balance.pending = self.balance.pending.saturating_sub(u.amount);
                u
            } else if self.used.contains_key(id) {
                self.in_use.insert(*id);
                continue;
            } else {
                continue;
            };
            self.used.insert(*id, utxo);
            self.in_use.insert(*id);
        }
    }

    /// Undo reservations, returning reserved outputs to availability.
    pub fn release(&mut self, ids: &[UtxoId]) {
        for id in ids {
            self.in_use.remove(id);
            if let Some(u) = self.used.remove(id) {
                debug!(%id, amount = u.amount, "ledger: released utxo");
                self.place(u);
            }
        }
    }

    /// Promote pending outputs that reached their confirmation depth.
    pub fn update_utxo_balance(&mut self) -> Vec<UtxoId> {
        let ready: Vec<UtxoId> = self
            .pending
            .values()
            .filter(|u| self.is_mature(u))
            .map(|u| u.id)
            .collect();
        for id in &ready {
            if let Some(u) = self.pending.remove(id) {
                self.balance.pending = self.balance.pending.saturating_sub(u.amount);
                self.balance.confirmed = self.balance.confirmed.saturating_add(u.amount);
                self.confirmed.insert(*id, u);
            }
        }
        if !ready.is_empty() {
            debug!(count = ready.len(), blue_score = self.blue_score, "ledger: promoted pending utxos");
        }
        ready
    }

    /// Record a new blue score and promote what it matures.
    pub fn set_blue_score(&mut self, blue_score: u64) -> Vec<UtxoId> {
        self.blue_score = blue_score;
        self.update_utxo_balance()
    }

    /// Spendable outputs in selection order: oldest DAA score first, then
    /// largest amount, then identity.
    fn spendable(&self) -> Vec<&UnspentOutput> {
        let mut candidates: Vec<&UnspentOutput> = self
            .confirmed
            .values()
            .filter(|u| !self.in_use.contains(&u.id))
            .collect();
        candidates.sort_by(|a, b| {
            a.block_daa_score
                .cmp(&b.block_daa_score)
                .then(b.amount.cmp(&a.amount))
                .then(a.id.cmp(&b.id))
        });
        candidates
    }

    /// Select confirmed outputs until their sum reaches `amount`.
    pub fn select_utxos(&self, amount: u64) -> Result<UtxoSelection, WalletError> {
        let mut selection = UtxoSelection::default();
        let candidates = self.spendable();
        for utxo in &candidates {
            if selection.total >= amount {
                break;
            }
            selection.push(utxo);
        }
        if selection.total < amount {
            return Err(WalletError::InsufficientBalance {
                requested: amount,
                available: selection.total,
            });
        }
        Ok(selection)
    }

    /// Gather up to `max_count` spendable outputs whose combined mass stays
    /// within `max_mass`. Never fails; may return an empty selection.
    pub fn collect_utxos(&self, max_count: usize, max_mass: u64) -> UtxoSelection {
        let mut selection = UtxoSelection::default();
        for utxo in self.spendable() {
            if selection.ids.len() >= max_count || selection.mass.saturating_add(utxo.mass) > max_mass {
                break;
            }
            selection.push(utxo);
        }
        selection
    }

    /// Full-scan recomputation of the balance accumulators.
    pub fn recompute_balance(&self) -> Balance {
        let sum = |bucket: &BTreeMap<UtxoId, UnspentOutput>| -> u64 {
            bucket
                .values()
                .filter(|u| !self.in_use.contains(&u.id))
                .map(|u| u.amount)
                .sum()
        };
        Balance {
            confirmed: sum(&self.confirmed),
            pending: sum(&self.pending),
        }
    }

    /// Empty every bucket and reservation and zero the balance.
    pub fn clear(&mut self) {
        self.confirmed.clear();
        self.pending.clear();
        self.used.clear();
        self.in_use.clear();
        self.balance = Balance::default();
    }

    /// Empty the buckets but keep reservations, ahead of a full re-ingest.
    ///
    /// Reserved outputs the service still reports land in `used` again;
    /// [`reconcile_reservations`](Self::reconcile_reservations) then settles them.
    pub fn reset_for_resync(&mut self) {
        self.confirmed.clear();
        self.pending.clear();
        self.used.clear();
        self.balance = Balance::default();
    }

    /// Settle reservations after a re-ingest: outputs still reported are
    /// released, outputs no longer reported are treated as spent.
    pub fn reconcile_reservations(&mut self) -> Reconciliation {
        let mut result = Reconciliation::default();
        let reserved: Vec<UtxoId> = self.in_use.iter().copied().collect();
        for id in reserved {
            if self.used.contains_key(&id) {
                result.released.push(id);
            } else {
                self.in_use.remove(&id);
                self.log.append(TxLogEntry::now(
                    TxDirection::Out,
                    id.to_string(),
                    0,
                    None,
                    "spend confirmed during disconnect",
                ));
                result.dropped.push(id);
            }
        }
        self.release(&result.released);
        result
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            blue_score: self.blue_score,
            confirmed: self.confirmed.values().cloned().collect(),
            pending: self.pending.values().cloned().collect(),
            used: self.used.values().cloned().collect(),
            in_use: self.in_use.iter().copied().collect(),
        }
    }

    /// Replace the ledger contents with a snapshot. Balances are rebuilt
    /// from the restored buckets.
    pub fn restore(&mut self, snapshot: LedgerSnapshot) {
        self.clear();
        self.blue_score = snapshot.blue_score;
        self.in_use = snapshot.in_use.into_iter().collect();
        self.confirmed = snapshot.confirmed.into_iter().map(|u| (u.id, u)).collect();
        self.pending = snapshot.pending.into_iter().map(|u| (u.id, u)).collect();
        self.used = snapshot.used.into_iter().map(|u| (u.id, u)).collect();
        self.balance = self.recompute_balance();
    }
}

impl std::fmt::Debug for UtxoLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtxoLedger")
            .field("confirmed", &self.confirmed.len())
            .field("pending", &self.pending.len())
            .field("used", &self.used.len())
            .field("in_use", &self.in_use.len())
            .field("balance", &self.balance)
            .field("blue_score", &self.blue_score)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MemoryTransactionLog;
    use sompi_core::constants::Network;
    use sompi_core::types::TransactionId;

    fn owner() -> Address {
        Address::from_pubkey_hash([0x11; 32], Network::Testnet)
    }

    fn record(tx: u8, index: u32, amount: u64, score: u64) -> UtxoEntryRecord {
        UtxoEntryRecord {
            transaction_id: TransactionId([tx; 32]),
            output_index: index,
            amount,
            script_public_key: owner().script_public_key(),
            block_daa_score: score,
            is_coinbase: false,
        }
    }

    fn id(tx: u8, index: u32) -> UtxoId {
        UtxoId::new(TransactionId([tx; 32]), index)
    }

    fn ledger_at(score: u64) -> UtxoLedger {
        let mut ledger = UtxoLedger::new(NetworkParameters::for_network(Network::Testnet));
        ledger.set_blue_score(score);
        ledger
    }

    /// A(score=100, val=50), B(score=90, val=80), C(score=90, val=20).
    fn abc_ledger() -> UtxoLedger {
        let mut ledger = ledger_at(1_000);
        ledger.add(
            vec![record(0xA, 0, 50, 100), record(0xB, 0, 80, 90), record(0xC, 0, 20, 90)],
            &owner(),
        );
        ledger
    }

    #[test]
    fn add_classifies_by_depth() {
        let mut ledger = ledger_at(1_000);
        let added = ledger.add(vec![record(1, 0, 500, 990), record(2, 0, 300, 995)], &owner());
        assert_eq!(added.len(), 2);
        assert_eq!(ledger.bucket_of(&id(1, 0)), Some(Bucket::Confirmed));
        assert_eq!(ledger.bucket_of(&id(2, 0)), Some(Bucket::Pending));
        assert_eq!(ledger.balance(), Balance { confirmed: 500, pending: 300 });
    }

    #[test]
    fn coinbase_needs_maturity() {
        let mut ledger = ledger_at(1_000);
        let mut cb = record(1, 0, 500, 950);
        cb.is_coinbase = true;
        ledger.add(vec![cb], &owner());
        assert_eq!(ledger.bucket_of(&id(1, 0)), Some(Bucket::Pending));
        ledger.set_blue_score(1_050);
        assert_eq!(ledger.bucket_of(&id(1, 0)), Some(Bucket::Confirmed));
    }

    #[test]
    fn duplicate_add_is_noop() {
        let mut ledger = ledger_at(1_000);
        ledger.add(vec![record(1, 0, 500, 10)], &owner());
        let again = ledger.add(vec![record(1, 0, 500, 10)], &owner());
        assert!(again.is_empty());
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.balance().confirmed, 500);
    }

    #[test]
    fn select_orders_by_score_then_value() {
        let ledger = abc_ledger();
        let sel = ledger.select_utxos(60).unwrap();
        assert_eq!(sel.ids, vec![id(0xB, 0)]);
        assert_eq!(sel.total, 80);
        assert_eq!(sel.mass, sel.utxos[0].mass);

        let sel = ledger.select_utxos(90).unwrap();
        assert_eq!(sel.ids, vec![id(0xB, 0), id(0xC, 0)]);
    }

    #[test]
    fn select_insufficient_balance() {
        let ledger = abc_ledger();
        assert_eq!(
            ledger.select_utxos(1000).unwrap_err(),
            WalletError::InsufficientBalance { requested: 1000, available: 150 }
        );
    }

    #[test]
    fn select_skips_pending() {
        let mut ledger = ledger_at(1_000);
        ledger.add(vec![record(1, 0, 500, 999)], &owner());
        assert!(matches!(
            ledger.select_utxos(1),
            Err(WalletError::InsufficientBalance { available: 0, .. })
        ));
    }

    #[test]
    fn confirmation_promotion() {
        let mut ledger = ledger_at(1_005);
        ledger.add(vec![record(1, 0, 700, 1_000)], &owner());
        assert_eq!(ledger.bucket_of(&id(1, 0)), Some(Bucket::Pending));
        assert_eq!(ledger.balance(), Balance { confirmed: 0, pending: 700 });

        assert!(ledger.set_blue_score(1_009).is_empty());
        assert_eq!(ledger.bucket_of(&id(1, 0)), Some(Bucket::Pending));

        assert_eq!(ledger.set_blue_score(1_011), vec![id(1, 0)]);
        assert_eq!(ledger.bucket_of(&id(1, 0)), Some(Bucket::Confirmed));
        assert_eq!(ledger.balance(), Balance { confirmed: 700, pending: 0 });
    }

    #[test]
    fn mark_in_use_reserves_and_excludes() {
        let mut ledger = abc_ledger();
        ledger.mark_in_use(&[id(0xB, 0)]);
        assert!(ledger.is_in_use(&id(0xB, 0)));
        assert_eq!(ledger.bucket_of(&id(0xB, 0)), Some(Bucket::Used));
        assert_eq!(ledger.balance().confirmed, 70);
        assert_eq!(ledger.select_utxos(60).unwrap().ids, vec![id(0xC, 0), id(0xA, 0)]);
        assert_eq!(ledger.balance(), ledger.recompute_balance());
    }

    #[test]
    fn reserved_identity_is_not_readded() {
        let mut ledger = abc_ledger();
        ledger.mark_in_use(&[id(0xB, 0)]);
        assert!(ledger.add(vec![record(0xB, 0, 80, 90)], &owner()).is_empty());
        assert_eq!(ledger.balance().confirmed, 70);
    }

    #[test]
    fn release_returns_to_availability() {
        let mut ledger = abc_ledger();
        ledger.mark_in_use(&[id(0xB, 0)]);
        ledger.release(&[id(0xB, 0)]);
        assert!(!ledger.is_in_use(&id(0xB, 0)));
        assert_eq!(ledger.bucket_of(&id(0xB, 0)), Some(Bucket::Confirmed));
        assert_eq!(ledger.balance().confirmed, 150);
    }

    #[test]
    fn remove_spent_reserved_output() {
        let mut ledger = abc_ledger();
        ledger.mark_in_use(&[id(0xB, 0)]);
        assert_eq!(ledger.remove(&[id(0xB, 0)]), vec![id(0xB, 0)]);
        assert!(!ledger.is_in_use(&id(0xB, 0)));
        assert_eq!(ledger.bucket_of(&id(0xB, 0)), None);
        assert_eq!(ledger.balance().confirmed, 70);
    }

    #[test]
    fn remove_logs_moved_within_window() {
        let log = Arc::new(MemoryTransactionLog::new());
        let mut ledger = UtxoLedger::with_log(NetworkParameters::for_network(Network::Testnet), log.clone());
        ledger.set_blue_score(1_000);
        ledger.add(vec![record(1, 0, 10, 995), record(2, 0, 20, 1_000)], &owner());
        ledger.set_blue_score(1_004);
        assert_eq!(ledger.bucket_of(&id(1, 0)), Some(Bucket::Pending));
        ledger.remove(&[id(1, 0)]);
        // id(3, 0) matures before it is removed, so it logs as a spend
        ledger.set_blue_score(1_100);
        ledger.add(vec![record(3, 0, 30, 1_095)], &owner());
        ledger.set_blue_score(1_200);
        ledger.remove(&[id(3, 0)]);

        let entries = log.entries();
        assert_eq!(entries.iter().filter(|e| e.direction == TxDirection::In).count(), 3);
        let moved: Vec<_> = entries.iter().filter(|e| e.direction == TxDirection::Moved).collect();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].id, id(1, 0).to_string());
    }

    #[test]
    fn remove_pending_outside_window_is_spend() {
        let log = Arc::new(MemoryTransactionLog::new());
        let params = NetworkParameters {
            confirmation_depth: 1_000,
            ..NetworkParameters::for_network(Network::Testnet)
        };
        let mut ledger = UtxoLedger::with_log(params, log.clone());
        ledger.set_blue_score(500);
        ledger.add(vec![record(1, 0, 10, 100)], &owner());
        ledger.remove(&[id(1, 0)]);
        let last = log.entries().pop().unwrap();
        assert_eq!(last.direction, TxDirection::Out);
        assert_eq!(ledger.balance(), Balance::default());
    }

    #[test]
    fn collect_respects_count_and_mass() {
        let ledger = abc_ledger();
        let per_input = ledger.get(&id(0xA, 0)).unwrap().mass;
        assert_eq!(ledger.collect_utxos(2, u64::MAX).ids, vec![id(0xB, 0), id(0xC, 0)]);
        assert_eq!(ledger.collect_utxos(10, per_input).ids, vec![id(0xB, 0)]);
        assert!(ledger.collect_utxos(10, per_input - 1).ids.is_empty());
        assert_eq!(ledger.collect_utxos(10, u64::MAX).total, 150);
    }

    #[test]
    fn clear_resets_everything() {
        let mut ledger = abc_ledger();
        ledger.mark_in_use(&[id(0xA, 0)]);
        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.in_use().count(), 0);
        assert_eq!(ledger.balance(), Balance::default());
    }

    #[test]
    fn resync_reconciliation() {
        let mut ledger = abc_ledger();
        ledger.mark_in_use(&[id(0xA, 0), id(0xB, 0)]);
        ledger.reset_for_resync();
        assert!(ledger.is_empty());
        assert_eq!(ledger.in_use().count(), 2);

        // B was spent while disconnected; A and C are still reported.
        ledger.add(vec![record(0xA, 0, 50, 100), record(0xC, 0, 20, 90)], &owner());
        assert_eq!(ledger.bucket_of(&id(0xA, 0)), Some(Bucket::Used));

        let rec = ledger.reconcile_reservations();
        assert_eq!(rec.released, vec![id(0xA, 0)]);
        assert_eq!(rec.dropped, vec![id(0xB, 0)]);
        assert_eq!(ledger.in_use().count(), 0);
        assert_eq!(ledger.balance().confirmed, 70);
        assert_eq!(ledger.balance(), ledger.recompute_balance());
    }

    #[test]
    fn snapshot_restore() {
        let mut ledger = abc_ledger();
        ledger.add(vec![record(9, 1, 5, 999)], &owner());
        ledger.mark_in_use(&[id(0xC, 0)]);
        let snap = ledger.snapshot();

        let json = serde_json::to_string(&snap).unwrap();
        let mut restored = ledger_at(0);
        restored.restore(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.balance(), ledger.balance());
        assert_eq!(restored.blue_score(), 1_000);
        assert!(restored.is_in_use(&id(0xC, 0)));
        assert_eq!(restored.snapshot(), snap);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add { tx: u8, amount: u64, score: u64, coinbase: bool },
            Remove(u8),
            Reserve(u8),
            Release(u8),
            Score(u64),
            Resync,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                4 => (0u8..16, 1u64..1_000_000, 0u64..400, any::<bool>())
                    .prop_map(|(tx, amount, score, coinbase)| Op::Add { tx, amount, score, coinbase }),
                2 => (0u8..16).prop_map(Op::Remove),
                2 => (0u8..16).prop_map(Op::Reserve),
                1 => (0u8..16).prop_map(Op::Release),
                2 => (0u64..500).prop_map(Op::Score),
                1 => Just(Op::Resync),
            ]
        }

        proptest! {
            #[test]
            fn balance_matches_full_scan(ops in prop::collection::vec(op(), 1..60)) {
                let mut ledger = ledger_at(0);
                for op in ops {
                    match op {
                        Op::Add { tx, amount, score, coinbase } => {
                            let mut r = record(tx, 0, amount, score);
                            r.is_coinbase = coinbase;
                            ledger.add(vec![r], &owner());
                        }
                        Op::Remove(tx) => { ledger.remove(&[id(tx, 0)]); }
                        Op::Reserve(tx) => ledger.mark_in_use(&[id(tx, 0)]),
                        Op::Release(tx) => ledger.release(&[id(tx, 0)]),
                        Op::Score(s) => { ledger.set_blue_score(s); }
                        Op::Resync => {
                            ledger.reset_for_resync();
                            ledger.reconcile_reservations();
                        }
                    }
                    prop_assert_eq!(ledger.balance(), ledger.recompute_balance());
                    for reserved in ledger.in_use() {
                        prop_assert!(ledger.bucket_of(reserved).is_some());
                    }
                }
            }
        }
    }
}
