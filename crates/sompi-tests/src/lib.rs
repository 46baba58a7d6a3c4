//! Integration test suite for the sompi wallet.
//!
//! Tests drive full wallets against an in-process [`helpers::MockLedgerService`]:
//! address discovery, sync and subscription, transaction submission,
//! reconnect reconciliation and persistence.

pub mod helpers;
