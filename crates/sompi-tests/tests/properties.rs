//! Property tests: discovery finds exactly the activity within the gap limit.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use sompi_wallet::keys::Chain;
use sompi_wallet::traits::NoopTransactionLog;
use sompi_tests::helpers::*;

/// Last index reachable when every run of unused addresses is shorter than
/// `threshold`.
fn reachable_last(active: &BTreeSet<u32>, threshold: u32) -> Option<u32> {
    let mut last: Option<u32> = None;
    for &i in active {
        let limit = last.map_or(threshold - 1, |l| l + threshold);
        if i > limit {
            break;
        }
        last = Some(i);
    }
    last
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn discovery_matches_gap_rule(
        active in prop::collection::btree_set(0u32..12, 0..5),
        threshold in 1u32..5,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (counter, balance, outcome) = runtime.block_on(async {
            let service = MockLedgerService::new(1_000);
            let mut wallet = wallet_with(&service, options(threshold), Arc::new(NoopTransactionLog));
            for &i in &active {
                let (address, _) = wallet.engine().keys().derive_address(Chain::Receive, i).unwrap();
                service.fund(&address, 1_000 + u64::from(i), 500);
            }
            wallet.engine_mut().sync(true).await.unwrap();
            (
                wallet.engine().keys().counter(Chain::Receive),
                wallet.balance().total(),
                reachable_last(&active, threshold),
            )
        });

        prop_assert_eq!(counter, outcome.map_or(0, |i| i + 1));
        let expected: u64 = active
            .iter()
            .filter(|&&i| outcome.is_some_and(|last| i <= last))
            .map(|&i| 1_000 + u64::from(i))
            .sum();
        prop_assert_eq!(balance, expected);
    }
}
