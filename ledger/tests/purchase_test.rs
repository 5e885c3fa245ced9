//! Purchase pipeline tests
//!
//! Covers commission distribution end to end through the engine:
//! - base tier split between parent and grandparent
//! - custom rates with a missing grandparent (cut + self retention)
//! - idempotency on the purchase id
//! - depth cutoff on long chains
//! - passthrough to the first qualifying ancestor
//! - structural failures (unknown tier) escalated to the alert sink

use std::sync::Arc;

use nodeshare_common::{
    crypto::Address,
    referral::{CommissionKind, CommissionSettings, PurchaseEvent, PurchaseId, Rate},
};
use nodeshare_ledger::core::{
    alert::{AlertKind, RecordingAlertSink},
    engine::{CommissionEngine, EngineConfig},
    error::LedgerError,
    storage::MemoryStorage,
};
use proptest::prelude::*;

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

fn purchase(id: &str, purchaser: &str, amount: u64, tier: &str) -> PurchaseEvent {
    PurchaseEvent {
        purchase_id: PurchaseId::new(id).unwrap(),
        purchaser: addr(purchaser),
        amount,
        purchaser_tier: tier.to_string(),
    }
}

async fn engine() -> CommissionEngine<MemoryStorage> {
    CommissionEngine::new(Arc::new(MemoryStorage::new()), EngineConfig::default())
        .await
        .unwrap()
}

/// Register `names` as a chain, the first one being the root
async fn chain(engine: &CommissionEngine<MemoryStorage>, names: &[(&str, &str)]) {
    let mut parent: Option<Address> = None;
    for (name, tier) in names {
        engine
            .register_wallet(&addr(name), parent.as_ref(), tier)
            .await
            .unwrap();
        parent = Some(addr(name));
    }
}

async fn balance(engine: &CommissionEngine<MemoryStorage>, name: &str) -> u64 {
    engine.wallet_snapshot(&addr(name)).await.unwrap().balance
}

#[tokio::test]
async fn test_base_tier_split() {
    let engine = engine().await;
    chain(&engine, &[("b", "normal"), ("a", "normal"), ("p", "normal")]).await;

    let outcome = engine
        .process_purchase(&purchase("order-1", "p", 1000, "normal"))
        .await
        .unwrap();
    assert!(!outcome.is_duplicate());

    assert_eq!(balance(&engine, "a").await, 30);
    assert_eq!(balance(&engine, "b").await, 20);
    assert_eq!(balance(&engine, "p").await, 0);

    let snapshot = engine.wallet_snapshot(&addr("a")).await.unwrap();
    assert_eq!(snapshot.total_earnings, 30);
    assert_eq!(snapshot.member_tier, "normal");

    let history = engine.commission_history(&addr("b"), 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].level, 2);
    assert_eq!(history[0].kind, CommissionKind::Indirect);
    assert_eq!(history[0].source, addr("p"));
}

#[tokio::test]
async fn test_custom_rates_without_grandparent() {
    let engine = engine().await;

    let mut partner = EngineConfig::default().levels.remove(1);
    partner.name = "partner".to_string();
    partner.passthrough_rate = None;
    engine.update_member_level(partner).await.unwrap();

    chain(&engine, &[("a", "normal"), ("p", "partner")]).await;
    engine
        .set_commission_settings(
            &addr("p"),
            CommissionSettings {
                level1_rate: Rate::from_bps(500),
                level2_rate: Rate::from_bps(300),
            },
        )
        .await
        .unwrap();

    let receipt = engine
        .process_purchase(&purchase("order-2", "p", 1000, "partner"))
        .await
        .unwrap()
        .into_receipt();

    assert_eq!(balance(&engine, "a").await, 50);
    // 15% - 5% base - 3% extra at level 2, retained by the purchaser
    assert_eq!(balance(&engine, "p").await, 70);
    assert_eq!(receipt.cut, 30);
    assert_eq!(receipt.distributed, 120);
}

#[tokio::test]
async fn test_replayed_purchase_is_not_credited_twice() {
    let engine = engine().await;
    chain(&engine, &[("b", "normal"), ("a", "normal"), ("p", "normal")]).await;

    let event = purchase("order-3", "p", 1_000_000, "normal");
    let first = engine.process_purchase(&event).await.unwrap();
    let second = engine.process_purchase(&event).await.unwrap();
    let third = engine.process_purchase(&event).await.unwrap();

    assert!(second.is_duplicate() && third.is_duplicate());
    assert_eq!(first.receipt(), second.receipt());
    assert_eq!(balance(&engine, "a").await, 30_000);
    assert_eq!(balance(&engine, "b").await, 20_000);
    assert_eq!(
        engine.commission_history(&addr("a"), 10).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_normal_tier_never_pays_beyond_depth_two() {
    let engine = engine().await;
    chain(
        &engine,
        &[
            ("d", "global_partner"),
            ("c", "market_partner"),
            ("b", "normal"),
            ("a", "normal"),
            ("p", "normal"),
        ],
    )
    .await;

    engine
        .process_purchase(&purchase("order-4", "p", 10_000, "normal"))
        .await
        .unwrap();

    assert_eq!(balance(&engine, "a").await, 300);
    assert_eq!(balance(&engine, "b").await, 200);
    assert_eq!(balance(&engine, "c").await, 0);
    assert_eq!(balance(&engine, "d").await, 0);
}

#[tokio::test]
async fn test_passthrough_skips_shallow_ancestors() {
    let engine = engine().await;
    chain(
        &engine,
        &[
            ("e", "global_partner"),
            ("d", "market_partner"),
            ("c", "normal"),
            ("b", "normal"),
            ("a", "normal"),
            ("p", "market_partner"),
        ],
    )
    .await;

    let receipt = engine
        .process_purchase(&purchase("order-5", "p", 10_000, "market_partner"))
        .await
        .unwrap()
        .into_receipt();

    assert_eq!(balance(&engine, "c").await, 0);
    assert_eq!(balance(&engine, "d").await, 300);
    assert_eq!(balance(&engine, "e").await, 0);
    assert_eq!(balance(&engine, "p").await, 700);
    assert_eq!(receipt.distributed, 1500);
    assert_eq!(receipt.cut, 0);

    let passthrough = receipt
        .distributions
        .iter()
        .find(|d| d.kind == CommissionKind::Passthrough)
        .unwrap();
    assert_eq!(passthrough.level, 4);
}

#[tokio::test]
async fn test_unknown_tier_is_escalated() {
    let sink = Arc::new(RecordingAlertSink::new());
    let engine = engine().await.with_alert_sink(sink.clone());
    chain(&engine, &[("a", "normal"), ("p", "normal")]).await;

    let err = engine
        .process_purchase(&purchase("order-6", "p", 1000, "platinum"))
        .await
        .unwrap_err();
    assert!(err.is_structural());
    assert!(!err.is_retryable());
    assert!(matches!(err, LedgerError::Configuration(_)));

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Configuration);
    assert_eq!(balance(&engine, "a").await, 0);
    assert!(engine
        .purchase_receipt(&PurchaseId::new("order-6").unwrap())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_zero_amount_is_rejected() {
    let engine = engine().await;
    let err = engine
        .process_purchase(&purchase("order-7", "p", 0, "normal"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(0)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_receipt_conserves_commission(amount in 1u64..10_000_000_000, depth in 0usize..6) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let engine = engine().await;
            let tiers = ["global_partner", "market_partner", "normal"];
            let mut names: Vec<(String, &str)> = (0..depth)
                .map(|i| (format!("w{}", i), tiers[i % 3]))
                .collect();
            names.push(("p".to_string(), "market_partner"));
            let refs: Vec<(&str, &str)> = names.iter().map(|(n, t)| (n.as_str(), *t)).collect();
            chain(&engine, &refs).await;

            let receipt = engine
                .process_purchase(&purchase("order", "p", amount, "market_partner"))
                .await
                .unwrap()
                .into_receipt();

            let entitlement = Rate::from_bps(1500).apply(amount);
            let credited: u64 = receipt.distributions.iter().map(|d| d.amount).sum();
            assert_eq!(credited, receipt.distributed);
            assert!(receipt.distributed + receipt.cut <= entitlement);
            assert!(entitlement - (receipt.distributed + receipt.cut) <= 3);
        });
    }
}
