//! Concurrency tests
//!
//! Balance mutations of a wallet are serialized by the lock manager:
//! - concurrent purchases crediting the same ancestors lose no update
//! - concurrent withdrawals never drive a balance below zero
//! - withdrawals racing commission credits on one wallet keep it consistent
//! - a held lock makes other mutations time out without writing anything
//! - concurrent registrations keep team sizes consistent

use std::{sync::Arc, time::Duration};

use nodeshare_common::{
    config::COIN_VALUE,
    crypto::Address,
    referral::{PurchaseEvent, PurchaseId, Rate},
    withdrawal::WithdrawalRequest,
};
use nodeshare_ledger::core::{
    engine::{CommissionEngine, EngineConfig},
    error::LedgerError,
    locks::LockKey,
    storage::MemoryStorage,
};
use rust_decimal::Decimal;

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

async fn engine(lock_timeout: Duration) -> Arc<CommissionEngine<MemoryStorage>> {
    let config = EngineConfig {
        lock_timeout,
        ..Default::default()
    };
    Arc::new(
        CommissionEngine::new(Arc::new(MemoryStorage::new()), config)
            .await
            .unwrap(),
    )
}

fn purchase(id: usize, purchaser: &str, amount: u64) -> PurchaseEvent {
    PurchaseEvent {
        purchase_id: PurchaseId::new(&format!("order-{}", id)).unwrap(),
        purchaser: addr(purchaser),
        amount,
        purchaser_tier: "normal".to_string(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_are_not_lost() {
    let engine = engine(Duration::from_secs(10)).await;
    engine.register_wallet(&addr("b"), None, "normal").await.unwrap();
    engine
        .register_wallet(&addr("a"), Some(&addr("b")), "normal")
        .await
        .unwrap();
    for i in 0..8 {
        engine
            .register_wallet(&addr(&format!("p{}", i)), Some(&addr("a")), "normal")
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..64 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let purchaser = format!("p{}", i % 8);
            engine
                .process_purchase(&purchase(i, &purchaser, 1000))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert!(!handle.await.unwrap().is_duplicate());
    }

    let a = engine.wallet_snapshot(&addr("a")).await.unwrap();
    let b = engine.wallet_snapshot(&addr("b")).await.unwrap();
    assert_eq!(a.balance, 64 * 30);
    assert_eq!(b.balance, 64 * 20);
    assert_eq!(a.total_earnings, a.balance);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replays_credit_once() {
    let engine = engine(Duration::from_secs(10)).await;
    engine.register_wallet(&addr("a"), None, "normal").await.unwrap();
    engine
        .register_wallet(&addr("p"), Some(&addr("a")), "normal")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .process_purchase(&purchase(1, "p", 1000))
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if !handle.await.unwrap().is_duplicate() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(engine.wallet_snapshot(&addr("a")).await.unwrap().balance, 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() {
    let engine = engine(Duration::from_secs(10)).await;
    // a root global partner retains 10%: 100 tokens
    engine
        .process_purchase(&PurchaseEvent {
            purchase_id: PurchaseId::new("seed").unwrap(),
            purchaser: addr("w"),
            amount: 1000 * COIN_VALUE,
            purchaser_tier: "global_partner".to_string(),
        })
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .request_withdrawal(&WithdrawalRequest {
                    wallet: addr("w"),
                    amount: 30 * COIN_VALUE,
                    current_token_price: Decimal::ONE,
                    burn_rate: Rate::from_bps(100),
                })
                .await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(LedgerError::InsufficientBalance { .. }) => {}
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    assert_eq!(accepted, 3);
    let wallet = engine.wallet_snapshot(&addr("w")).await.unwrap();
    assert_eq!(wallet.balance, 10 * COIN_VALUE);
    assert_eq!(
        engine.withdrawal_history(&addr("w"), 100).await.unwrap().len(),
        3
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_withdrawals_racing_credits_keep_balance_consistent() {
    let engine = engine(Duration::from_secs(10)).await;
    // a root global partner retains 10%: 150 tokens
    engine
        .process_purchase(&PurchaseEvent {
            purchase_id: PurchaseId::new("seed").unwrap(),
            purchaser: addr("a"),
            amount: 1500 * COIN_VALUE,
            purchaser_tier: "global_partner".to_string(),
        })
        .await
        .unwrap();
    for i in 0..8 {
        engine
            .register_wallet(&addr(&format!("p{}", i)), Some(&addr("a")), "normal")
            .await
            .unwrap();
    }
    let before = engine.wallet_snapshot(&addr("a")).await.unwrap();
    assert_eq!(before.balance, 150 * COIN_VALUE);

    let mut credits = Vec::new();
    let mut withdrawals = Vec::new();
    for i in 0..32 {
        let engine_for_credit = engine.clone();
        credits.push(tokio::spawn(async move {
            let purchaser = format!("p{}", i % 8);
            engine_for_credit
                .process_purchase(&purchase(i, &purchaser, 100 * COIN_VALUE))
                .await
                .unwrap()
        }));

        let engine_for_withdrawal = engine.clone();
        withdrawals.push(tokio::spawn(async move {
            engine_for_withdrawal
                .request_withdrawal(&WithdrawalRequest {
                    wallet: addr("a"),
                    amount: 20 * COIN_VALUE,
                    current_token_price: Decimal::ONE,
                    burn_rate: Rate::ZERO,
                })
                .await
        }));
    }

    for handle in credits {
        assert!(!handle.await.unwrap().is_duplicate());
    }
    let mut accepted = 0u64;
    for handle in withdrawals {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(LedgerError::InsufficientBalance { .. }) => {}
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    // 3% of each purchase goes to the parent
    let credited = 32 * 3 * COIN_VALUE;
    let after = engine.wallet_snapshot(&addr("a")).await.unwrap();
    assert!((7..=12).contains(&accepted));
    assert_eq!(
        after.balance,
        before.balance + credited - accepted * 20 * COIN_VALUE
    );
    assert_eq!(after.total_earnings, before.total_earnings + credited);
    assert_eq!(
        engine.withdrawal_history(&addr("a"), 100).await.unwrap().len() as u64,
        accepted
    );
}

#[tokio::test]
async fn test_lock_timeout_aborts_whole_purchase() {
    let engine = engine(Duration::from_millis(50)).await;
    engine.register_wallet(&addr("b"), None, "normal").await.unwrap();
    engine
        .register_wallet(&addr("a"), Some(&addr("b")), "normal")
        .await
        .unwrap();
    engine
        .register_wallet(&addr("p"), Some(&addr("a")), "normal")
        .await
        .unwrap();

    // hold the grandparent as a concurrent mutation would
    let held = engine
        .lock_manager()
        .acquire([LockKey::Wallet(addr("b"))])
        .await
        .unwrap();

    let event = purchase(1, "p", 1000);
    let err = engine.process_purchase(&event).await.unwrap_err();
    assert!(matches!(err, LedgerError::LockTimeout(_)));
    assert!(err.is_retryable());

    // the parent was not credited on its own
    assert_eq!(engine.wallet_snapshot(&addr("a")).await.unwrap().balance, 0);
    assert!(engine
        .purchase_receipt(&event.purchase_id)
        .await
        .unwrap()
        .is_none());

    drop(held);
    let outcome = engine.process_purchase(&event).await.unwrap();
    assert!(!outcome.is_duplicate());
    assert_eq!(engine.wallet_snapshot(&addr("a")).await.unwrap().balance, 30);
    assert_eq!(engine.wallet_snapshot(&addr("b")).await.unwrap().balance, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_keep_team_size() {
    let engine = engine(Duration::from_secs(10)).await;
    engine.register_wallet(&addr("root"), None, "normal").await.unwrap();
    engine
        .register_wallet(&addr("mid"), Some(&addr("root")), "normal")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .register_wallet(&addr(&format!("leaf{}", i)), Some(&addr("mid")), "normal")
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let root = engine.get_wallet(&addr("root")).await.unwrap().unwrap();
    let mid = engine.get_wallet(&addr("mid")).await.unwrap().unwrap();
    assert_eq!(root.team_size, 33);
    assert_eq!(mid.team_size, 32);
    assert_eq!(mid.direct_referrals_count, 32);

    let page = engine.direct_referrals(&addr("mid"), 0, 20).await.unwrap();
    assert_eq!(page.referrals.len(), 20);
    assert_eq!(page.total_count, 32);
    assert!(page.has_more);
}
