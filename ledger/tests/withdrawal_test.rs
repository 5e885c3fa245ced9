//! Withdrawal lifecycle tests
//!
//! - request holds the balance, burn and net amounts are computed
//! - rejection refunds the requested amount exactly once
//! - approval moves the amount to total_withdrawn
//! - minimum USD value and illegal transitions are refused

use std::sync::Arc;

use nodeshare_common::{
    config::COIN_VALUE,
    crypto::{hash, Address, Hash},
    referral::{PurchaseEvent, PurchaseId, Rate},
    withdrawal::{AdminDecision, Decision, WithdrawalRequest, WithdrawalStatus},
};
use nodeshare_ledger::core::{
    engine::{CommissionEngine, EngineConfig},
    error::LedgerError,
    storage::MemoryStorage,
};
use rust_decimal::Decimal;

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

/// Engine where wallet `w` earned `balance` through self retention
async fn funded_engine(balance: u64) -> CommissionEngine<MemoryStorage> {
    let engine = CommissionEngine::new(Arc::new(MemoryStorage::new()), EngineConfig::default())
        .await
        .unwrap();

    // a root global partner retains 10% of its own purchases
    let amount = balance * 10;
    engine
        .process_purchase(&PurchaseEvent {
            purchase_id: PurchaseId::new("seed").unwrap(),
            purchaser: addr("w"),
            amount,
            purchaser_tier: "global_partner".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(
        engine.wallet_snapshot(&addr("w")).await.unwrap().balance,
        balance
    );
    engine
}

fn request(amount: u64, price: Decimal, burn_bps: u32) -> WithdrawalRequest {
    WithdrawalRequest {
        wallet: addr("w"),
        amount,
        current_token_price: price,
        burn_rate: Rate::from_bps(burn_bps),
    }
}

fn reject(id: Hash, reason: &str) -> AdminDecision {
    AdminDecision {
        withdrawal_id: id,
        decision: Decision::Reject {
            reason: reason.to_string(),
        },
    }
}

#[tokio::test]
async fn test_hold_then_reject_restores_balance() {
    let engine = funded_engine(100 * COIN_VALUE).await;

    let record = engine
        .request_withdrawal(&request(50 * COIN_VALUE, Decimal::ONE, 1000))
        .await
        .unwrap();
    assert_eq!(record.status, WithdrawalStatus::Pending);
    assert_eq!(record.burn_amount, 5 * COIN_VALUE);
    assert_eq!(record.net_amount, 45 * COIN_VALUE);
    assert_eq!(record.amount_usd, Decimal::from(50));

    let held = engine.wallet_snapshot(&addr("w")).await.unwrap();
    assert_eq!(held.balance, 50 * COIN_VALUE);

    let rejected = engine
        .decide_withdrawal(reject(record.id, "address mismatch"))
        .await
        .unwrap();
    assert_eq!(rejected.status, WithdrawalStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("address mismatch"));
    assert!(rejected.completed_at.is_some());

    let restored = engine.wallet_snapshot(&addr("w")).await.unwrap();
    assert_eq!(restored.balance, 100 * COIN_VALUE);
    assert_eq!(restored.total_withdrawn, 0);

    // a second rejection must not refund again
    let err = engine
        .decide_withdrawal(reject(record.id, "again"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    assert_eq!(
        engine.wallet_snapshot(&addr("w")).await.unwrap().balance,
        100 * COIN_VALUE
    );
}

#[tokio::test]
async fn test_processing_then_approval() {
    let engine = funded_engine(100 * COIN_VALUE).await;
    let record = engine
        .request_withdrawal(&request(30 * COIN_VALUE, Decimal::ONE, 0))
        .await
        .unwrap();

    let processing = engine.mark_withdrawal_processing(&record.id).await.unwrap();
    assert_eq!(processing.status, WithdrawalStatus::Processing);
    assert!(processing.processing_at.is_some());

    let completed = engine
        .decide_withdrawal(AdminDecision {
            withdrawal_id: record.id,
            decision: Decision::Approve {
                settlement_ref: Some("0xsettled".to_string()),
            },
        })
        .await
        .unwrap();
    assert_eq!(completed.status, WithdrawalStatus::Completed);
    assert_eq!(completed.net_amount, 30 * COIN_VALUE);

    let snapshot = engine.wallet_snapshot(&addr("w")).await.unwrap();
    assert_eq!(snapshot.balance, 70 * COIN_VALUE);
    assert_eq!(snapshot.total_withdrawn, 30 * COIN_VALUE);
    assert_eq!(snapshot.total_earnings, 100 * COIN_VALUE);

    // completed is terminal
    assert!(matches!(
        engine.mark_withdrawal_processing(&record.id).await,
        Err(LedgerError::InvalidTransition {
            from: WithdrawalStatus::Completed,
            to: WithdrawalStatus::Processing,
        })
    ));

    let stored = engine.get_withdrawal(&record.id).await.unwrap().unwrap();
    assert_eq!(stored, completed);
}

#[tokio::test]
async fn test_minimum_is_checked_in_usd() {
    let engine = funded_engine(100 * COIN_VALUE).await;

    // 50 tokens at 0.10 USD is 5 USD
    let err = engine
        .request_withdrawal(&request(50 * COIN_VALUE, Decimal::new(10, 2), 0))
        .await
        .unwrap_err();
    match err {
        LedgerError::BelowMinimum {
            amount_usd,
            minimum,
        } => {
            assert_eq!(amount_usd, Decimal::new(5, 0));
            assert_eq!(minimum, Decimal::from(10));
        }
        other => panic!("unexpected error {other}"),
    }

    // 50 tokens at 0.20 USD is exactly the minimum
    engine
        .request_withdrawal(&request(50 * COIN_VALUE, Decimal::new(20, 2), 0))
        .await
        .unwrap();
    assert_eq!(
        engine.wallet_snapshot(&addr("w")).await.unwrap().balance,
        50 * COIN_VALUE
    );
}

#[tokio::test]
async fn test_insufficient_balance_leaves_wallet_untouched() {
    let engine = funded_engine(100 * COIN_VALUE).await;
    let err = engine
        .request_withdrawal(&request(101 * COIN_VALUE, Decimal::ONE, 0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientBalance {
            needed,
            available,
        } if needed == 101 * COIN_VALUE && available == 100 * COIN_VALUE
    ));
    assert!(engine
        .withdrawal_history(&addr("w"), 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let engine = funded_engine(100 * COIN_VALUE).await;
    let mut ids = Vec::new();
    for _ in 0..3 {
        let record = engine
            .request_withdrawal(&request(20 * COIN_VALUE, Decimal::ONE, 0))
            .await
            .unwrap();
        ids.push(record.id);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let history = engine.withdrawal_history(&addr("w"), 2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, ids[2]);
    assert_eq!(history[1].id, ids[1]);
}

#[tokio::test]
async fn test_unknown_withdrawal() {
    let engine = funded_engine(100 * COIN_VALUE).await;
    let missing = hash(b"missing");
    assert!(matches!(
        engine.mark_withdrawal_processing(&missing).await,
        Err(LedgerError::UnknownWithdrawal(_))
    ));
}
