use std::{collections::HashMap, sync::Arc};

use log::{debug, info, warn};
use nodeshare_common::{
    account::Wallet,
    crypto::Address,
    referral::{CommissionRecord, PurchaseEvent, PurchaseReceipt},
    time::get_current_time_in_millis,
};

use crate::core::{
    commission::CommissionPlan,
    error::LedgerError,
    locks::{LockKey, LockManager},
    storage::{Snapshot, Storage},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(PurchaseReceipt),
    // The purchase id was already processed, nothing was written
    AlreadyApplied(PurchaseReceipt),
}

impl ApplyOutcome {
    pub fn receipt(&self) -> &PurchaseReceipt {
        match self {
            Self::Applied(receipt) | Self::AlreadyApplied(receipt) => receipt,
        }
    }

    pub fn into_receipt(self) -> PurchaseReceipt {
        match self {
            Self::Applied(receipt) | Self::AlreadyApplied(receipt) => receipt,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::AlreadyApplied(_))
    }
}

/// Applies commission plans to wallet balances.
///
/// All credits of a purchase, its commission records and its receipt are
/// staged in one snapshot and committed in a single batch: a purchase is
/// either fully visible or not at all.
pub struct LedgerWriter<S> {
    storage: Arc<S>,
    locks: Arc<LockManager>,
}

impl<S: Storage> LedgerWriter<S> {
    pub fn new(storage: Arc<S>, locks: Arc<LockManager>) -> Self {
        Self { storage, locks }
    }

    pub async fn apply(
        &self,
        event: &PurchaseEvent,
        plan: &CommissionPlan,
    ) -> Result<ApplyOutcome, LedgerError> {
        let keys = std::iter::once(LockKey::Purchase(event.purchase_id.clone())).chain(
            plan.distributions
                .iter()
                .map(|d| LockKey::Wallet(d.recipient.clone())),
        );
        let _guard = self.locks.acquire(keys).await?;

        if let Some(receipt) = self
            .storage
            .get_purchase_receipt(&event.purchase_id)
            .await?
        {
            if log::log_enabled!(log::Level::Debug) {
                debug!("purchase {} already applied, skipping", event.purchase_id);
            }
            return Ok(ApplyOutcome::AlreadyApplied(receipt));
        }

        let now = get_current_time_in_millis();
        let mut snapshot = Snapshot::new();
        let mut wallets: HashMap<Address, Wallet> = HashMap::new();

        for distribution in &plan.distributions {
            let record = CommissionRecord::new(
                event.purchase_id.clone(),
                event.purchaser.clone(),
                distribution,
                now,
            );
            if !self.storage.stage_commission_record(&mut snapshot, &record) {
                return Err(LedgerError::corruption(
                    &distribution.recipient,
                    format!("credited twice by purchase {}", event.purchase_id),
                ));
            }

            if !wallets.contains_key(&distribution.recipient) {
                let wallet = self
                    .storage
                    .get_wallet(&distribution.recipient)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::corruption(
                            &distribution.recipient,
                            "commission recipient has no wallet",
                        )
                    })?;
                wallets.insert(distribution.recipient.clone(), wallet);
            }
            if let Some(wallet) = wallets.get_mut(&distribution.recipient) {
                wallet.credit(distribution.amount)?;
            }
        }

        for wallet in wallets.values() {
            self.storage.stage_wallet(&mut snapshot, wallet);
        }

        let receipt = PurchaseReceipt {
            purchase_id: event.purchase_id.clone(),
            purchaser: event.purchaser.clone(),
            amount: event.amount,
            tier: plan.tier.clone(),
            distributed: plan.distributed(),
            cut: plan.cut_total(),
            distributions: plan.distributions.clone(),
            applied_at: now,
        };
        self.storage.stage_purchase_receipt(&mut snapshot, &receipt);

        if let Err(e) = self.storage.commit(snapshot) {
            warn!("commit of purchase {} failed: {}", event.purchase_id, e);
            return Err(LedgerError::PartialFailure {
                purchase_id: event.purchase_id.clone(),
                reason: e.to_string(),
            });
        }

        info!(
            "applied purchase {} by {}: {} credited to {} wallets, {} cut",
            event.purchase_id,
            event.purchaser,
            receipt.distributed,
            wallets.len(),
            receipt.cut
        );

        Ok(ApplyOutcome::Applied(receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        commission::{AncestorTier, CommissionCalculator},
        registry::MemberLevelRegistry,
        storage::{ColumnStore, CommissionProvider, MemoryStorage, WalletProvider},
    };
    use nodeshare_common::referral::{default_member_levels, PurchaseId, RateSchedule};
    use std::time::Duration;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn seed(storage: &MemoryStorage, names: &[&str]) {
        let mut snapshot = Snapshot::new();
        for name in names {
            storage.stage_wallet(
                &mut snapshot,
                &Wallet::new(addr(name), None, "normal".into(), 0),
            );
        }
        storage.commit(snapshot).unwrap();
    }

    fn plan(registry: &MemberLevelRegistry, amount: u64) -> CommissionPlan {
        let level = registry.get("normal").unwrap();
        let schedule = RateSchedule::resolve(level, None).unwrap();
        CommissionCalculator::new(registry)
            .compute(
                &addr("p"),
                amount,
                level,
                &schedule,
                &[
                    AncestorTier {
                        ancestor: addr("a"),
                        depth: 1,
                        tier: "normal".into(),
                    },
                    AncestorTier {
                        ancestor: addr("b"),
                        depth: 2,
                        tier: "normal".into(),
                    },
                ],
            )
            .unwrap()
    }

    fn event(id: &str, amount: u64) -> PurchaseEvent {
        PurchaseEvent {
            purchase_id: PurchaseId::new(id).unwrap(),
            purchaser: addr("p"),
            amount,
            purchaser_tier: "normal".into(),
        }
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let storage = Arc::new(MemoryStorage::new());
        seed(&storage, &["p", "a", "b"]);
        let registry = MemberLevelRegistry::new(default_member_levels()).unwrap();
        let writer = LedgerWriter::new(
            storage.clone(),
            Arc::new(LockManager::new(Duration::from_secs(1))),
        );

        let plan = plan(&registry, 1000);
        let first = writer.apply(&event("order-1", 1000), &plan).await.unwrap();
        assert!(!first.is_duplicate());
        assert_eq!(first.receipt().distributed, 50);

        let second = writer.apply(&event("order-1", 1000), &plan).await.unwrap();
        assert!(second.is_duplicate());
        assert_eq!(second.receipt(), first.receipt());

        let a = storage.get_wallet(&addr("a")).await.unwrap().unwrap();
        let b = storage.get_wallet(&addr("b")).await.unwrap().unwrap();
        assert_eq!((a.balance, a.total_earnings), (30, 30));
        assert_eq!((b.balance, b.total_earnings), (20, 20));

        let record = storage
            .get_commission_record(&PurchaseId::new("order-1").unwrap(), &addr("a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.amount, 30);
        assert_eq!(record.source, addr("p"));
    }

    #[tokio::test]
    async fn test_missing_recipient_writes_nothing() {
        let storage = Arc::new(MemoryStorage::new());
        seed(&storage, &["p", "a"]);
        let registry = MemberLevelRegistry::new(default_member_levels()).unwrap();
        let writer = LedgerWriter::new(
            storage.clone(),
            Arc::new(LockManager::new(Duration::from_secs(1))),
        );

        let err = writer
            .apply(&event("order-2", 1000), &plan(&registry, 1000))
            .await
            .unwrap_err();
        assert!(err.is_structural());

        let a = storage.get_wallet(&addr("a")).await.unwrap().unwrap();
        assert_eq!(a.balance, 0);
        assert!(storage
            .get_purchase_receipt(&PurchaseId::new("order-2").unwrap())
            .await
            .unwrap()
            .is_none());
    }
}
