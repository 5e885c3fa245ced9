use std::sync::Arc;

use log::{debug, info};
use nodeshare_common::{
    account::Wallet,
    config::BASIS_POINTS,
    crypto::{Address, Hash},
    time::{get_current_time_in_millis, TimestampMillis},
    withdrawal::{
        AdminDecision, Decision, WithdrawalError, WithdrawalRecord, WithdrawalRequest,
        WithdrawalStatus,
    },
};
use rust_decimal::Decimal;

use crate::core::{
    error::LedgerError,
    locks::{LockKey, LockManager},
    storage::{Snapshot, Storage},
};

/// Withdrawal lifecycle.
///
/// The requested amount leaves the balance as soon as the request is
/// accepted and only comes back if an admin rejects it. Completion moves
/// the amount into `total_withdrawn`. Every transition rewrites the record
/// and the wallet in the same commit.
pub struct WithdrawalProcessor<S> {
    storage: Arc<S>,
    locks: Arc<LockManager>,
    min_withdrawal_usd: Decimal,
}

impl<S: Storage> WithdrawalProcessor<S> {
    pub fn new(storage: Arc<S>, locks: Arc<LockManager>, min_withdrawal_usd: Decimal) -> Self {
        Self {
            storage,
            locks,
            min_withdrawal_usd,
        }
    }

    pub fn min_withdrawal_usd(&self) -> Decimal {
        self.min_withdrawal_usd
    }

    pub async fn request(
        &self,
        request: &WithdrawalRequest,
    ) -> Result<WithdrawalRecord, LedgerError> {
        if request.amount == 0 {
            return Err(WithdrawalError::InvalidAmount.into());
        }
        if request.burn_rate.bps() > BASIS_POINTS {
            return Err(WithdrawalError::InvalidBurnRate(request.burn_rate.bps()).into());
        }

        let amount_usd = request.amount_usd()?;
        if amount_usd < self.min_withdrawal_usd {
            return Err(LedgerError::BelowMinimum {
                amount_usd,
                minimum: self.min_withdrawal_usd,
            });
        }

        let _guard = self
            .locks
            .acquire([LockKey::Wallet(request.wallet.clone())])
            .await?;

        let mut wallet = self.load_wallet(&request.wallet).await?;
        wallet.debit(request.amount)?;

        let now = get_current_time_in_millis();
        let id = WithdrawalRecord::generate_id(&request.wallet, request.amount, now);
        let record = WithdrawalRecord::pending(id, request, amount_usd, now);

        let mut snapshot = Snapshot::new();
        self.storage.stage_wallet(&mut snapshot, &wallet);
        self.storage.stage_withdrawal(&mut snapshot, &record);
        self.storage.commit(snapshot)?;

        info!(
            "withdrawal {} requested by {}: {} held, {} burned, {} USD",
            record.id, record.wallet, record.amount, record.burn_amount, record.amount_usd
        );

        Ok(record)
    }

    pub async fn mark_processing(&self, id: &Hash) -> Result<WithdrawalRecord, LedgerError> {
        self.transition(id, |record, _, now| {
            record.mark_processing(now)?;
            Ok(false)
        })
        .await
    }

    pub async fn approve(
        &self,
        id: &Hash,
        settlement_ref: Option<String>,
    ) -> Result<WithdrawalRecord, LedgerError> {
        self.transition(id, move |record, wallet, now| {
            record.complete(settlement_ref, now)?;
            wallet.record_withdrawn(record.amount)?;
            Ok(true)
        })
        .await
    }

    pub async fn reject(&self, id: &Hash, reason: String) -> Result<WithdrawalRecord, LedgerError> {
        self.transition(id, move |record, wallet, now| {
            record.reject(reason, now)?;
            wallet.refund(record.amount)?;
            Ok(true)
        })
        .await
    }

    pub async fn decide(&self, decision: AdminDecision) -> Result<WithdrawalRecord, LedgerError> {
        match decision.decision {
            Decision::Approve { settlement_ref } => {
                self.approve(&decision.withdrawal_id, settlement_ref).await
            }
            Decision::Reject { reason } => self.reject(&decision.withdrawal_id, reason).await,
        }
    }

    pub async fn get(&self, id: &Hash) -> Result<Option<WithdrawalRecord>, LedgerError> {
        self.storage.get_withdrawal(id).await
    }

    pub async fn history(
        &self,
        wallet: &Address,
        limit: usize,
    ) -> Result<Vec<WithdrawalRecord>, LedgerError> {
        self.storage.get_withdrawal_history(wallet, limit).await
    }

    // Apply `update` under the withdrawal and wallet locks. The closure
    // returns whether the wallet row changed.
    async fn transition<F>(&self, id: &Hash, update: F) -> Result<WithdrawalRecord, LedgerError>
    where
        F: FnOnce(&mut WithdrawalRecord, &mut Wallet, TimestampMillis)
            -> Result<bool, LedgerError>,
    {
        let owner = self.load_record(id).await?.wallet;
        let _guard = self
            .locks
            .acquire([LockKey::Withdrawal(*id), LockKey::Wallet(owner)])
            .await?;

        // reload now that concurrent decisions are excluded
        let mut record = self.load_record(id).await?;
        let mut wallet = self.load_wallet(&record.wallet).await?;
        let from = record.status;

        let now = get_current_time_in_millis();
        let wallet_changed = update(&mut record, &mut wallet, now)?;

        let mut snapshot = Snapshot::new();
        if wallet_changed {
            self.storage.stage_wallet(&mut snapshot, &wallet);
        }
        self.storage.stage_withdrawal(&mut snapshot, &record);
        self.storage.commit(snapshot)?;

        if log::log_enabled!(log::Level::Debug) {
            debug!("withdrawal {} moved from {} to {}", id, from, record.status);
        }
        if record.status == WithdrawalStatus::Rejected {
            info!(
                "withdrawal {} rejected, {} returned to {}",
                id, record.amount, record.wallet
            );
        }

        Ok(record)
    }

    async fn load_record(&self, id: &Hash) -> Result<WithdrawalRecord, LedgerError> {
        self.storage
            .get_withdrawal(id)
            .await?
            .ok_or_else(|| LedgerError::UnknownWithdrawal(*id))
    }

    async fn load_wallet(&self, address: &Address) -> Result<Wallet, LedgerError> {
        self.storage
            .get_wallet(address)
            .await?
            .ok_or_else(|| LedgerError::UnknownWallet(address.clone()))
    }
}
