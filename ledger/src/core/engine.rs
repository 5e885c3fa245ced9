use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use nodeshare_common::{
    account::{Amount, Wallet, WalletSnapshot},
    config::{DEFAULT_MIN_WITHDRAWAL_USD, MAX_HISTORY_PAGE_SIZE},
    crypto::{Address, Hash},
    referral::{
        default_member_levels, normalize_tier_name, CommissionRecord, CommissionSettings,
        DirectReferralsResult, MemberLevelConfig, PurchaseEvent, PurchaseId, PurchaseReceipt,
        RateSchedule, ReferralError, UplineEntry,
    },
    time::get_current_time_in_millis,
    withdrawal::{AdminDecision, WithdrawalRecord, WithdrawalRequest},
};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::core::{
    alert::{Alert, AlertSink, LogAlertSink},
    commission::{AncestorTier, CommissionCalculator, CommissionPlan},
    error::LedgerError,
    hierarchy::HierarchyResolver,
    locks::{LockKey, LockManager},
    registry::MemberLevelRegistry,
    storage::{Snapshot, Storage},
    withdrawal::WithdrawalProcessor,
    writer::{ApplyOutcome, LedgerWriter},
};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for acquiring every lock of one mutation
    pub lock_timeout: Duration,
    pub min_withdrawal_usd: Decimal,
    /// Seeds the member level table when storage holds none
    pub levels: Vec<MemberLevelConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            min_withdrawal_usd: Decimal::from(DEFAULT_MIN_WITHDRAWAL_USD),
            levels: default_member_levels(),
        }
    }
}

/// Entry point of the ledger: wallet registration, purchase distribution,
/// withdrawals and the read side used for reporting.
pub struct CommissionEngine<S: Storage> {
    storage: Arc<S>,
    registry: RwLock<Arc<MemberLevelRegistry>>,
    locks: Arc<LockManager>,
    hierarchy: HierarchyResolver<S>,
    writer: LedgerWriter<S>,
    withdrawals: WithdrawalProcessor<S>,
    alerts: Arc<dyn AlertSink>,
}

impl<S: Storage> CommissionEngine<S> {
    pub async fn new(storage: Arc<S>, config: EngineConfig) -> Result<Self, LedgerError> {
        let registry = Self::load_registry(&storage, config.levels).await?;
        let locks = Arc::new(LockManager::new(config.lock_timeout));

        Ok(Self {
            hierarchy: HierarchyResolver::new(storage.clone()),
            writer: LedgerWriter::new(storage.clone(), locks.clone()),
            withdrawals: WithdrawalProcessor::new(
                storage.clone(),
                locks.clone(),
                config.min_withdrawal_usd,
            ),
            registry: RwLock::new(Arc::new(registry)),
            storage,
            locks,
            alerts: Arc::new(LogAlertSink),
        })
    }

    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    // Persisted levels win, configured levels only seed an empty table
    async fn load_registry(
        storage: &Arc<S>,
        configured: Vec<MemberLevelConfig>,
    ) -> Result<MemberLevelRegistry, LedgerError> {
        let stored = storage.get_member_levels().await?;
        if !stored.is_empty() {
            debug!("loaded {} member levels from storage", stored.len());
            return Ok(MemberLevelRegistry::new(stored)?);
        }

        let registry = MemberLevelRegistry::new(configured)?;
        let mut snapshot = Snapshot::new();
        for level in registry.tiers() {
            storage.stage_member_level(&mut snapshot, level);
        }
        storage.commit(snapshot)?;
        info!("seeded {} member levels", registry.len());

        Ok(registry)
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub async fn registry(&self) -> Arc<MemberLevelRegistry> {
        self.registry.read().await.clone()
    }

    // Forward structural failures to the operators
    fn escalate<T>(
        &self,
        subject: &str,
        result: Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        if let Err(e) = &result {
            if let Some(alert) = Alert::from_error(subject, e) {
                self.alerts.raise(&alert);
            }
        }
        result
    }

    /// Join `address` under `parent`, or as a root wallet when `parent` is None.
    /// Registering the same wallet twice under the same parent is a no-op.
    pub async fn register_wallet(
        &self,
        address: &Address,
        parent: Option<&Address>,
        tier: &str,
    ) -> Result<Wallet, LedgerError> {
        let tier = self.registry().await.get(tier)?.name.clone();

        if let Some(existing) = self.storage.get_wallet(address).await? {
            return Self::check_rebind(existing, parent);
        }

        let edges = match parent {
            Some(parent) => {
                if !self.storage.has_wallet(parent).await? {
                    return Err(ReferralError::ReferrerNotFound.into());
                }
                self.hierarchy.derive_edges(address, parent).await?
            }
            None => Vec::new(),
        };

        let keys = std::iter::once(LockKey::Wallet(address.clone()))
            .chain(edges.iter().map(|e| LockKey::Wallet(e.ancestor.clone())));
        let _guard = self.locks.acquire(keys).await?;

        // a concurrent registration may have won the race
        if let Some(existing) = self.storage.get_wallet(address).await? {
            return Self::check_rebind(existing, parent);
        }

        let now = get_current_time_in_millis();
        let wallet = Wallet::new(address.clone(), parent.cloned(), tier, now);
        let mut snapshot = Snapshot::new();

        for edge in &edges {
            let mut ancestor = self
                .storage
                .get_wallet(&edge.ancestor)
                .await?
                .ok_or_else(|| {
                    LedgerError::corruption(address, format!("ancestor {} missing", edge.ancestor))
                })?;
            ancestor.increment_team_size(1);
            if edge.depth == 0 {
                ancestor.increment_direct_count();
                self.storage
                    .stage_direct_referral(&mut snapshot, &edge.ancestor, address, now);
            }
            self.storage.stage_wallet(&mut snapshot, &ancestor);
        }

        self.storage.stage_hierarchy_edges(&mut snapshot, &edges);
        self.storage.stage_wallet(&mut snapshot, &wallet);
        self.storage.commit(snapshot)?;

        match parent {
            Some(parent) => info!(
                "registered {} under {} ({} ancestors)",
                address,
                parent,
                edges.len()
            ),
            None => info!("registered root wallet {}", address),
        }

        Ok(wallet)
    }

    fn check_rebind(existing: Wallet, parent: Option<&Address>) -> Result<Wallet, LedgerError> {
        if existing.parent.as_ref() == parent {
            Ok(existing)
        } else {
            Err(ReferralError::AlreadyBound.into())
        }
    }

    /// Distribute the commission of one purchase. Retrying a purchase that
    /// was already applied returns its stored receipt.
    pub async fn process_purchase(
        &self,
        event: &PurchaseEvent,
    ) -> Result<ApplyOutcome, LedgerError> {
        let result = self.process_purchase_inner(event).await;
        self.escalate(event.purchase_id.as_str(), result)
    }

    async fn process_purchase_inner(
        &self,
        event: &PurchaseEvent,
    ) -> Result<ApplyOutcome, LedgerError> {
        if event.amount == 0 {
            return Err(LedgerError::InvalidAmount(event.amount));
        }

        if let Some(receipt) = self.storage.get_purchase_receipt(&event.purchase_id).await? {
            return Ok(ApplyOutcome::AlreadyApplied(receipt));
        }

        let registry = self.registry().await;
        let level = registry.get(&event.purchaser_tier)?;

        self.ensure_purchaser(&event.purchaser, &level.name).await?;
        let plan = self.plan(&registry, event, level).await?;

        self.writer.apply(event, &plan).await
    }

    /// Commission plan for `event` without applying it
    pub async fn preview_purchase(
        &self,
        event: &PurchaseEvent,
    ) -> Result<CommissionPlan, LedgerError> {
        let registry = self.registry().await;
        let level = registry.get(&event.purchaser_tier)?;
        self.plan(&registry, event, level).await
    }

    async fn plan(
        &self,
        registry: &MemberLevelRegistry,
        event: &PurchaseEvent,
        level: &MemberLevelConfig,
    ) -> Result<CommissionPlan, LedgerError> {
        let upline = self.hierarchy.resolve(&event.purchaser, level.max_depth).await?;

        let mut ancestors = Vec::with_capacity(upline.len());
        for entry in upline {
            let wallet = self
                .storage
                .get_wallet(&entry.ancestor)
                .await?
                .ok_or_else(|| {
                    LedgerError::corruption(
                        &event.purchaser,
                        format!("ancestor {} has no wallet", entry.ancestor),
                    )
                })?;
            ancestors.push(AncestorTier {
                ancestor: entry.ancestor,
                depth: entry.depth,
                tier: wallet.member_tier,
            });
        }

        let settings = self
            .storage
            .get_commission_settings(&event.purchaser)
            .await?;
        let schedule = RateSchedule::resolve(level, settings.as_ref()).map_err(|e| {
            LedgerError::Configuration(format!(
                "commission settings of {} do not fit tier {}: {}",
                event.purchaser, level.name, e
            ))
        })?;

        Ok(CommissionCalculator::new(registry).compute(
            &event.purchaser,
            event.amount,
            level,
            &schedule,
            &ancestors,
        )?)
    }

    // Unknown purchasers join as root wallets
    async fn ensure_purchaser(&self, purchaser: &Address, tier: &str) -> Result<(), LedgerError> {
        if self.storage.has_wallet(purchaser).await? {
            return Ok(());
        }

        let _guard = self
            .locks
            .acquire([LockKey::Wallet(purchaser.clone())])
            .await?;
        if self.storage.has_wallet(purchaser).await? {
            return Ok(());
        }

        let wallet = Wallet::new(
            purchaser.clone(),
            None,
            tier.to_owned(),
            get_current_time_in_millis(),
        );
        let mut snapshot = Snapshot::new();
        self.storage.stage_wallet(&mut snapshot, &wallet);
        self.storage.commit(snapshot)?;

        debug!("created root wallet {} for first purchase", purchaser);
        Ok(())
    }

    /// Store per-wallet level 1/2 rates, checked against the wallet's tier
    pub async fn set_commission_settings(
        &self,
        wallet: &Address,
        settings: CommissionSettings,
    ) -> Result<RateSchedule, LedgerError> {
        let stored = self.load_wallet(wallet).await?;
        let registry = self.registry().await;
        let level = registry.get(&stored.member_tier)?;
        let schedule = RateSchedule::resolve(level, Some(&settings))?;

        let mut snapshot = Snapshot::new();
        self.storage
            .stage_commission_settings(&mut snapshot, wallet, &settings);
        self.storage.commit(snapshot)?;

        info!(
            "commission rates of {} set to {} / {} (self {})",
            wallet, schedule.level1, schedule.level2, schedule.self_rate
        );
        Ok(schedule)
    }

    /// Add or replace a member level, effective for the next purchase
    pub async fn update_member_level(
        &self,
        level: MemberLevelConfig,
    ) -> Result<(), LedgerError> {
        let mut registry = self.registry.write().await;
        let updated = registry.with_level(level.clone())?;

        let mut snapshot = Snapshot::new();
        self.storage.stage_member_level(&mut snapshot, &level);
        self.storage.commit(snapshot)?;

        *registry = Arc::new(updated);
        info!("member level {} updated", level.name);
        Ok(())
    }

    pub async fn member_levels(&self) -> Vec<MemberLevelConfig> {
        self.registry().await.tiers().cloned().collect()
    }

    /// Tier whose qualification threshold `holdings` meets, advisory only
    pub async fn suggest_tier(&self, holdings: Amount) -> Option<String> {
        self.registry()
            .await
            .tier_for_holdings(holdings)
            .map(|level| level.name.clone())
    }

    pub async fn request_withdrawal(
        &self,
        request: &WithdrawalRequest,
    ) -> Result<WithdrawalRecord, LedgerError> {
        self.withdrawals.request(request).await
    }

    pub async fn mark_withdrawal_processing(
        &self,
        id: &Hash,
    ) -> Result<WithdrawalRecord, LedgerError> {
        self.withdrawals.mark_processing(id).await
    }

    pub async fn decide_withdrawal(
        &self,
        decision: AdminDecision,
    ) -> Result<WithdrawalRecord, LedgerError> {
        self.withdrawals.decide(decision).await
    }

    pub async fn get_withdrawal(&self, id: &Hash) -> Result<Option<WithdrawalRecord>, LedgerError> {
        self.withdrawals.get(id).await
    }

    pub async fn withdrawal_history(
        &self,
        wallet: &Address,
        limit: usize,
    ) -> Result<Vec<WithdrawalRecord>, LedgerError> {
        self.withdrawals
            .history(wallet, limit.min(MAX_HISTORY_PAGE_SIZE))
            .await
    }

    pub async fn get_wallet(&self, address: &Address) -> Result<Option<Wallet>, LedgerError> {
        self.storage.get_wallet(address).await
    }

    pub async fn wallet_snapshot(&self, address: &Address) -> Result<WalletSnapshot, LedgerError> {
        Ok(self.load_wallet(address).await?.snapshot())
    }

    pub async fn commission_history(
        &self,
        wallet: &Address,
        limit: usize,
    ) -> Result<Vec<CommissionRecord>, LedgerError> {
        self.storage
            .get_commission_history(wallet, limit.min(MAX_HISTORY_PAGE_SIZE))
            .await
    }

    pub async fn purchase_receipt(
        &self,
        purchase_id: &PurchaseId,
    ) -> Result<Option<PurchaseReceipt>, LedgerError> {
        self.storage.get_purchase_receipt(purchase_id).await
    }

    pub async fn direct_referrals(
        &self,
        wallet: &Address,
        offset: u32,
        limit: u32,
    ) -> Result<DirectReferralsResult, LedgerError> {
        self.storage.get_direct_referrals(wallet, offset, limit).await
    }

    pub async fn get_uplines(
        &self,
        wallet: &Address,
        max_depth: u8,
    ) -> Result<Vec<UplineEntry>, LedgerError> {
        let result = self.hierarchy.resolve(wallet, max_depth).await;
        self.escalate(wallet.as_str(), result)
    }

    /// Re-walk the parent links of `wallet` against its stored edges
    pub async fn verify_hierarchy(&self, wallet: &Address) -> Result<usize, LedgerError> {
        let result = self.hierarchy.verify(wallet).await;
        if let Err(e) = &result {
            warn!("hierarchy verification of {} failed: {}", wallet, e);
        }
        self.escalate(wallet.as_str(), result)
    }

    pub async fn has_tier(&self, tier: &str) -> bool {
        self.registry().await.contains(&normalize_tier_name(tier))
    }

    async fn load_wallet(&self, address: &Address) -> Result<Wallet, LedgerError> {
        self.storage
            .get_wallet(address)
            .await?
            .ok_or_else(|| LedgerError::UnknownWallet(address.clone()))
    }
}
