// Commission computation for a single purchase.
//
// Pure and synchronous: the engine resolves the upline and the rate schedule
// first, the calculator only turns them into credits. Every amount is
// rounded down to the atomic unit and the remainder is never distributed.

use log::trace;
use nodeshare_common::{
    account::Amount,
    crypto::Address,
    referral::{
        CommissionDistribution, CommissionKind, MemberLevelConfig, Rate, RateSchedule,
        ReferralResult,
    },
};
use serde::Serialize;

use crate::core::registry::MemberLevelRegistry;

/// An ancestor of the purchaser with the tier it currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorTier {
    pub ancestor: Address,
    pub depth: u8,
    pub tier: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CutReason {
    // Chain ends before this level
    NoAncestor,
    // Ancestor exists but its tier does not reach this depth
    OutOfReach,
}

/// Commission computed but not paid to anyone
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommissionCut {
    pub level: u8,
    pub kind: CommissionKind,
    pub amount: Amount,
    pub reason: CutReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommissionPlan {
    pub purchaser: Address,
    pub amount: Amount,
    pub tier: String,
    pub schedule: RateSchedule,
    /// `amount * totalCommission`, upper bound of everything below
    pub entitlement: Amount,
    pub distributions: Vec<CommissionDistribution>,
    pub cuts: Vec<CommissionCut>,
}

impl CommissionPlan {
    /// Sum of every credit, self retention included
    pub fn distributed(&self) -> Amount {
        self.distributions
            .iter()
            .fold(0, |acc: Amount, d| acc.saturating_add(d.amount))
    }

    pub fn cut_total(&self) -> Amount {
        self.cuts
            .iter()
            .fold(0, |acc: Amount, c| acc.saturating_add(c.amount))
    }

    pub fn self_retention(&self) -> Amount {
        self.distributions
            .iter()
            .filter(|d| d.kind == CommissionKind::SelfRetention)
            .map(|d| d.amount)
            .sum()
    }

    pub fn amount_for(&self, recipient: &Address) -> Amount {
        self.distributions
            .iter()
            .filter(|d| &d.recipient == recipient)
            .map(|d| d.amount)
            .sum()
    }
}

pub struct CommissionCalculator<'a> {
    registry: &'a MemberLevelRegistry,
}

impl<'a> CommissionCalculator<'a> {
    pub fn new(registry: &'a MemberLevelRegistry) -> Self {
        Self { registry }
    }

    /// Split a purchase between the purchaser's ancestors and the purchaser.
    ///
    /// Levels 1 and 2 go to the ancestors at those depths, the passthrough
    /// share goes once to the nearest ancestor beyond level 2 whose tier
    /// reaches its depth, and unused headroom returns to the purchaser.
    /// A level without an eligible recipient is cut, never redirected.
    /// Any ancestor holding an unregistered tier aborts the computation.
    pub fn compute(
        &self,
        purchaser: &Address,
        amount: Amount,
        level: &MemberLevelConfig,
        schedule: &RateSchedule,
        ancestors: &[AncestorTier],
    ) -> ReferralResult<CommissionPlan> {
        let mut chain = Vec::with_capacity(ancestors.len());
        for ancestor in ancestors {
            let ancestor_level = self.registry.get(&ancestor.tier)?;
            if ancestor.depth >= 1 && ancestor.depth <= level.max_depth {
                chain.push((ancestor, ancestor_level));
            }
        }

        let mut plan = CommissionPlan {
            purchaser: purchaser.clone(),
            amount,
            tier: level.name.clone(),
            schedule: *schedule,
            entitlement: level.total_commission.apply(amount),
            distributions: Vec::new(),
            cuts: Vec::new(),
        };

        let slots = [
            (1u8, CommissionKind::Direct, schedule.level1),
            (2u8, CommissionKind::Indirect, schedule.level2),
        ];
        for (depth, kind, rate) in slots {
            let share = rate.apply(amount);
            if share == 0 {
                continue;
            }

            match chain.iter().find(|(a, _)| a.depth == depth) {
                Some((ancestor, ancestor_level)) if ancestor_level.covers_depth(depth) => {
                    plan.distributions.push(CommissionDistribution {
                        recipient: ancestor.ancestor.clone(),
                        amount: share,
                        level: depth,
                        kind,
                    });
                }
                Some(_) => plan.cuts.push(cut(depth, kind, share, CutReason::OutOfReach)),
                None => plan.cuts.push(cut(depth, kind, share, CutReason::NoAncestor)),
            }
        }

        self.apply_passthrough(&mut plan, &chain, schedule.passthrough);

        let retained = schedule.self_rate.apply(amount);
        if retained > 0 {
            plan.distributions.push(CommissionDistribution {
                recipient: purchaser.clone(),
                amount: retained,
                level: 0,
                kind: CommissionKind::SelfRetention,
            });
        }

        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "commission plan for {}: {} distributed, {} cut, {} entitled",
                purchaser,
                plan.distributed(),
                plan.cut_total(),
                plan.entitlement
            );
        }

        Ok(plan)
    }

    fn apply_passthrough(
        &self,
        plan: &mut CommissionPlan,
        chain: &[(&AncestorTier, &MemberLevelConfig)],
        rate: Rate,
    ) {
        let share = rate.apply(plan.amount);
        if share == 0 {
            return;
        }

        let mut beyond = chain.iter().filter(|(a, _)| a.depth >= 3).peekable();
        let reached_any = beyond.peek().is_some();
        let recipient = beyond.find(|(a, l)| l.covers_depth(a.depth));

        match recipient {
            Some((ancestor, _)) => plan.distributions.push(CommissionDistribution {
                recipient: ancestor.ancestor.clone(),
                amount: share,
                level: ancestor.depth,
                kind: CommissionKind::Passthrough,
            }),
            None => {
                let reason = if reached_any {
                    CutReason::OutOfReach
                } else {
                    CutReason::NoAncestor
                };
                plan.cuts
                    .push(cut(3, CommissionKind::Passthrough, share, reason));
            }
        }
    }
}

fn cut(level: u8, kind: CommissionKind, amount: Amount, reason: CutReason) -> CommissionCut {
    CommissionCut {
        level,
        kind,
        amount,
        reason,
    }
}
