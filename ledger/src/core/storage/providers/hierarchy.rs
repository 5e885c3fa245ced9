use async_trait::async_trait;
use log::trace;
use nodeshare_common::{
    crypto::Address,
    referral::{DirectReferralsResult, HierarchyEdge, ReferralError, MAX_DIRECT_REFERRALS_PER_PAGE},
    serializer::{Reader, Serializer},
    time::TimestampMillis,
};

use crate::core::{
    error::LedgerError,
    storage::{direct_referral_key, edge_key, Column, ColumnStore, Snapshot},
};

#[async_trait]
pub trait HierarchyProvider {
    /// Stored ancestor edges of a wallet, ordered by depth
    async fn get_hierarchy_edges(&self, wallet: &Address)
        -> Result<Vec<HierarchyEdge>, LedgerError>;

    /// Page of direct referrals of a wallet
    async fn get_direct_referrals(
        &self,
        parent: &Address,
        offset: u32,
        limit: u32,
    ) -> Result<DirectReferralsResult, LedgerError>;

    fn stage_hierarchy_edges(&self, snapshot: &mut Snapshot, edges: &[HierarchyEdge]);

    fn stage_direct_referral(
        &self,
        snapshot: &mut Snapshot,
        parent: &Address,
        child: &Address,
        joined_at: TimestampMillis,
    );
}

#[async_trait]
impl<S: ColumnStore> HierarchyProvider for S {
    async fn get_hierarchy_edges(
        &self,
        wallet: &Address,
    ) -> Result<Vec<HierarchyEdge>, LedgerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("get hierarchy edges of {}", wallet);
        }

        let prefix = wallet.to_key();
        let entries = self.load_prefix_from_disk::<Address>(Column::HierarchyEdges, &prefix)?;

        let mut edges = Vec::with_capacity(entries.len());
        for (key, ancestor) in entries {
            // {wallet}{depth}
            if key.len() != prefix.len() + 1 {
                return Err(LedgerError::corruption(
                    wallet,
                    format!("malformed hierarchy edge key of {} bytes", key.len()),
                ));
            }

            edges.push(HierarchyEdge {
                wallet: wallet.clone(),
                ancestor,
                depth: key[prefix.len()],
            });
        }

        Ok(edges)
    }

    async fn get_direct_referrals(
        &self,
        parent: &Address,
        offset: u32,
        limit: u32,
    ) -> Result<DirectReferralsResult, LedgerError> {
        if limit > MAX_DIRECT_REFERRALS_PER_PAGE {
            return Err(ReferralError::PageSizeTooLarge {
                max: MAX_DIRECT_REFERRALS_PER_PAGE,
                requested: limit,
            }
            .into());
        }

        let prefix = parent.to_key();
        let entries = self.scan_prefix_raw(Column::DirectReferrals, &prefix)?;
        let total_count = entries.len() as u32;

        let mut referrals = Vec::new();
        for (key, _) in entries.into_iter().skip(offset as usize).take(limit as usize) {
            let mut reader = Reader::new(&key[prefix.len()..]);
            referrals.push(Address::read(&mut reader)?);
        }

        let has_more = (offset as u64 + referrals.len() as u64) < total_count as u64;
        Ok(DirectReferralsResult {
            referrals,
            total_count,
            offset,
            has_more,
        })
    }

    fn stage_hierarchy_edges(&self, snapshot: &mut Snapshot, edges: &[HierarchyEdge]) {
        for edge in edges {
            snapshot.put(
                Column::HierarchyEdges,
                edge_key(&edge.wallet, edge.depth),
                edge.ancestor.to_bytes(),
            );
        }
    }

    fn stage_direct_referral(
        &self,
        snapshot: &mut Snapshot,
        parent: &Address,
        child: &Address,
        joined_at: TimestampMillis,
    ) {
        snapshot.put(
            Column::DirectReferrals,
            direct_referral_key(parent, child),
            joined_at.to_bytes(),
        );
    }
}
