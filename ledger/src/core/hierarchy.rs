use std::{collections::HashSet, sync::Arc};

use log::{debug, trace};
use nodeshare_common::{
    crypto::Address,
    referral::{HierarchyEdge, ReferralError, UplineEntry, MAX_UPLINE_LEVELS},
};

use crate::core::{error::LedgerError, storage::Storage};

/// Read side of the referral tree, backed by the denormalized edge rows
pub struct HierarchyResolver<S> {
    storage: Arc<S>,
}

impl<S: Storage> HierarchyResolver<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Ancestors of `wallet`, nearest first, depth 1 being the direct parent.
    /// Stops at `max_depth` or where the chain ends.
    pub async fn resolve(
        &self,
        wallet: &Address,
        max_depth: u8,
    ) -> Result<Vec<UplineEntry>, LedgerError> {
        let edges = self.storage.get_hierarchy_edges(wallet).await?;
        validate_edges(wallet, &edges)?;

        let limit = max_depth.min(MAX_UPLINE_LEVELS) as usize;
        let upline: Vec<UplineEntry> = edges.iter().take(limit).map(UplineEntry::from).collect();

        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "resolved {} ancestors for {} (max depth {})",
                upline.len(),
                wallet,
                max_depth
            );
        }

        Ok(upline)
    }

    /// Edges for a new wallet joining under `parent`
    pub async fn derive_edges(
        &self,
        wallet: &Address,
        parent: &Address,
    ) -> Result<Vec<HierarchyEdge>, LedgerError> {
        if wallet == parent {
            return Err(ReferralError::SelfReferral.into());
        }

        let parent_edges = self.storage.get_hierarchy_edges(parent).await?;
        validate_edges(parent, &parent_edges)?;

        if parent_edges.iter().any(|edge| &edge.ancestor == wallet) {
            return Err(ReferralError::CircularReference.into());
        }

        let mut edges = Vec::with_capacity(parent_edges.len() + 1);
        edges.push(HierarchyEdge {
            wallet: wallet.clone(),
            ancestor: parent.clone(),
            depth: 0,
        });

        edges.extend(
            parent_edges
                .into_iter()
                .take(MAX_UPLINE_LEVELS as usize - 1)
                .map(|edge| HierarchyEdge {
                    wallet: wallet.clone(),
                    ancestor: edge.ancestor,
                    depth: edge.depth + 1,
                }),
        );

        Ok(edges)
    }

    /// Walk the parent links of `wallet` and check them against the stored
    /// edges. Returns the verified chain length.
    pub async fn verify(&self, wallet: &Address) -> Result<usize, LedgerError> {
        let mut current = self
            .storage
            .get_wallet(wallet)
            .await?
            .ok_or_else(|| LedgerError::UnknownWallet(wallet.clone()))?;

        let edges = self.storage.get_hierarchy_edges(wallet).await?;
        validate_edges(wallet, &edges)?;

        let mut visited = HashSet::new();
        visited.insert(wallet.clone());

        let mut depth = 0usize;
        while depth < MAX_UPLINE_LEVELS as usize {
            let Some(parent) = current.parent.clone() else {
                break;
            };

            if !visited.insert(parent.clone()) {
                return Err(LedgerError::corruption(
                    wallet,
                    format!("parent chain loops back to {}", parent),
                ));
            }

            match edges.get(depth) {
                Some(edge) if edge.ancestor == parent => {}
                Some(edge) => {
                    return Err(LedgerError::corruption(
                        wallet,
                        format!(
                            "edge at depth {} points to {} but parent chain has {}",
                            depth, edge.ancestor, parent
                        ),
                    ))
                }
                None => {
                    return Err(LedgerError::corruption(
                        wallet,
                        format!("missing edge at depth {}", depth),
                    ))
                }
            }

            current = self.storage.get_wallet(&parent).await?.ok_or_else(|| {
                LedgerError::corruption(wallet, format!("dangling parent {}", parent))
            })?;
            depth += 1;
        }

        if edges.len() != depth {
            return Err(LedgerError::corruption(
                wallet,
                format!("{} edges stored for a chain of {}", edges.len(), depth),
            ));
        }

        if log::log_enabled!(log::Level::Debug) {
            debug!("hierarchy of {} verified ({} levels)", wallet, depth);
        }

        Ok(depth)
    }
}

/// Structural checks on a wallet's edges: contiguous depths from 0, never
/// the wallet itself, no ancestor twice.
pub fn validate_edges(wallet: &Address, edges: &[HierarchyEdge]) -> Result<(), LedgerError> {
    if edges.len() > MAX_UPLINE_LEVELS as usize {
        return Err(LedgerError::corruption(
            wallet,
            format!("{} edges exceed the maximum depth", edges.len()),
        ));
    }

    let mut seen = HashSet::with_capacity(edges.len());
    for (index, edge) in edges.iter().enumerate() {
        if edge.depth as usize != index {
            return Err(LedgerError::corruption(
                wallet,
                format!("expected edge at depth {}, found {}", index, edge.depth),
            ));
        }

        if &edge.ancestor == wallet {
            return Err(LedgerError::corruption(
                wallet,
                format!("wallet is its own ancestor at depth {}", edge.depth),
            ));
        }

        if !seen.insert(&edge.ancestor) {
            return Err(LedgerError::corruption(
                wallet,
                format!("ancestor {} appears twice", edge.ancestor),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::{
        ColumnStore, HierarchyProvider, MemoryStorage, Snapshot, WalletProvider,
    };
    use nodeshare_common::account::Wallet;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn edge(wallet: &str, ancestor: &str, depth: u8) -> HierarchyEdge {
        HierarchyEdge {
            wallet: addr(wallet),
            ancestor: addr(ancestor),
            depth,
        }
    }

    fn store_edges(storage: &MemoryStorage, edges: &[HierarchyEdge]) {
        let mut snapshot = Snapshot::new();
        storage.stage_hierarchy_edges(&mut snapshot, edges);
        storage.commit(snapshot).unwrap();
    }

    #[tokio::test]
    async fn test_resolve_caps_at_max_depth() {
        let storage = Arc::new(MemoryStorage::new());
        store_edges(
            &storage,
            &[edge("p", "a", 0), edge("p", "b", 1), edge("p", "c", 2)],
        );
        let resolver = HierarchyResolver::new(storage);

        let upline = resolver.resolve(&addr("p"), 2).await.unwrap();
        assert_eq!(upline.len(), 2);
        assert_eq!(upline[0].ancestor, addr("a"));
        assert_eq!(upline[0].depth, 1);
        assert_eq!(upline[1].depth, 2);

        let upline = resolver.resolve(&addr("p"), 100).await.unwrap();
        assert_eq!(upline.len(), 3);

        assert!(resolver.resolve(&addr("root"), 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_refuses_cycle() {
        let storage = Arc::new(MemoryStorage::new());
        store_edges(
            &storage,
            &[edge("p", "a", 0), edge("p", "b", 1), edge("p", "a", 2)],
        );
        let resolver = HierarchyResolver::new(storage);

        let err = resolver.resolve(&addr("p"), 100).await.unwrap_err();
        assert!(matches!(err, LedgerError::HierarchyCorruption { .. }));
    }

    #[tokio::test]
    async fn test_resolve_refuses_self_ancestor_and_gaps() {
        let storage = Arc::new(MemoryStorage::new());
        store_edges(&storage, &[edge("p", "a", 0), edge("p", "p", 1)]);
        store_edges(&storage, &[edge("q", "a", 0), edge("q", "b", 2)]);
        let resolver = HierarchyResolver::new(storage);

        assert!(matches!(
            resolver.resolve(&addr("p"), 100).await,
            Err(LedgerError::HierarchyCorruption { .. })
        ));
        assert!(matches!(
            resolver.resolve(&addr("q"), 100).await,
            Err(LedgerError::HierarchyCorruption { .. })
        ));
    }

    #[tokio::test]
    async fn test_derive_edges() {
        let storage = Arc::new(MemoryStorage::new());
        store_edges(&storage, &[edge("a", "b", 0), edge("a", "c", 1)]);
        let resolver = HierarchyResolver::new(storage);

        let edges = resolver.derive_edges(&addr("p"), &addr("a")).await.unwrap();
        assert_eq!(
            edges,
            vec![edge("p", "a", 0), edge("p", "b", 1), edge("p", "c", 2)]
        );

        assert!(matches!(
            resolver.derive_edges(&addr("a"), &addr("a")).await,
            Err(LedgerError::Referral(ReferralError::SelfReferral))
        ));
        assert!(matches!(
            resolver.derive_edges(&addr("c"), &addr("a")).await,
            Err(LedgerError::Referral(ReferralError::CircularReference))
        ));
    }

    #[tokio::test]
    async fn test_verify_detects_edge_mismatch() {
        let storage = Arc::new(MemoryStorage::new());
        let mut snapshot = Snapshot::new();
        storage.stage_wallet(&mut snapshot, &Wallet::new(addr("a"), None, "normal".into(), 0));
        storage.stage_wallet(
            &mut snapshot,
            &Wallet::new(addr("p"), Some(addr("a")), "normal".into(), 0),
        );
        storage.commit(snapshot).unwrap();
        store_edges(&storage, &[edge("p", "x", 0)]);

        let resolver = HierarchyResolver::new(storage.clone());
        assert!(matches!(
            resolver.verify(&addr("p")).await,
            Err(LedgerError::HierarchyCorruption { .. })
        ));

        store_edges(&storage, &[edge("p", "a", 0)]);
        assert_eq!(resolver.verify(&addr("p")).await.unwrap(), 1);
        assert_eq!(resolver.verify(&addr("a")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_verify_detects_parent_loop() {
        let storage = Arc::new(MemoryStorage::new());
        let mut snapshot = Snapshot::new();
        storage.stage_wallet(
            &mut snapshot,
            &Wallet::new(addr("a"), Some(addr("b")), "normal".into(), 0),
        );
        storage.stage_wallet(
            &mut snapshot,
            &Wallet::new(addr("b"), Some(addr("a")), "normal".into(), 0),
        );
        storage.commit(snapshot).unwrap();
        store_edges(&storage, &[edge("a", "b", 0)]);

        let resolver = HierarchyResolver::new(storage.clone());
        match resolver.verify(&addr("a")).await {
            Err(LedgerError::HierarchyCorruption { wallet, reason }) => {
                assert_eq!(wallet, addr("a"));
                assert!(reason.contains("loops back"), "{}", reason);
            }
            other => panic!("expected hierarchy corruption, got {:?}", other),
        }
    }
}
