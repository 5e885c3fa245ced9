use async_trait::async_trait;
use nodeshare_common::{referral::MemberLevelConfig, serializer::Serializer};

use crate::core::{
    error::LedgerError,
    storage::{tier_key, Column, ColumnStore, Snapshot},
};

#[async_trait]
pub trait MemberLevelProvider {
    /// All persisted tiers, ordered by name
    async fn get_member_levels(&self) -> Result<Vec<MemberLevelConfig>, LedgerError>;

    fn stage_member_level(&self, snapshot: &mut Snapshot, level: &MemberLevelConfig);
}

#[async_trait]
impl<S: ColumnStore> MemberLevelProvider for S {
    async fn get_member_levels(&self) -> Result<Vec<MemberLevelConfig>, LedgerError> {
        Ok(self
            .load_prefix_from_disk::<MemberLevelConfig>(Column::MemberLevels, &[])?
            .into_values()
            .collect())
    }

    fn stage_member_level(&self, snapshot: &mut Snapshot, level: &MemberLevelConfig) {
        snapshot.put(Column::MemberLevels, tier_key(&level.name), level.to_bytes());
    }
}
