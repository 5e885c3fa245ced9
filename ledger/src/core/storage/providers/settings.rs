use async_trait::async_trait;
use nodeshare_common::{crypto::Address, referral::CommissionSettings, serializer::Serializer};

use crate::core::{
    error::LedgerError,
    storage::{Column, ColumnStore, Snapshot},
};

#[async_trait]
pub trait CommissionSettingsProvider {
    /// Effective level 1/2 rates configured for a wallet, if any
    async fn get_commission_settings(
        &self,
        wallet: &Address,
    ) -> Result<Option<CommissionSettings>, LedgerError>;

    fn stage_commission_settings(
        &self,
        snapshot: &mut Snapshot,
        wallet: &Address,
        settings: &CommissionSettings,
    );
}

#[async_trait]
impl<S: ColumnStore> CommissionSettingsProvider for S {
    async fn get_commission_settings(
        &self,
        wallet: &Address,
    ) -> Result<Option<CommissionSettings>, LedgerError> {
        self.load_optional_from_disk(Column::CommissionSettings, &wallet.to_key())
    }

    fn stage_commission_settings(
        &self,
        snapshot: &mut Snapshot,
        wallet: &Address,
        settings: &CommissionSettings,
    ) {
        snapshot.put(
            Column::CommissionSettings,
            wallet.to_key(),
            settings.to_bytes(),
        );
    }
}
