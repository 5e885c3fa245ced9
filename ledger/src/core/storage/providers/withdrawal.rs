use async_trait::async_trait;
use log::trace;
use nodeshare_common::{
    crypto::{Address, Hash, HASH_SIZE},
    serializer::Serializer,
    withdrawal::WithdrawalRecord,
};

use crate::core::{
    error::LedgerError,
    storage::{withdrawal_by_wallet_key, Column, ColumnStore, Snapshot},
};

#[async_trait]
pub trait WithdrawalProvider {
    async fn get_withdrawal(&self, id: &Hash) -> Result<Option<WithdrawalRecord>, LedgerError>;

    /// Most recent withdrawals of a wallet, newest first
    async fn get_withdrawal_history(
        &self,
        wallet: &Address,
        limit: usize,
    ) -> Result<Vec<WithdrawalRecord>, LedgerError>;

    // Stage the record and its wallet index entry
    fn stage_withdrawal(&self, snapshot: &mut Snapshot, record: &WithdrawalRecord);
}

#[async_trait]
impl<S: ColumnStore> WithdrawalProvider for S {
    async fn get_withdrawal(&self, id: &Hash) -> Result<Option<WithdrawalRecord>, LedgerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("get withdrawal {}", id);
        }
        self.load_optional_from_disk(Column::Withdrawals, id.as_bytes())
    }

    async fn get_withdrawal_history(
        &self,
        wallet: &Address,
        limit: usize,
    ) -> Result<Vec<WithdrawalRecord>, LedgerError> {
        let entries = self.scan_prefix_raw(Column::WithdrawalsByWallet, &wallet.to_key())?;

        let mut records = Vec::new();
        for (key, _) in entries.into_iter().rev().take(limit) {
            // {wallet}{created_at}{id}, the id is the key suffix
            let Some(id_bytes) = key.len().checked_sub(HASH_SIZE).map(|start| &key[start..]) else {
                return Err(LedgerError::Any(anyhow::anyhow!(
                    "malformed withdrawal index key for {}",
                    wallet
                )));
            };
            let id = Hash::from_bytes(id_bytes)?;
            let record = self
                .get_withdrawal(&id)
                .await?
                .ok_or(LedgerError::UnknownWithdrawal(id))?;
            records.push(record);
        }

        Ok(records)
    }

    fn stage_withdrawal(&self, snapshot: &mut Snapshot, record: &WithdrawalRecord) {
        if log::log_enabled!(log::Level::Trace) {
            trace!("stage withdrawal {} as {}", record.id, record.status);
        }
        snapshot.put(
            Column::Withdrawals,
            record.id.as_bytes().to_vec(),
            record.to_bytes(),
        );
        snapshot.put(
            Column::WithdrawalsByWallet,
            withdrawal_by_wallet_key(&record.wallet, record.created_at, &record.id),
            Vec::new(),
        );
    }
}
