use async_trait::async_trait;
use log::trace;
use nodeshare_common::{
    crypto::Address,
    referral::{CommissionRecord, PurchaseId, PurchaseReceipt},
    serializer::Serializer,
};

use crate::core::{
    error::LedgerError,
    storage::{
        commission_by_recipient_key, commission_key, Column, ColumnStore, EntryState, Snapshot,
    },
};

#[async_trait]
pub trait CommissionProvider {
    async fn get_purchase_receipt(
        &self,
        purchase_id: &PurchaseId,
    ) -> Result<Option<PurchaseReceipt>, LedgerError>;

    async fn get_commission_record(
        &self,
        purchase_id: &PurchaseId,
        recipient: &Address,
    ) -> Result<Option<CommissionRecord>, LedgerError>;

    /// Most recent commission rows credited to a wallet, newest first
    async fn get_commission_history(
        &self,
        recipient: &Address,
        limit: usize,
    ) -> Result<Vec<CommissionRecord>, LedgerError>;

    /// Stage a commission row and its history index entry.
    /// Returns false if a row for the same purchase and recipient was already staged.
    fn stage_commission_record(&self, snapshot: &mut Snapshot, record: &CommissionRecord) -> bool;

    fn stage_purchase_receipt(&self, snapshot: &mut Snapshot, receipt: &PurchaseReceipt);
}

#[async_trait]
impl<S: ColumnStore> CommissionProvider for S {
    async fn get_purchase_receipt(
        &self,
        purchase_id: &PurchaseId,
    ) -> Result<Option<PurchaseReceipt>, LedgerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("get purchase receipt {}", purchase_id);
        }
        self.load_optional_from_disk(Column::AppliedPurchases, &purchase_id.to_key())
    }

    async fn get_commission_record(
        &self,
        purchase_id: &PurchaseId,
        recipient: &Address,
    ) -> Result<Option<CommissionRecord>, LedgerError> {
        self.load_optional_from_disk(
            Column::CommissionRecords,
            &commission_key(purchase_id, recipient),
        )
    }

    async fn get_commission_history(
        &self,
        recipient: &Address,
        limit: usize,
    ) -> Result<Vec<CommissionRecord>, LedgerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("get commission history of {}", recipient);
        }

        // keys sort by creation time, only the newest `limit` rows are decoded
        self.scan_prefix_raw(Column::CommissionsByRecipient, &recipient.to_key())?
            .into_iter()
            .rev()
            .take(limit)
            .map(|(_, value)| Ok(CommissionRecord::from_bytes(&value)?))
            .collect()
    }

    fn stage_commission_record(&self, snapshot: &mut Snapshot, record: &CommissionRecord) -> bool {
        let bytes = record.to_bytes();
        let previous = snapshot.put(
            Column::CommissionRecords,
            commission_key(&record.purchase_id, &record.recipient),
            bytes.clone(),
        );
        snapshot.put(
            Column::CommissionsByRecipient,
            commission_by_recipient_key(&record.recipient, record.created_at, &record.purchase_id),
            bytes,
        );

        matches!(previous, EntryState::Absent)
    }

    fn stage_purchase_receipt(&self, snapshot: &mut Snapshot, receipt: &PurchaseReceipt) {
        snapshot.put(
            Column::AppliedPurchases,
            receipt.purchase_id.to_key(),
            receipt.to_bytes(),
        );
    }
}
