use async_trait::async_trait;
use log::trace;
use nodeshare_common::{account::Wallet, crypto::Address, serializer::Serializer};

use crate::core::{
    error::LedgerError,
    storage::{Column, ColumnStore, Snapshot},
};

#[async_trait]
pub trait WalletProvider {
    async fn get_wallet(&self, address: &Address) -> Result<Option<Wallet>, LedgerError>;

    async fn has_wallet(&self, address: &Address) -> Result<bool, LedgerError>;

    // Stage a full wallet row
    fn stage_wallet(&self, snapshot: &mut Snapshot, wallet: &Wallet);
}

#[async_trait]
impl<S: ColumnStore> WalletProvider for S {
    async fn get_wallet(&self, address: &Address) -> Result<Option<Wallet>, LedgerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("get wallet {}", address);
        }
        self.load_optional_from_disk(Column::Wallets, &address.to_key())
    }

    async fn has_wallet(&self, address: &Address) -> Result<bool, LedgerError> {
        self.contains_data(Column::Wallets, &address.to_key())
    }

    fn stage_wallet(&self, snapshot: &mut Snapshot, wallet: &Wallet) {
        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "stage wallet {} balance {}",
                wallet.address,
                wallet.balance
            );
        }
        snapshot.put(Column::Wallets, wallet.address.to_key(), wallet.to_bytes());
    }
}
