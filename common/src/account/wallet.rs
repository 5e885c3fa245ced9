use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Amount;
use crate::{
    crypto::Address,
    serializer::{Reader, ReaderError, Serializer, Writer},
    time::TimestampMillis,
};

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum BalanceError {
    #[error("Insufficient balance: need {needed}, have {available}")]
    Insufficient { needed: Amount, available: Amount },
    #[error("Balance overflow")]
    Overflow,
}

/// Ledger state of one wallet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    pub address: Address,

    /// Direct referrer, immutable once set. None for root wallets
    pub parent: Option<Address>,

    pub member_tier: String,

    pub balance: Amount,

    pub total_earnings: Amount,

    pub total_withdrawn: Amount,

    /// Cached count of direct referrals
    pub direct_referrals_count: u32,

    /// Cached count of all descendants
    pub team_size: u64,

    pub created_at: TimestampMillis,
}

impl Wallet {
    pub fn new(
        address: Address,
        parent: Option<Address>,
        member_tier: String,
        created_at: TimestampMillis,
    ) -> Self {
        Self {
            address,
            parent,
            member_tier,
            balance: 0,
            total_earnings: 0,
            total_withdrawn: 0,
            direct_referrals_count: 0,
            team_size: 0,
            created_at,
        }
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Commission credit: balance and total earnings move together
    pub fn credit(&mut self, amount: Amount) -> Result<(), BalanceError> {
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or(BalanceError::Overflow)?;
        let total_earnings = self
            .total_earnings
            .checked_add(amount)
            .ok_or(BalanceError::Overflow)?;

        self.balance = balance;
        self.total_earnings = total_earnings;
        Ok(())
    }

    /// Withdrawal hold, the balance never goes below zero
    pub fn debit(&mut self, amount: Amount) -> Result<(), BalanceError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(BalanceError::Insufficient {
                needed: amount,
                available: self.balance,
            })?;
        Ok(())
    }

    /// Give back a held amount without touching the earnings counter
    pub fn refund(&mut self, amount: Amount) -> Result<(), BalanceError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(BalanceError::Overflow)?;
        Ok(())
    }

    pub fn record_withdrawn(&mut self, amount: Amount) -> Result<(), BalanceError> {
        self.total_withdrawn = self
            .total_withdrawn
            .checked_add(amount)
            .ok_or(BalanceError::Overflow)?;
        Ok(())
    }

    pub fn increment_direct_count(&mut self) {
        self.direct_referrals_count = self.direct_referrals_count.saturating_add(1);
    }

    pub fn increment_team_size(&mut self, delta: u64) {
        self.team_size = self.team_size.saturating_add(delta);
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            wallet: self.address.clone(),
            balance: self.balance,
            total_earnings: self.total_earnings,
            total_withdrawn: self.total_withdrawn,
            member_tier: self.member_tier.clone(),
        }
    }
}

impl Serializer for Wallet {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let address = Address::read(reader)?;
        let parent = Option::<Address>::read(reader)?;
        let member_tier = String::read(reader)?;
        let balance = Amount::read(reader)?;
        let total_earnings = Amount::read(reader)?;
        let total_withdrawn = Amount::read(reader)?;
        let direct_referrals_count = u32::read(reader)?;
        let team_size = u64::read(reader)?;
        let created_at = TimestampMillis::read(reader)?;

        Ok(Self {
            address,
            parent,
            member_tier,
            balance,
            total_earnings,
            total_withdrawn,
            direct_referrals_count,
            team_size,
            created_at,
        })
    }

    fn write(&self, writer: &mut Writer) {
        self.address.write(writer);
        self.parent.write(writer);
        self.member_tier.write(writer);
        self.balance.write(writer);
        self.total_earnings.write(writer);
        self.total_withdrawn.write(writer);
        self.direct_referrals_count.write(writer);
        self.team_size.write(writer);
        self.created_at.write(writer);
    }

    fn size(&self) -> usize {
        self.address.size()
            + self.parent.size()
            + self.member_tier.size()
            + self.balance.size()
            + self.total_earnings.size()
            + self.total_withdrawn.size()
            + self.direct_referrals_count.size()
            + self.team_size.size()
            + self.created_at.size()
    }
}

/// Outbound view of a wallet for reporting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletSnapshot {
    pub wallet: Address,
    pub balance: Amount,
    pub total_earnings: Amount,
    pub total_withdrawn: Amount,
    pub member_tier: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> Wallet {
        Wallet::new(
            Address::new("0xabc").unwrap(),
            Some(Address::new("0xdef").unwrap()),
            "normal".into(),
            1,
        )
    }

    #[test]
    fn test_credit_and_debit() {
        let mut w = wallet();
        w.credit(100).unwrap();
        assert_eq!(w.balance, 100);
        assert_eq!(w.total_earnings, 100);

        w.debit(40).unwrap();
        assert_eq!(w.balance, 60);
        assert_eq!(w.total_earnings, 100);

        assert_eq!(
            w.debit(61),
            Err(BalanceError::Insufficient {
                needed: 61,
                available: 60
            })
        );
        assert_eq!(w.balance, 60);

        w.refund(40).unwrap();
        assert_eq!(w.balance, 100);
        assert_eq!(w.total_earnings, 100);
    }

    #[test]
    fn test_credit_overflow_leaves_wallet_untouched() {
        let mut w = wallet();
        w.balance = Amount::MAX;
        assert_eq!(w.credit(1), Err(BalanceError::Overflow));
        assert_eq!(w.balance, Amount::MAX);
        assert_eq!(w.total_earnings, 0);
    }

    #[test]
    fn test_serialization_size() {
        let mut w = wallet();
        w.increment_direct_count();
        w.increment_team_size(3);
        let bytes = w.to_bytes();
        assert_eq!(bytes.len(), w.size());
        assert_eq!(Wallet::from_bytes(&bytes).unwrap(), w);
    }
}
