use std::time::Duration;

use nodeshare_common::{
    account::{Amount, BalanceError},
    crypto::{Address, Hash},
    referral::{PurchaseId, ReferralError},
    serializer::ReaderError,
    withdrawal::{WithdrawalError, WithdrawalStatus},
};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    // Cyclic or malformed parent chain, requires manual repair
    #[error("Hierarchy corruption detected for wallet {wallet}: {reason}")]
    HierarchyCorruption { wallet: Address, reason: String },

    // Missing or invalid tier configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    #[error("Withdrawal value {amount_usd} USD is below the minimum of {minimum} USD")]
    BelowMinimum { amount_usd: Decimal, minimum: Decimal },

    #[error("Invalid withdrawal transition from {from} to {to}")]
    InvalidTransition {
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(Amount),

    #[error("Wallet {0} not found")]
    UnknownWallet(Address),

    #[error("Withdrawal {0} not found")]
    UnknownWithdrawal(Hash),

    #[error("Could not acquire ledger locks within {0:?}")]
    LockTimeout(Duration),

    #[error("Purchase {purchase_id} could not be applied, nothing was written: {reason}")]
    PartialFailure {
        purchase_id: PurchaseId,
        reason: String,
    },

    #[error("Balance overflow")]
    Overflow,

    #[error(transparent)]
    Referral(ReferralError),

    #[error(transparent)]
    Withdrawal(WithdrawalError),

    #[error(transparent)]
    Serialization(#[from] ReaderError),

    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

impl LedgerError {
    /// Transient failure: the whole operation may be retried as one unit
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout(_) | Self::PartialFailure { .. } | Self::Any(_)
        )
    }

    /// Failure that must be escalated to operators instead of retried
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::HierarchyCorruption { .. } | Self::Configuration(_)
        )
    }

    pub fn corruption<S: Into<String>>(wallet: &Address, reason: S) -> Self {
        Self::HierarchyCorruption {
            wallet: wallet.clone(),
            reason: reason.into(),
        }
    }
}

impl From<ReferralError> for LedgerError {
    fn from(value: ReferralError) -> Self {
        match value {
            ReferralError::UnknownTier(_)
            | ReferralError::InvalidLevel { .. }
            | ReferralError::DuplicateTier(_) => Self::Configuration(value.to_string()),
            other => Self::Referral(other),
        }
    }
}

impl From<WithdrawalError> for LedgerError {
    fn from(value: WithdrawalError) -> Self {
        match value {
            WithdrawalError::BelowMinimum {
                amount_usd,
                minimum,
            } => Self::BelowMinimum {
                amount_usd,
                minimum,
            },
            WithdrawalError::InvalidTransition { from, to } => {
                Self::InvalidTransition { from, to }
            }
            WithdrawalError::Overflow => Self::Overflow,
            other => Self::Withdrawal(other),
        }
    }
}

impl From<BalanceError> for LedgerError {
    fn from(value: BalanceError) -> Self {
        match value {
            BalanceError::Insufficient { needed, available } => {
                Self::InsufficientBalance { needed, available }
            }
            BalanceError::Overflow => Self::Overflow,
        }
    }
}
