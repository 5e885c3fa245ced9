use rust_decimal::Decimal;
use thiserror::Error;

use super::WithdrawalStatus;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WithdrawalError {
    #[error("Withdrawal amount must be greater than zero")]
    InvalidAmount,

    #[error("Invalid token price {0}")]
    InvalidPrice(Decimal),

    #[error("Burn rate {0} bps exceeds 10000 (100%)")]
    InvalidBurnRate(u32),

    #[error("Withdrawal value {amount_usd} USD is below the minimum of {minimum} USD")]
    BelowMinimum { amount_usd: Decimal, minimum: Decimal },

    #[error("Invalid withdrawal transition from {from} to {to}")]
    InvalidTransition {
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    },

    #[error("A rejection reason is required")]
    MissingReason,

    #[error("Note of {len} bytes exceeds maximum {max}")]
    NoteTooLong { len: usize, max: usize },

    #[error("Withdrawal value overflow")]
    Overflow,
}

pub type WithdrawalResult<T> = Result<T, WithdrawalError>;
