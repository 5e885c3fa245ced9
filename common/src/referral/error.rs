// Referral domain error types

use thiserror::Error;

/// Errors raised while validating referral data
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReferralError {
    /// A wallet references a tier with no registered config
    #[error("Unknown member tier '{0}'")]
    UnknownTier(String),

    /// A member level config failed validation
    #[error("Invalid member level '{tier}': {reason}")]
    InvalidLevel { tier: String, reason: String },

    /// Tier registered twice in the same table
    #[error("Member level '{0}' is defined more than once")]
    DuplicateTier(String),

    /// A configured rate is below the tier's guaranteed base
    #[error("Level {level} rate {rate} bps is below the guaranteed base {base} bps")]
    RateBelowBase { level: u8, rate: u32, base: u32 },

    /// Extra rates consume more than the tier's headroom
    #[error("Extra rates of {requested} bps exceed the {available} bps headroom of tier '{tier}'")]
    ExtraExceedsHeadroom {
        tier: String,
        requested: u32,
        available: u32,
    },

    /// Rate above 100%
    #[error("Rate {0} bps exceeds 10000 (100%)")]
    RateTooHigh(u32),

    /// Invalid wallet address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid purchase identifier
    #[error("Invalid purchase id: {0}")]
    InvalidPurchaseId(String),

    /// Referrer wallet is not registered
    #[error("Referrer not found")]
    ReferrerNotFound,

    /// Attempted to set self as referrer
    #[error("Cannot set self as referrer")]
    SelfReferral,

    /// Wallet already bound to a different referrer
    #[error("Wallet has already bound a referrer")]
    AlreadyBound,

    /// Detected circular reference in referral chain
    #[error("Circular reference detected in referral chain")]
    CircularReference,

    /// Page size exceeds maximum allowed
    #[error("Page size {requested} exceeds maximum {max}")]
    PageSizeTooLarge { max: u32, requested: u32 },
}

/// Result type for referral operations
pub type ReferralResult<T> = Result<T, ReferralError>;
