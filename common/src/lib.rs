pub mod account;
pub mod config;
pub mod crypto;
pub mod referral;
pub mod serializer;
pub mod time;
pub mod withdrawal;

#[cfg(feature = "logger")]
pub mod logger;

// Re-export the decimal type used for prices and USD amounts
pub use rust_decimal;
