mod wallet;

pub use wallet::*;

// Token amount in atomic units
pub type Amount = u64;
