// Referral commission types
//
// - Member tiers with guaranteed base rates and a total commission budget
// - Per-wallet effective rates resolved into a rate schedule
// - Hierarchy edges (denormalized ancestors, up to 100 levels)
// - Commission records and purchase receipts

mod error;
mod level;
mod record;

pub use error::*;
pub use level::*;
pub use record::*;

pub use crate::config::{MAX_DIRECT_REFERRALS_PER_PAGE, MAX_UPLINE_LEVELS};
