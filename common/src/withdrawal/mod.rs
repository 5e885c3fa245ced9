// Withdrawal records and their state machine
//
// pending -> processing -> completed
// pending | processing -> rejected

mod error;
mod record;

pub use error::*;
pub use record::*;
