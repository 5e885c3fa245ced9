// Typed access to the ledger columns.
//
// Each provider is implemented once for every `ColumnStore`, so RocksDB and
// the in-memory backend share the same key layout and encoding.

mod commission;
mod hierarchy;
mod level;
mod settings;
mod wallet;
mod withdrawal;

pub use commission::CommissionProvider;
pub use hierarchy::HierarchyProvider;
pub use level::MemberLevelProvider;
pub use settings::CommissionSettingsProvider;
pub use wallet::WalletProvider;
pub use withdrawal::WithdrawalProvider;
