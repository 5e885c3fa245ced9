// Ledger-wide constants

// Native token decimals
pub const COIN_DECIMALS: u8 = 8;
// 10^8 atomic units = 1 token
pub const COIN_VALUE: u64 = 10u64.pow(COIN_DECIMALS as u32);

// 10000 basis points = 100%
pub const BASIS_POINTS: u32 = 10_000;

// Maximum depth of the referral hierarchy that is stored and resolved
pub const MAX_UPLINE_LEVELS: u8 = 100;

// Maximum number of direct referrals returned per page
pub const MAX_DIRECT_REFERRALS_PER_PAGE: u32 = 1000;

// Maximum number of history rows returned per query
pub const MAX_HISTORY_PAGE_SIZE: usize = 1000;

// Minimum withdrawal value in USD
pub const DEFAULT_MIN_WITHDRAWAL_USD: u64 = 10;

// Maximum length in bytes of any wallet address or purchase id
pub const MAX_IDENTIFIER_LEN: usize = 128;
