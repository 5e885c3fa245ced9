use indexmap::IndexMap;
use log::debug;
use nodeshare_common::{
    account::Amount,
    referral::{normalize_tier_name, MemberLevelConfig, ReferralError, ReferralResult},
};

/// Immutable tier table.
///
/// The engine never mutates a registry in place: an admin update builds a new
/// one with [`MemberLevelRegistry::with_level`] and swaps it in, so a purchase
/// always computes against one consistent table.
#[derive(Debug, Clone)]
pub struct MemberLevelRegistry {
    levels: IndexMap<String, MemberLevelConfig>,
}

impl MemberLevelRegistry {
    pub fn new<I: IntoIterator<Item = MemberLevelConfig>>(levels: I) -> ReferralResult<Self> {
        let mut map = IndexMap::new();
        for level in levels {
            level.validate()?;
            if map.contains_key(&level.name) {
                return Err(ReferralError::DuplicateTier(level.name));
            }
            map.insert(level.name.clone(), level);
        }

        if map.is_empty() {
            return Err(ReferralError::InvalidLevel {
                tier: String::new(),
                reason: "at least one member level is required".into(),
            });
        }

        Ok(Self { levels: map })
    }

    pub fn get(&self, tier: &str) -> ReferralResult<&MemberLevelConfig> {
        let name = normalize_tier_name(tier);
        self.levels
            .get(&name)
            .ok_or(ReferralError::UnknownTier(name))
    }

    pub fn contains(&self, tier: &str) -> bool {
        self.levels.contains_key(&normalize_tier_name(tier))
    }

    pub fn tiers(&self) -> impl Iterator<Item = &MemberLevelConfig> {
        self.levels.values()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Highest qualification threshold met by `holdings`.
    /// Advisory only: tier assignment belongs to the admin workflow.
    pub fn tier_for_holdings(&self, holdings: Amount) -> Option<&MemberLevelConfig> {
        self.levels
            .values()
            .filter(|level| level.qualification_threshold <= holdings)
            .max_by_key(|level| level.qualification_threshold)
    }

    /// New registry with `level` added or replaced
    pub fn with_level(&self, level: MemberLevelConfig) -> ReferralResult<Self> {
        level.validate()?;
        if log::log_enabled!(log::Level::Debug) {
            debug!("updating member level {}", level.name);
        }

        let mut levels = self.levels.clone();
        levels.insert(level.name.clone(), level);
        Ok(Self { levels })
    }
}
