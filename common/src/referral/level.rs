// Member tiers and commission rates

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ReferralError, ReferralResult};
use crate::{
    account::Amount,
    config::{BASIS_POINTS, COIN_VALUE, MAX_UPLINE_LEVELS},
    serializer::{Reader, ReaderError, Serializer, Writer},
};

// Maximum length of a tier name
pub const MAX_TIER_NAME_LEN: usize = 64;

/// Rate expressed in basis points (100 = 1%, 10000 = 100%)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    pub const ZERO: Rate = Rate(0);
    pub const FULL: Rate = Rate(BASIS_POINTS);

    pub const fn from_bps(bps: u32) -> Self {
        Self(bps)
    }

    // Checked constructor, rejects anything above 100%
    pub fn new(bps: u32) -> ReferralResult<Self> {
        if bps > BASIS_POINTS {
            return Err(ReferralError::RateTooHigh(bps));
        }
        Ok(Self(bps))
    }

    pub const fn bps(&self) -> u32 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Apply the rate to an amount, rounding down to the atomic unit.
    /// The truncated remainder is discarded.
    pub fn apply(&self, amount: Amount) -> Amount {
        let value = (amount as u128 * self.0 as u128) / BASIS_POINTS as u128;
        Amount::try_from(value).unwrap_or(Amount::MAX)
    }

    pub fn checked_add(self, other: Rate) -> Option<Rate> {
        self.0.checked_add(other.0).map(Rate)
    }

    pub fn checked_sub(self, other: Rate) -> Option<Rate> {
        self.0.checked_sub(other.0).map(Rate)
    }

    pub fn saturating_sub(self, other: Rate) -> Rate {
        Rate(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

impl Serializer for Rate {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self(reader.read_u32()?))
    }

    fn size(&self) -> usize {
        4
    }
}

/// Commission rules for one member tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberLevelConfig {
    /// Tier name, lowercase
    pub name: String,

    /// Deepest upline level this tier takes part in
    pub max_depth: u8,

    /// Total commission flowing out of a purchase made at this tier
    pub total_commission: Rate,

    /// Guaranteed minimum rate for the direct parent
    pub base_level1: Rate,

    /// Guaranteed minimum rate for the grandparent
    pub base_level2: Rate,

    /// Rate paid once to the first qualifying ancestor beyond level 2
    #[serde(default)]
    pub passthrough_rate: Option<Rate>,

    /// Minimum holdings to qualify for this tier, in atomic units
    #[serde(default)]
    pub qualification_threshold: Amount,
}

impl MemberLevelConfig {
    pub fn new(
        name: &str,
        max_depth: u8,
        total_commission: Rate,
        base_level1: Rate,
        base_level2: Rate,
        passthrough_rate: Option<Rate>,
        qualification_threshold: Amount,
    ) -> Self {
        Self {
            name: normalize_tier_name(name),
            max_depth,
            total_commission,
            base_level1,
            base_level2,
            passthrough_rate,
            qualification_threshold,
        }
    }

    /// Sum of the guaranteed level 1 and level 2 rates
    pub fn guaranteed_base(&self) -> Rate {
        Rate(self.base_level1.0.saturating_add(self.base_level2.0))
    }

    /// Headroom above the guaranteed rates: `totalCommission - baseGuaranteedSum`
    pub fn extra_reward_right(&self) -> Rate {
        self.total_commission.saturating_sub(self.guaranteed_base())
    }

    /// Whether a member of this tier is paid for a purchase `depth` levels below
    pub fn covers_depth(&self, depth: u8) -> bool {
        depth >= 1 && depth <= self.max_depth
    }

    pub fn validate(&self) -> ReferralResult<()> {
        let invalid = |reason: String| ReferralError::InvalidLevel {
            tier: self.name.clone(),
            reason,
        };

        if self.name.is_empty() || self.name.len() > MAX_TIER_NAME_LEN {
            return Err(invalid(format!(
                "name must be between 1 and {} bytes",
                MAX_TIER_NAME_LEN
            )));
        }

        if self.name != normalize_tier_name(&self.name) {
            return Err(invalid("name must be lowercase without surrounding spaces".into()));
        }

        if self.max_depth == 0 || self.max_depth > MAX_UPLINE_LEVELS {
            return Err(invalid(format!(
                "max depth {} must be between 1 and {}",
                self.max_depth, MAX_UPLINE_LEVELS
            )));
        }

        if self.total_commission > Rate::FULL {
            return Err(ReferralError::RateTooHigh(self.total_commission.bps()));
        }

        if self.guaranteed_base() > self.total_commission {
            return Err(invalid(format!(
                "guaranteed base {} exceeds total commission {}",
                self.guaranteed_base(),
                self.total_commission
            )));
        }

        if let Some(passthrough) = self.passthrough_rate {
            if self.max_depth <= 2 {
                return Err(invalid(
                    "passthrough rate requires a max depth above 2".into(),
                ));
            }

            if passthrough > self.extra_reward_right() {
                return Err(invalid(format!(
                    "passthrough rate {} exceeds headroom {}",
                    passthrough,
                    self.extra_reward_right()
                )));
            }
        }

        Ok(())
    }
}

impl Serializer for MemberLevelConfig {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let name = String::read(reader)?;
        let max_depth = u8::read(reader)?;
        let total_commission = Rate::read(reader)?;
        let base_level1 = Rate::read(reader)?;
        let base_level2 = Rate::read(reader)?;
        let passthrough_rate = Option::<Rate>::read(reader)?;
        let qualification_threshold = Amount::read(reader)?;

        Ok(Self {
            name,
            max_depth,
            total_commission,
            base_level1,
            base_level2,
            passthrough_rate,
            qualification_threshold,
        })
    }

    fn write(&self, writer: &mut Writer) {
        self.name.write(writer);
        self.max_depth.write(writer);
        self.total_commission.write(writer);
        self.base_level1.write(writer);
        self.base_level2.write(writer);
        self.passthrough_rate.write(writer);
        self.qualification_threshold.write(writer);
    }

    fn size(&self) -> usize {
        self.name.size()
            + self.max_depth.size()
            + self.total_commission.size()
            + self.base_level1.size()
            + self.base_level2.size()
            + self.passthrough_rate.size()
            + self.qualification_threshold.size()
    }
}

pub fn normalize_tier_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Built-in tier table, guaranteed base of 3% / 2% on every tier
pub fn default_member_levels() -> Vec<MemberLevelConfig> {
    vec![
        MemberLevelConfig::new(
            "normal",
            2,
            Rate::from_bps(500),
            Rate::from_bps(300),
            Rate::from_bps(200),
            None,
            0,
        ),
        MemberLevelConfig::new(
            "market_partner",
            20,
            Rate::from_bps(1500),
            Rate::from_bps(300),
            Rate::from_bps(200),
            Some(Rate::from_bps(300)),
            10_000 * COIN_VALUE,
        ),
        MemberLevelConfig::new(
            "global_partner",
            100,
            Rate::from_bps(2000),
            Rate::from_bps(300),
            Rate::from_bps(200),
            Some(Rate::from_bps(500)),
            50_000 * COIN_VALUE,
        ),
    ]
}

/// Per-wallet override of the level 1 and level 2 rates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionSettings {
    pub level1_rate: Rate,
    pub level2_rate: Rate,
}

impl Serializer for CommissionSettings {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            level1_rate: Rate::read(reader)?,
            level2_rate: Rate::read(reader)?,
        })
    }

    fn write(&self, writer: &mut Writer) {
        self.level1_rate.write(writer);
        self.level2_rate.write(writer);
    }

    fn size(&self) -> usize {
        8
    }
}

/// Effective rates for one purchase.
///
/// Everything above the guaranteed base at levels 1 and 2, plus the
/// passthrough rate, is consumed from the tier's headroom. Whatever headroom
/// is left is retained by the purchaser as `self_rate`, so the four rates
/// always add up to the tier's total commission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateSchedule {
    pub level1: Rate,
    pub level2: Rate,
    pub passthrough: Rate,
    pub self_rate: Rate,
}

impl RateSchedule {
    pub fn resolve(
        level: &MemberLevelConfig,
        settings: Option<&CommissionSettings>,
    ) -> ReferralResult<Self> {
        let level1 = settings.map_or(level.base_level1, |s| s.level1_rate);
        let level2 = settings.map_or(level.base_level2, |s| s.level2_rate);

        let extra1 = level1
            .checked_sub(level.base_level1)
            .ok_or(ReferralError::RateBelowBase {
                level: 1,
                rate: level1.bps(),
                base: level.base_level1.bps(),
            })?;
        let extra2 = level2
            .checked_sub(level.base_level2)
            .ok_or(ReferralError::RateBelowBase {
                level: 2,
                rate: level2.bps(),
                base: level.base_level2.bps(),
            })?;

        let passthrough = level.passthrough_rate.unwrap_or(Rate::ZERO);
        let available = level.extra_reward_right();
        let consumed = extra1
            .checked_add(extra2)
            .and_then(|r| r.checked_add(passthrough))
            .unwrap_or(Rate::from_bps(u32::MAX));

        let self_rate = available
            .checked_sub(consumed)
            .ok_or_else(|| ReferralError::ExtraExceedsHeadroom {
                tier: level.name.clone(),
                requested: consumed.bps(),
                available: available.bps(),
            })?;

        Ok(Self {
            level1,
            level2,
            passthrough,
            self_rate,
        })
    }

    pub fn total(&self) -> Rate {
        Rate(
            self.level1
                .0
                .saturating_add(self.level2.0)
                .saturating_add(self.passthrough.0)
                .saturating_add(self.self_rate.0),
        )
    }
}
