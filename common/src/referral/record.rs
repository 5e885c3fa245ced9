// Referral ledger data structures

use std::fmt;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer as SerdeSerializer};

use super::{ReferralError, ReferralResult};
use crate::{
    account::Amount,
    config::MAX_IDENTIFIER_LEN,
    crypto::Address,
    serializer::{Reader, ReaderError, Serializer, Writer},
    time::TimestampMillis,
};

/// Caller supplied identifier of a purchase event, the idempotency key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PurchaseId(String);

impl PurchaseId {
    pub fn new(value: &str) -> ReferralResult<Self> {
        let value = value.trim();
        if value.is_empty() || value.len() > MAX_IDENTIFIER_LEN {
            return Err(ReferralError::InvalidPurchaseId(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_key(&self) -> Vec<u8> {
        self.to_bytes()
    }
}

impl fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serializer for PurchaseId {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(self.0.len() as u8);
        writer.write_bytes(self.0.as_bytes());
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let size = reader.read_u8()? as usize;
        let value = reader.read_string_with_size(size)?;
        Self::new(&value).map_err(|_| ReaderError::InvalidValue)
    }

    fn size(&self) -> usize {
        1 + self.0.len()
    }
}

impl Serialize for PurchaseId {
    fn serialize<S: SerdeSerializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PurchaseId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::new(&value).map_err(D::Error::custom)
    }
}

/// Denormalized ancestor relation.
/// Depth 0 is the direct parent, depth `n` the parent's depth `n - 1` ancestor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HierarchyEdge {
    pub wallet: Address,
    pub ancestor: Address,
    pub depth: u8,
}

/// One resolved upline entry, depth starting at 1 for the direct parent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UplineEntry {
    pub ancestor: Address,
    pub depth: u8,
}

impl From<&HierarchyEdge> for UplineEntry {
    fn from(edge: &HierarchyEdge) -> Self {
        Self {
            ancestor: edge.ancestor.clone(),
            depth: edge.depth.saturating_add(1),
        }
    }
}

/// Why a wallet was credited from a purchase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommissionKind {
    // Unused headroom kept by the purchaser
    SelfRetention,
    // Level 1
    Direct,
    // Level 2
    Indirect,
    // First qualifying ancestor beyond level 2
    Passthrough,
}

impl CommissionKind {
    pub fn id(&self) -> u8 {
        match self {
            Self::SelfRetention => 0,
            Self::Direct => 1,
            Self::Indirect => 2,
            Self::Passthrough => 3,
        }
    }
}

impl Serializer for CommissionKind {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(self.id());
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => Self::SelfRetention,
            1 => Self::Direct,
            2 => Self::Indirect,
            3 => Self::Passthrough,
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1
    }
}

/// A single credit computed for a purchase.
/// `level` is the depth of the recipient above the purchaser, 0 for self retention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionDistribution {
    pub recipient: Address,
    pub amount: Amount,
    pub level: u8,
    pub kind: CommissionKind,
}

impl Serializer for CommissionDistribution {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            recipient: Address::read(reader)?,
            amount: Amount::read(reader)?,
            level: u8::read(reader)?,
            kind: CommissionKind::read(reader)?,
        })
    }

    fn write(&self, writer: &mut Writer) {
        self.recipient.write(writer);
        self.amount.write(writer);
        self.level.write(writer);
        self.kind.write(writer);
    }

    fn size(&self) -> usize {
        self.recipient.size() + self.amount.size() + self.level.size() + self.kind.size()
    }
}

/// Immutable ledger line, unique per (purchase, recipient)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionRecord {
    pub purchase_id: PurchaseId,
    pub recipient: Address,
    /// The purchaser
    pub source: Address,
    pub amount: Amount,
    pub level: u8,
    pub kind: CommissionKind,
    pub created_at: TimestampMillis,
}

impl CommissionRecord {
    pub fn new(
        purchase_id: PurchaseId,
        source: Address,
        distribution: &CommissionDistribution,
        created_at: TimestampMillis,
    ) -> Self {
        Self {
            purchase_id,
            recipient: distribution.recipient.clone(),
            source,
            amount: distribution.amount,
            level: distribution.level,
            kind: distribution.kind,
            created_at,
        }
    }
}

impl Serializer for CommissionRecord {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let purchase_id = PurchaseId::read(reader)?;
        let recipient = Address::read(reader)?;
        let source = Address::read(reader)?;
        let amount = Amount::read(reader)?;
        let level = u8::read(reader)?;
        let kind = CommissionKind::read(reader)?;
        let created_at = TimestampMillis::read(reader)?;

        Ok(Self {
            purchase_id,
            recipient,
            source,
            amount,
            level,
            kind,
            created_at,
        })
    }

    fn write(&self, writer: &mut Writer) {
        self.purchase_id.write(writer);
        self.recipient.write(writer);
        self.source.write(writer);
        self.amount.write(writer);
        self.level.write(writer);
        self.kind.write(writer);
        self.created_at.write(writer);
    }

    fn size(&self) -> usize {
        self.purchase_id.size()
            + self.recipient.size()
            + self.source.size()
            + self.amount.size()
            + self.level.size()
            + self.kind.size()
            + self.created_at.size()
    }
}

/// Inbound purchase event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurchaseEvent {
    pub purchase_id: PurchaseId,
    pub purchaser: Address,
    pub amount: Amount,
    pub purchaser_tier: String,
}

/// Stored once a purchase has been applied, marks it as processed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub purchase_id: PurchaseId,
    pub purchaser: Address,
    pub amount: Amount,
    pub tier: String,
    /// Sum of all credits, self retention included
    pub distributed: Amount,
    /// Amounts computed but not paid because no eligible recipient exists
    pub cut: Amount,
    pub distributions: Vec<CommissionDistribution>,
    pub applied_at: TimestampMillis,
}

impl Serializer for PurchaseReceipt {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let purchase_id = PurchaseId::read(reader)?;
        let purchaser = Address::read(reader)?;
        let amount = Amount::read(reader)?;
        let tier = String::read(reader)?;
        let distributed = Amount::read(reader)?;
        let cut = Amount::read(reader)?;
        let distributions = Vec::read(reader)?;
        let applied_at = TimestampMillis::read(reader)?;

        Ok(Self {
            purchase_id,
            purchaser,
            amount,
            tier,
            distributed,
            cut,
            distributions,
            applied_at,
        })
    }

    fn write(&self, writer: &mut Writer) {
        self.purchase_id.write(writer);
        self.purchaser.write(writer);
        self.amount.write(writer);
        self.tier.write(writer);
        self.distributed.write(writer);
        self.cut.write(writer);
        self.distributions.write(writer);
        self.applied_at.write(writer);
    }
}

/// Page of direct referrals
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectReferralsResult {
    pub referrals: Vec<Address>,
    pub total_count: u32,
    pub offset: u32,
    pub has_more: bool,
}
