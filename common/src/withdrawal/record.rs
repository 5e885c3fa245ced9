use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::{WithdrawalError, WithdrawalResult};
use crate::{
    account::Amount,
    config::COIN_VALUE,
    crypto::{hash, Address, Hash},
    referral::Rate,
    serializer::{Reader, ReaderError, Serializer, Writer},
    time::TimestampMillis,
};

// Maximum length of a settlement reference or rejection reason
pub const MAX_NOTE_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Processing, Completed)
                | (Pending, Rejected)
                | (Processing, Rejected)
        )
    }

    fn id(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed => 2,
            Self::Rejected => 3,
        }
    }
}

impl Serializer for WithdrawalStatus {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(self.id());
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => Self::Pending,
            1 => Self::Processing,
            2 => Self::Completed,
            3 => Self::Rejected,
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1
    }
}

/// Inbound withdrawal request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub wallet: Address,
    pub amount: Amount,
    /// USD price of one whole token, supplied by the price oracle
    pub current_token_price: Decimal,
    pub burn_rate: Rate,
}

impl WithdrawalRequest {
    /// USD value of the requested amount
    pub fn amount_usd(&self) -> WithdrawalResult<Decimal> {
        if self.current_token_price.is_sign_negative() {
            return Err(WithdrawalError::InvalidPrice(self.current_token_price));
        }

        Decimal::from(self.amount)
            .checked_div(Decimal::from(COIN_VALUE))
            .and_then(|tokens| tokens.checked_mul(self.current_token_price))
            .ok_or(WithdrawalError::Overflow)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approve {
        #[serde(default)]
        settlement_ref: Option<String>,
    },
    Reject {
        reason: String,
    },
}

/// Admin action on a withdrawal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminDecision {
    pub withdrawal_id: Hash,
    #[serde(flatten)]
    pub decision: Decision,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WithdrawalRecord {
    pub id: Hash,
    pub wallet: Address,
    /// Amount held from the balance at request time
    pub amount: Amount,
    pub burn_rate: Rate,
    pub burn_amount: Amount,
    /// `amount - burn_amount`
    pub net_amount: Amount,
    pub amount_usd: Decimal,
    pub token_price: Decimal,
    pub status: WithdrawalStatus,
    pub settlement_ref: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: TimestampMillis,
    pub processing_at: Option<TimestampMillis>,
    /// Set when the record reaches a terminal state
    pub completed_at: Option<TimestampMillis>,
}

impl WithdrawalRecord {
    pub fn pending(
        id: Hash,
        request: &WithdrawalRequest,
        amount_usd: Decimal,
        created_at: TimestampMillis,
    ) -> Self {
        let burn_amount = request.burn_rate.apply(request.amount);
        Self {
            id,
            wallet: request.wallet.clone(),
            amount: request.amount,
            burn_rate: request.burn_rate,
            burn_amount,
            net_amount: request.amount - burn_amount,
            amount_usd,
            token_price: request.current_token_price,
            status: WithdrawalStatus::Pending,
            settlement_ref: None,
            rejection_reason: None,
            created_at,
            processing_at: None,
            completed_at: None,
        }
    }

    /// Unique id from the request and 16 random bytes
    pub fn generate_id(wallet: &Address, amount: Amount, created_at: TimestampMillis) -> Hash {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut buffer = wallet.to_bytes();
        buffer.extend_from_slice(&amount.to_be_bytes());
        buffer.extend_from_slice(&created_at.to_be_bytes());
        buffer.extend_from_slice(&nonce);
        hash(&buffer)
    }

    fn transition(&mut self, to: WithdrawalStatus) -> WithdrawalResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(WithdrawalError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn mark_processing(&mut self, at: TimestampMillis) -> WithdrawalResult<()> {
        self.transition(WithdrawalStatus::Processing)?;
        self.processing_at = Some(at);
        Ok(())
    }

    pub fn complete(
        &mut self,
        settlement_ref: Option<String>,
        at: TimestampMillis,
    ) -> WithdrawalResult<()> {
        if let Some(reference) = settlement_ref.as_deref() {
            check_note(reference)?;
        }
        self.transition(WithdrawalStatus::Completed)?;
        self.settlement_ref = settlement_ref;
        self.completed_at = Some(at);
        Ok(())
    }

    pub fn reject(&mut self, reason: String, at: TimestampMillis) -> WithdrawalResult<()> {
        if reason.trim().is_empty() {
            return Err(WithdrawalError::MissingReason);
        }
        check_note(&reason)?;
        self.transition(WithdrawalStatus::Rejected)?;
        self.rejection_reason = Some(reason);
        self.completed_at = Some(at);
        Ok(())
    }
}

fn check_note(note: &str) -> WithdrawalResult<()> {
    if note.len() > MAX_NOTE_LEN {
        return Err(WithdrawalError::NoteTooLong {
            len: note.len(),
            max: MAX_NOTE_LEN,
        });
    }
    Ok(())
}

impl Serializer for WithdrawalRecord {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let id = Hash::read(reader)?;
        let wallet = Address::read(reader)?;
        let amount = Amount::read(reader)?;
        let burn_rate = Rate::read(reader)?;
        let burn_amount = Amount::read(reader)?;
        let net_amount = Amount::read(reader)?;
        let amount_usd = Decimal::read(reader)?;
        let token_price = Decimal::read(reader)?;
        let status = WithdrawalStatus::read(reader)?;
        let settlement_ref = Option::<String>::read(reader)?;
        let rejection_reason = Option::<String>::read(reader)?;
        let created_at = TimestampMillis::read(reader)?;
        let processing_at = Option::<TimestampMillis>::read(reader)?;
        let completed_at = Option::<TimestampMillis>::read(reader)?;

        Ok(Self {
            id,
            wallet,
            amount,
            burn_rate,
            burn_amount,
            net_amount,
            amount_usd,
            token_price,
            status,
            settlement_ref,
            rejection_reason,
            created_at,
            processing_at,
            completed_at,
        })
    }

    fn write(&self, writer: &mut Writer) {
        self.id.write(writer);
        self.wallet.write(writer);
        self.amount.write(writer);
        self.burn_rate.write(writer);
        self.burn_amount.write(writer);
        self.net_amount.write(writer);
        self.amount_usd.write(writer);
        self.token_price.write(writer);
        self.status.write(writer);
        self.settlement_ref.write(writer);
        self.rejection_reason.write(writer);
        self.created_at.write(writer);
        self.processing_at.write(writer);
        self.completed_at.write(writer);
    }
}
