use std::{fmt, str::FromStr};

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer as SerdeSerializer};
use thiserror::Error;

use crate::{
    config::MAX_IDENTIFIER_LEN,
    serializer::{Reader, ReaderError, Serializer, Writer},
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address is empty")]
    Empty,
    #[error("Address contains whitespace")]
    Whitespace,
    #[error("Address length {0} exceeds maximum {max}", max = MAX_IDENTIFIER_LEN)]
    TooLong(usize),
}

/// Wallet identifier.
///
/// Addresses are compared case-insensitively: the inner string is always
/// trimmed and lowercased at construction, so two spellings of the same
/// wallet map to the same ledger rows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(String);

impl Address {
    pub fn new(value: &str) -> Result<Self, AddressError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(AddressError::Empty);
        }

        if value.chars().any(char::is_whitespace) {
            return Err(AddressError::Whitespace);
        }

        if value.len() > MAX_IDENTIFIER_LEN {
            return Err(AddressError::TooLong(value.len()));
        }

        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Length-prefixed so no address is a key prefix of another one
    pub fn to_key(&self) -> Vec<u8> {
        self.to_bytes()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serializer for Address {
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

impl Serialize for Address {
    fn serialize<S: SerdeSerializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::new(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive() {
        let a = Address::new("0xAbCdEf").unwrap();
        let b = Address::new("  0xabcdef ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabcdef");
        assert_eq!(a.to_key(), b.to_key());
    }

    #[test]
    fn test_invalid_addresses() {
        assert_eq!(Address::new("   "), Err(AddressError::Empty));
        assert_eq!(Address::new("0x ab"), Err(AddressError::Whitespace));
        let long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert_eq!(
            Address::new(&long),
            Err(AddressError::TooLong(MAX_IDENTIFIER_LEN + 1))
        );
    }

    #[test]
    fn test_key_is_not_prefix_of_longer_address() {
        let short = Address::new("0xab").unwrap().to_key();
        let long = Address::new("0xabc").unwrap().to_key();
        assert!(!long.starts_with(&short));
    }

    #[test]
    fn test_serde_normalizes() {
        let address: Address = serde_json::from_str("\"0XFF\"").unwrap();
        assert_eq!(serde_json::to_string(&address).unwrap(), "\"0xff\"");
        assert!(serde_json::from_str::<Address>("\"\"").is_err());
    }
}
