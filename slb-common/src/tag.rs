//! NFC tag identifiers
//!
//! Readers report the chip UID as raw bytes; the web side receives it as text
//! from forms and URLs. Both are normalized to one canonical form (uppercase
//! hex, no separators) so the two processes always agree on the record key.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical tag identifier (uppercase hex)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagId(String);

impl TagId {
    /// Parse a textual identifier
    ///
    /// Accepts upper or lower case hex, surrounding whitespace and `:`, `-`
    /// or space separators between bytes (`04:a1:b2:c3` becomes `04A1B2C3`).
    pub fn parse(input: &str) -> Result<Self> {
        let digits: String = input
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | ' '))
            .collect();

        if digits.is_empty() {
            return Err(Error::InvalidInput("empty tag identifier".to_string()));
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidInput(format!(
                "tag identifier must be hexadecimal: {:?}",
                input
            )));
        }
        if digits.len() % 2 != 0 {
            return Err(Error::InvalidInput(format!(
                "tag identifier must have an even number of hex digits: {:?}",
                input
            )));
        }

        Ok(Self(digits.to_ascii_uppercase()))
    }

    /// Build an identifier from the raw UID bytes returned by a reader
    pub fn from_bytes(uid: &[u8]) -> Result<Self> {
        if uid.is_empty() {
            return Err(Error::InvalidInput("empty tag UID".to_string()));
        }
        Ok(Self(uid.iter().map(|b| format!("{:02X}", b)).collect()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TagId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TagId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TagId> for String {
    fn from(id: TagId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical() {
        let id = TagId::parse("04A1B2C3").unwrap();
        assert_eq!(id.as_str(), "04A1B2C3");
    }

    #[test]
    fn test_parse_lowercase_is_uppercased() {
        // Readers format UIDs as lowercase hex
        let id = TagId::parse("04a1b2c3").unwrap();
        assert_eq!(id.as_str(), "04A1B2C3");
    }

    #[test]
    fn test_parse_with_separators() {
        assert_eq!(TagId::parse(" 04:a1:b2:c3 ").unwrap().as_str(), "04A1B2C3");
        assert_eq!(TagId::parse("04-A1-B2-C3").unwrap().as_str(), "04A1B2C3");
        assert_eq!(TagId::parse("04 A1 B2 C3").unwrap().as_str(), "04A1B2C3");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TagId::parse("").is_err());
        assert!(TagId::parse("   ").is_err());
        assert!(TagId::parse("04A1B2CZ").is_err());
        assert!(TagId::parse("04A1B2C").is_err()); // odd length
        assert!(TagId::parse("../etc").is_err());
    }

    #[test]
    fn test_from_bytes() {
        let id = TagId::from_bytes(&[0x04, 0xa1, 0xb2, 0xc3]).unwrap();
        assert_eq!(id, TagId::parse("04a1b2c3").unwrap());
        assert!(TagId::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_serde_normalizes() {
        let id: TagId = serde_json::from_str("\"04a1b2c3\"").unwrap();
        assert_eq!(id.as_str(), "04A1B2C3");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"04A1B2C3\"");
        assert!(serde_json::from_str::<TagId>("\"zz\"").is_err());
    }
}
