use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Well-known memo program used to tag access records on the shared ledger.
pub const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TyNhLJq11hqqMrvv4HXeXt";

/// 32-byte ledger address (public key or program id), rendered in base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The default memo program.
    pub fn memo_program() -> Self {
        MEMO_PROGRAM_ID
            .parse()
            .unwrap_or(Self([0u8; 32]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address is not valid base58: {0}")]
    Encoding(String),
    #[error("address must decode to 32 bytes, got {0}")]
    Length(usize),
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|e| AddressError::Encoding(e.to_string()))?;
        let len = bytes.len();
        let array: [u8; 32] = bytes.try_into().map_err(|_| AddressError::Length(len))?;
        Ok(Self(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memo_program_parses() {
        let memo = Address::memo_program();
        assert_ne!(memo.as_bytes(), &[0u8; 32]);
        assert_eq!(memo.to_string(), MEMO_PROGRAM_ID);
    }

    #[test]
    fn rejects_wrong_length() {
        let short = bs58::encode([1u8; 16]).into_string();
        assert_eq!(short.parse::<Address>(), Err(AddressError::Length(16)));
    }

    #[test]
    fn rejects_non_base58() {
        assert!(matches!(
            "not-base58-0OIl".parse::<Address>(),
            Err(AddressError::Encoding(_))
        ));
    }

    #[test]
    fn serde_roundtrip_uses_base58() {
        let addr = Address::from_bytes([7u8; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
