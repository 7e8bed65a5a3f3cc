//! Strong type definitions for sessionkit.
//!
//! All identifiers are newtypes to prevent misuse at compile time. Binary
//! formats (CBOR) see raw integers and byte strings; human-readable formats
//! (JSON) see decimal strings for chain ids and `0x`-hex for everything else.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::crypto::keccak256;
use crate::error::CoreError;

/// Parse a `0x`-prefixed (or bare) hex string into a fixed-size array.
pub(crate) fn parse_hex_fixed<const N: usize>(s: &str) -> Result<[u8; N], CoreError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    bytes.as_slice().try_into().map_err(|_| {
        CoreError::DecodingError(format!("expected {} bytes, got {}", N, bytes.len()))
    })
}

/// Serde adapter for fixed-size byte arrays: `0x`-hex when human-readable,
/// a byte string otherwise.
pub(crate) mod hexbytes {
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        struct FixedVisitor<const N: usize>;

        impl<'de, const N: usize> Visitor<'de> for FixedVisitor<N> {
            type Value = [u8; N];

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} bytes as 0x-hex or a byte string", N)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                super::parse_hex_fixed(v).map_err(E::custom)
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                v.try_into().map_err(|_| E::invalid_length(v.len(), &self))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut out = [0u8; N];
                for (i, slot) in out.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(out)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(FixedVisitor::<N>)
        } else {
            deserializer.deserialize_bytes(FixedVisitor::<N>)
        }
    }
}

/// An EVM chain identifier.
///
/// Chain ids are used both for display and as exact-match keys, so they must
/// never pass through a lossy numeric representation. JSON carries them as
/// decimal strings; numbers are accepted on read only when they are exact
/// unsigned integers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Ethereum mainnet.
    pub const ETHEREUM: Self = Self(1);
    /// Base mainnet.
    pub const BASE: Self = Self(8453);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId({})", self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidChainId(s.to_string()));
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| CoreError::InvalidChainId(s.to_string()))
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0.to_string())
        } else {
            serializer.serialize_u64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChainIdVisitor;

        impl<'de> Visitor<'de> for ChainIdVisitor {
            type Value = ChainId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a chain id as a decimal string or unsigned integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ChainId(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(ChainId)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_any(ChainIdVisitor)
        } else {
            deserializer.deserialize_u64(ChainIdVisitor)
        }
    }
}

/// A 20-byte EVM address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(#[serde(with = "hexbytes")] pub [u8; 20]);

impl Address {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_fixed(s)
            .map(Self)
            .map_err(|_| CoreError::InvalidAddress(s.to_string()))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = CoreError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        slice
            .try_into()
            .map(Self)
            .map_err(|_| CoreError::InvalidAddress(hex::encode(slice)))
    }
}

/// A 4-byte function selector: the first four bytes of the keccak-256 hash of
/// a canonical function signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector(#[serde(with = "hexbytes")] pub [u8; 4]);

impl Selector {
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Compute the selector of a canonical signature such as
    /// `transfer(address,uint256)`.
    pub fn from_signature(signature: &str) -> Self {
        let hash = keccak256(signature.as_bytes());
        let mut out = [0u8; 4];
        out.copy_from_slice(&hash.0[..4]);
        Self(out)
    }

    /// Take the selector from the head of encoded calldata.
    ///
    /// Returns `None` when the calldata is shorter than a selector.
    pub fn from_call_data(data: &[u8]) -> Option<Self> {
        data.get(..4)
            .and_then(|head| head.try_into().ok())
            .map(Self)
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self.to_hex())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Selector {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_fixed(s)
            .map(Self)
            .map_err(|_| CoreError::InvalidSelector(s.to_string()))
    }
}

/// Identifies a smart-contract account: a chain and an address.
///
/// Stable for the lifetime of a session relationship; it is the primary key
/// under which session artifacts are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SmartAccountHandle {
    pub chain_id: ChainId,
    pub address: Address,
}

impl SmartAccountHandle {
    pub const fn new(chain_id: ChainId, address: Address) -> Self {
        Self { chain_id, address }
    }
}

impl fmt::Display for SmartAccountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.address)
    }
}

/// The token (and its chain) used to pay for submitted operations.
///
/// Passed through opaquely; this crate never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeeDesignation {
    pub token: Address,
    pub chain_id: ChainId,
}

impl FeeDesignation {
    pub const fn new(token: Address, chain_id: ChainId) -> Self {
        Self { token, chain_id }
    }
}

/// A 32-byte identifier of a submitted (pending) operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(#[serde(with = "hexbytes")] pub [u8; 32]);

impl OperationId {
    /// Create a new OperationId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        parse_hex_fixed(s).map(Self)
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl AsRef<[u8]> for OperationId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for OperationId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// How a permission is exercised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsageMode {
    /// Register the grant on-chain and run the actions in one submission.
    FirstActivation,
    /// Run the actions against an already-registered grant.
    SubsequentUse,
}

impl fmt::Display for UsageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageMode::FirstActivation => f.write_str("first-activation"),
            UsageMode::SubsequentUse => f.write_str("subsequent-use"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_json_is_string() {
        let json = serde_json::to_string(&ChainId::BASE).unwrap();
        assert_eq!(json, "\"8453\"");
    }

    #[test]
    fn test_chain_id_max_survives_json() {
        let id = ChainId(u64::MAX);
        let json = serde_json::to_string(&id).unwrap();
        let back: ChainId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_chain_id_accepts_exact_number() {
        let id: ChainId = serde_json::from_str("8453").unwrap();
        assert_eq!(id, ChainId::BASE);
    }

    #[test]
    fn test_chain_id_rejects_lossy_input() {
        assert!(serde_json::from_str::<ChainId>("8453.0").is_err());
        assert!(serde_json::from_str::<ChainId>("-1").is_err());
        assert!(serde_json::from_str::<ChainId>("\"+8453\"").is_err());
        assert!(serde_json::from_str::<ChainId>("\"0x2105\"").is_err());
    }

    #[test]
    fn test_chain_id_cbor_is_integer() {
        let mut buf = Vec::new();
        ciborium::into_writer(&ChainId(u64::MAX), &mut buf).unwrap();
        // major type 0, 8-byte argument
        assert_eq!(buf[0], 0x1b);
        let back: ChainId = ciborium::from_reader(&buf[..]).unwrap();
        assert_eq!(back, ChainId(u64::MAX));
    }

    #[test]
    fn test_address_parse_and_display() {
        let addr: Address = "0xCe219745Dc3439fB6892BFF2E7F69009DCb955C1".parse().unwrap();
        assert_eq!(addr.to_string(), "0xce219745dc3439fb6892bff2e7f69009dcb955c1");
        assert!("0x1234".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_json_roundtrip() {
        let addr = Address::from_bytes([0xab; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(20)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_selector_from_signature() {
        let selector = Selector::from_signature("transfer(address,uint256)");
        assert_eq!(selector.to_hex(), "0xa9059cbb");
    }

    #[test]
    fn test_selector_from_short_call_data() {
        assert_eq!(Selector::from_call_data(&[0xa9, 0x05, 0x9c]), None);
        assert_eq!(
            Selector::from_call_data(&[0xa9, 0x05, 0x9c, 0xbb, 0x00]),
            Some(Selector::from_bytes([0xa9, 0x05, 0x9c, 0xbb]))
        );
    }

    #[test]
    fn test_operation_id_hex_roundtrip() {
        let id = OperationId::from_bytes([0x42; 32]);
        let recovered = OperationId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
    }
}
