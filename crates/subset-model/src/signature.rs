//! Content-addressed subset signatures
//!
//! Provides [`SubsetSignature`], a SHA-256 digest over a *set* of managed list
//! item ids. Two selections with the same members hash identically no matter
//! how they were ordered or how many times an id was repeated.

use crate::ids::ManagedListItemId;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Separator placed between item ids in the hashed payload
const ID_SEPARATOR: char = '|';

/// A 32-byte subset signature (SHA-256)
///
/// Identity key of a `SubsetDefinition` within its (project, list) scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubsetSignature([u8; 32]);

impl SubsetSignature {
    /// Create a signature from raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Build the signature of a selection of item ids
    ///
    /// Ids are deduplicated and sorted ascending, rendered as lowercase hex,
    /// joined with `|` and hashed.
    ///
    /// # Errors
    /// Returns [`SignatureError::EmptySelection`] if no ids are supplied
    pub fn build<I>(item_ids: I) -> Result<Self, SignatureError>
    where
        I: IntoIterator<Item = ManagedListItemId>,
    {
        let unique: BTreeSet<ManagedListItemId> = item_ids.into_iter().collect();
        if unique.is_empty() {
            return Err(SignatureError::EmptySelection);
        }

        let mut payload = String::with_capacity(unique.len() * 33);
        for (i, id) in unique.iter().enumerate() {
            if i > 0 {
                payload.push(ID_SEPARATOR);
            }
            payload.push_str(&id.as_uuid().simple().to_string());
        }

        let digest = Sha256::digest(payload.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Ok(Self(bytes))
    }

    /// Create signature from a byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for SubsetSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for SubsetSignature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl serde::Serialize for SubsetSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for SubsetSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when building or parsing signatures
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// A subset must contain at least one item
    #[error("cannot sign an empty selection")]
    EmptySelection,

    /// Invalid digest length
    #[error("invalid signature length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
