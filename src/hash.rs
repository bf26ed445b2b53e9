use std::fmt;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use crate::Error;

/// BLAKE2b with a 256-bit output
type Blake2b256 = Blake2b<U32>;

/// fixed-length identifier of an archive entry name
///
/// derived as BLAKE2b-256 over the UTF-8 bytes of the name. used as the key of
/// checksum tables so the serialized table size does not depend on path length.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SafeName([u8; 32]);

impl SafeName {
    /// derive the safe name of an entry name
    pub fn of(name: &str) -> Self {
        Self(Blake2b256::digest(name.as_bytes()).into())
    }

    /// parse from hex string
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidSafeName(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidSafeName(s.to_string()))?;
        Ok(Self(arr))
    }

    /// get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// convert to hex string (64 lowercase chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for SafeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for SafeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SafeName({})", &self.to_hex()[..12])
    }
}
