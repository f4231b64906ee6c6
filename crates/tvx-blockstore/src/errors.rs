//! Typed store errors, recoverable through `anyhow::Error::downcast_ref`.

use std::fmt;

use cid::Cid;

/// An object was required but is not present in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingObject {
    pub cid: Cid,
}

impl fmt::Display for MissingObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object {} not found in block store", self.cid)
    }
}

impl std::error::Error for MissingObject {}

/// Fetched bytes do not hash to the identifier they were requested under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashMismatch {
    pub cid: Cid,
}

impl fmt::Display for HashMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetched bytes for {} do not match its multihash", self.cid)
    }
}

impl std::error::Error for HashMismatch {}
