//! In-memory block store.

use std::collections::HashMap;

use anyhow::Result;
use cid::Cid;
use parking_lot::RwLock;

use crate::Blockstore;

/// Thread-safe in-memory store backed by a `HashMap` under an `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryBlockstore {
    blocks: RwLock<HashMap<Cid, Vec<u8>>>,
}

impl MemoryBlockstore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// Remove an object, returning its bytes if it was present.
    pub fn remove(&self, cid: &Cid) -> Option<Vec<u8>> {
        self.blocks.write().remove(cid)
    }

    /// All identifiers currently stored, in no particular order.
    pub fn cids(&self) -> Vec<Cid> {
        self.blocks.read().keys().copied().collect()
    }
}

impl Blockstore for MemoryBlockstore {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
        Ok(self.blocks.read().get(cid).cloned())
    }

    fn put_keyed(&self, cid: &Cid, data: &[u8]) -> Result<()> {
        self.blocks
            .write()
            .entry(*cid)
            .or_insert_with(|| data.to_vec());
        Ok(())
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.blocks.read().contains_key(cid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cid_for, RAW};

    #[test]
    fn test_memory_store_basic_ops() -> Result<()> {
        let store = MemoryBlockstore::new();
        assert!(store.is_empty());

        let cid = store.put(RAW, b"hello")?;
        assert_eq!(store.get(&cid)?, Some(b"hello".to_vec()));
        assert_eq!(store.len(), 1);

        // Re-putting the same object is a no-op.
        store.put(RAW, b"hello")?;
        assert_eq!(store.len(), 1);

        assert_eq!(store.remove(&cid), Some(b"hello".to_vec()));
        assert!(!store.has(&cid)?);
        assert_eq!(store.get(&cid_for(RAW, b"other"))?, None);
        Ok(())
    }
}
