//! Content-addressed block stores.
//!
//! - [`Blockstore`]: the store trait every engine reads state through
//! - [`MemoryBlockstore`]: in-memory store, used for replay and tests
//! - [`TracingBlockstore`]: records every identifier read or written while a
//!   [`TracingSession`] is open
//! - [`ProxyingBlockstore`]: read-through store that fills misses from an
//!   [`ObjectFetcher`](tvx_types::ObjectFetcher)
//! - [`dagcbor`] and [`car`]: the encodings needed to walk and archive state

pub mod car;
pub mod dagcbor;
pub mod errors;
pub mod memory;
pub mod metrics;
pub mod proxy;
pub mod traced;

use std::sync::Arc;

use anyhow::Result;
use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};

pub use errors::{HashMismatch, MissingObject};
pub use memory::MemoryBlockstore;
pub use metrics::{StoreMetrics, StoreMetricsSnapshot};
pub use proxy::ProxyingBlockstore;
pub use traced::{Tracing, TracingBlockstore, TracingSession};

/// Multicodec for DAG-CBOR blocks.
pub const DAG_CBOR: u64 = 0x71;
/// Multicodec for raw blocks.
pub const RAW: u64 = 0x55;
/// Piece commitment (unsealed sector data). Never resolvable in a block store.
pub const FIL_COMMITMENT_UNSEALED: u64 = 0xf101;
/// Sector commitment (sealed sector data). Never resolvable in a block store.
pub const FIL_COMMITMENT_SEALED: u64 = 0xf102;

/// CIDv1 with a blake2b-256 multihash, the chain's default object identifier.
pub fn cid_for(codec: u64, data: &[u8]) -> Cid {
    Cid::new_v1(codec, Code::Blake2b256.digest(data))
}

/// A content-addressed key/value store.
///
/// Implementations must be safe to share between an engine and the code
/// driving it, hence `Send + Sync` and `&self` methods throughout.
pub trait Blockstore: Send + Sync {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>>;

    /// Store `data` under an already computed identifier.
    fn put_keyed(&self, cid: &Cid, data: &[u8]) -> Result<()>;

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.get(cid)?.is_some())
    }

    /// Hash `data`, store it, and return its identifier.
    fn put(&self, codec: u64, data: &[u8]) -> Result<Cid> {
        let cid = cid_for(codec, data);
        self.put_keyed(&cid, data)?;
        Ok(cid)
    }

    /// Like [`Blockstore::get`], but a missing object is an error.
    fn get_required(&self, cid: &Cid) -> Result<Vec<u8>> {
        self.get(cid)?
            .ok_or_else(|| MissingObject { cid: *cid }.into())
    }

    /// Access-tracing capability. Only tracing stores return `Some`.
    fn tracing(&self) -> Option<&dyn Tracing> {
        None
    }
}

impl<T: Blockstore + ?Sized> Blockstore for Arc<T> {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
        (**self).get(cid)
    }

    fn put_keyed(&self, cid: &Cid, data: &[u8]) -> Result<()> {
        (**self).put_keyed(cid, data)
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        (**self).has(cid)
    }

    fn tracing(&self) -> Option<&dyn Tracing> {
        (**self).tracing()
    }
}

impl<T: Blockstore + ?Sized> Blockstore for &T {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
        (**self).get(cid)
    }

    fn put_keyed(&self, cid: &Cid, data: &[u8]) -> Result<()> {
        (**self).put_keyed(cid, data)
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        (**self).has(cid)
    }

    fn tracing(&self) -> Option<&dyn Tracing> {
        (**self).tracing()
    }
}
