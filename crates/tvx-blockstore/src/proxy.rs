//! Read-through block store backed by a remote object fetcher.

use anyhow::Result;
use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use tracing::{debug, warn};
use tvx_types::ObjectFetcher;

use crate::errors::HashMismatch;
use crate::metrics::StoreMetrics;
use crate::Blockstore;

/// Serves reads from `local` and falls back to `fetcher` on a miss.
///
/// Fetched objects are checked against their multihash and cached in
/// `local`, so each object crosses the network at most once. Fetch failures
/// are returned unchanged; there is no retry.
pub struct ProxyingBlockstore<S, F> {
    local: S,
    fetcher: F,
    metrics: StoreMetrics,
}

impl<S: Blockstore, F: ObjectFetcher> ProxyingBlockstore<S, F> {
    pub fn new(local: S, fetcher: F) -> Self {
        Self {
            local,
            fetcher,
            metrics: StoreMetrics::default(),
        }
    }

    pub fn local(&self) -> &S {
        &self.local
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    fn fetch(&self, cid: &Cid) -> Result<Vec<u8>> {
        let data = match self.fetcher.read_obj(cid) {
            Ok(data) => data,
            Err(e) => {
                self.metrics.record_remote_error();
                return Err(e);
            }
        };
        verify_digest(cid, &data)?;
        self.metrics.record_remote_fetch(data.len());
        debug!(%cid, bytes = data.len(), "fetched object from remote");
        self.local.put_keyed(cid, &data)?;
        Ok(data)
    }
}

/// Check that `data` hashes to `cid`. Hash functions outside the supported
/// table are accepted unchecked.
fn verify_digest(cid: &Cid, data: &[u8]) -> Result<()> {
    match Code::try_from(cid.hash().code()) {
        Ok(code) => {
            if code.digest(data) != *cid.hash() {
                return Err(HashMismatch { cid: *cid }.into());
            }
        }
        Err(_) => {
            warn!(%cid, code = cid.hash().code(), "cannot verify object with unsupported multihash");
        }
    }
    Ok(())
}

impl<S: Blockstore, F: ObjectFetcher> Blockstore for ProxyingBlockstore<S, F> {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
        if let Some(data) = self.local.get(cid)? {
            self.metrics.record_local_hit();
            return Ok(Some(data));
        }
        self.fetch(cid).map(Some)
    }

    fn put_keyed(&self, cid: &Cid, data: &[u8]) -> Result<()> {
        self.local.put_keyed(cid, data)
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        self.local.has(cid)
    }
}
