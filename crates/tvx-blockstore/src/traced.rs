//! Access-tracing block store.

use std::collections::HashSet;

use anyhow::Result;
use cid::Cid;
use parking_lot::Mutex;
use tracing::debug;

use crate::Blockstore;

/// Capability exposed by stores that can record the identifiers they serve.
pub trait Tracing: Send + Sync {
    /// Clear the visited set and begin recording.
    fn start_tracing(&self);

    /// Stop recording and return every distinct identifier seen since
    /// [`Tracing::start_tracing`].
    fn finish_tracing(&self) -> HashSet<Cid>;
}

#[derive(Debug, Default)]
struct TraceState {
    active: bool,
    visited: HashSet<Cid>,
}

/// Wraps a store and records every identifier that is successfully read or
/// written while tracing is active. Data passes through unchanged.
#[derive(Debug)]
pub struct TracingBlockstore<S> {
    inner: S,
    state: Mutex<TraceState>,
}

impl<S: Blockstore> TracingBlockstore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: Mutex::new(TraceState::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn record(&self, cid: &Cid) {
        let mut state = self.state.lock();
        if state.active {
            state.visited.insert(*cid);
        }
    }
}

impl<S: Blockstore> Blockstore for TracingBlockstore<S> {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
        let data = self.inner.get(cid)?;
        if data.is_some() {
            self.record(cid);
        }
        Ok(data)
    }

    fn put_keyed(&self, cid: &Cid, data: &[u8]) -> Result<()> {
        self.inner.put_keyed(cid, data)?;
        self.record(cid);
        Ok(())
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        self.inner.has(cid)
    }

    fn tracing(&self) -> Option<&dyn Tracing> {
        Some(self)
    }
}

impl<S: Blockstore> Tracing for TracingBlockstore<S> {
    fn start_tracing(&self) {
        let mut state = self.state.lock();
        state.visited.clear();
        state.active = true;
    }

    fn finish_tracing(&self) -> HashSet<Cid> {
        let mut state = self.state.lock();
        state.active = false;
        let visited = std::mem::take(&mut state.visited);
        debug!(objects = visited.len(), "finished tracing");
        visited
    }
}

/// Scoped tracing session. Dropping the session without calling
/// [`TracingSession::finish`] stops tracing and discards the visited set.
pub struct TracingSession<'a> {
    tracer: &'a dyn Tracing,
    finished: bool,
}

impl<'a> TracingSession<'a> {
    pub fn begin(tracer: &'a dyn Tracing) -> Self {
        tracer.start_tracing();
        Self {
            tracer,
            finished: false,
        }
    }

    pub fn finish(mut self) -> HashSet<Cid> {
        self.finished = true;
        self.tracer.finish_tracing()
    }
}

impl Drop for TracingSession<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracer.finish_tracing();
        }
    }
}
