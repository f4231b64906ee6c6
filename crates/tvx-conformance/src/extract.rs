//! Tipset extraction: re-execute chain history under tracing and fold the
//! result into test vectors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};
use tvx_blockstore::{
    dagcbor, Blockstore, MemoryBlockstore, ProxyingBlockstore, TracingBlockstore, TracingSession,
};
use tvx_types::paths::ensure_dir;
use tvx_types::{
    Base64Bytes, Block, ChainClient, Class, GenerationData, Metadata, ObjectFetcher,
    Postconditions, Preconditions, Selector, StateTree, TestVector, TipSet, TipSetRef, Tipset,
    Variant, SELECTOR_MIN_PROTOCOL_VERSION,
};

use crate::codenames::protocol_codename;
use crate::driver::{ExecuteTipsetParams, ExecutionEngine};
use crate::errors::ConformanceError;
use crate::rand::Randomness;
use crate::surgeon::write_gzipped_car;

/// The only supported state retention strategy: archive exactly the objects
/// the execution accessed.
pub const RETAIN_ACCESSED_CIDS: &str = "accessed-cids";

/// Recorded as the generating client in vector provenance.
pub const DEFAULT_CLIENT_SOURCE: &str = "github.com/filecoin-project/lotus";

fn invalid_input(msg: impl Into<String>) -> anyhow::Error {
    ConformanceError::InvalidInput(msg.into()).into()
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// `<key>` or `<left>..<right>`.
    pub tipset: String,
    /// Vector file for a single tipset, directory for a range.
    pub file: PathBuf,
    pub retain: String,
}

impl ExtractOptions {
    pub fn new(tipset: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            tipset: tipset.into(),
            file: file.into(),
            retain: RETAIN_ACCESSED_CIDS.to_string(),
        }
    }

    /// Check the retention strategy and parse the tipset reference. Needs no
    /// chain access.
    pub fn validate(&self) -> Result<TipsetSpec> {
        if self.retain != RETAIN_ACCESSED_CIDS {
            return Err(invalid_input(format!(
                "tipset extraction only supports '{}' state retention",
                RETAIN_ACCESSED_CIDS
            )));
        }
        TipsetSpec::parse(&self.tipset)
    }
}

/// A parsed `--tipset` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TipsetSpec {
    Single(TipSetRef),
    Range(TipSetRef, TipSetRef),
}

impl TipsetSpec {
    pub fn parse(s: &str) -> Result<Self> {
        let parse_ref =
            |part: &str| part.parse::<TipSetRef>().map_err(|e| invalid_input(e.to_string()));
        let parts: Vec<&str> = s.split("..").collect();
        match parts.as_slice() {
            [single] => Ok(TipsetSpec::Single(parse_ref(single)?)),
            [left, right] => Ok(TipsetSpec::Range(parse_ref(left)?, parse_ref(right)?)),
            _ => Err(invalid_input("unrecognized tipset format")),
        }
    }
}

/// Network and client identity recorded in every vector of one run.
struct Provenance {
    network: String,
    version: String,
}

type StoreFactory<'a> = Box<dyn Fn() -> Arc<dyn Blockstore> + 'a>;

/// Extracts tipsets from a live chain into vectors.
pub struct Extractor<'a> {
    client: Arc<dyn ChainClient>,
    fetcher: Arc<dyn ObjectFetcher>,
    engine: &'a dyn ExecutionEngine,
    store_factory: Option<StoreFactory<'a>>,
    client_source: String,
}

impl<'a> Extractor<'a> {
    pub fn new(
        client: Arc<dyn ChainClient>,
        fetcher: Arc<dyn ObjectFetcher>,
        engine: &'a dyn ExecutionEngine,
    ) -> Self {
        Self {
            client,
            fetcher,
            engine,
            store_factory: None,
            client_source: DEFAULT_CLIENT_SOURCE.to_string(),
        }
    }

    /// Replace the default read-through tracing store. One store is created
    /// per extracted tipset.
    pub fn with_store_factory(
        mut self,
        factory: impl Fn() -> Arc<dyn Blockstore> + 'a,
    ) -> Self {
        self.store_factory = Some(Box::new(factory));
        self
    }

    pub fn with_client_source(mut self, source: impl Into<String>) -> Self {
        self.client_source = source.into();
        self
    }

    /// Extract the tipset or range named by `opts`. Returns the files written,
    /// newest tipset first.
    pub fn extract(&self, opts: &ExtractOptions) -> Result<Vec<PathBuf>> {
        let spec = opts.validate()?;

        let provenance = Provenance {
            network: self
                .client
                .network_name()
                .context("failed to get network name")?,
            version: self.client.version().context("failed to get client version")?,
        };

        match spec {
            TipsetSpec::Single(r) => {
                let ts = self.resolve(&r)?;
                self.extract_tipset(&ts, &opts.file, &provenance)?;
                Ok(vec![opts.file.clone()])
            }
            TipsetSpec::Range(left, right) => {
                let left = self.resolve(&left)?;
                let right = self.resolve(&right)?;
                self.extract_range(&left, right, &opts.file, &provenance)
            }
        }
    }

    fn resolve(&self, r: &TipSetRef) -> Result<TipSet> {
        match r {
            TipSetRef::Head => self.client.chain_head().context("failed to get chain head"),
            TipSetRef::Height(height) => {
                let head = self.client.chain_head().context("failed to get chain head")?;
                self.client
                    .get_tipset_by_height(*height, head.key())
                    .with_context(|| format!("failed to get tipset at height {}", height))
            }
            TipSetRef::Key(key) => self
                .client
                .get_tipset(key)
                .with_context(|| format!("failed to get tipset {}", key)),
        }
    }

    /// Walk from `right` back to `left` through parent links, extracting each
    /// tipset into `<dir>/epoch-<height>.json`.
    fn extract_range(
        &self,
        left: &TipSet,
        right: TipSet,
        dir: &Path,
        provenance: &Provenance,
    ) -> Result<Vec<PathBuf>> {
        if left.key() == right.key() {
            self.extract_tipset(&right, dir, provenance)?;
            return Ok(vec![dir.to_path_buf()]);
        }
        let not_ancestor_msg = format!(
            "tipset {} is not an ancestor of tipset {}",
            left.key(),
            right.key()
        );
        let not_ancestor = || invalid_input(not_ancestor_msg.clone());
        if right.height() <= left.height() {
            return Err(not_ancestor());
        }
        ensure_dir(dir).map_err(|e| invalid_input(e.to_string()))?;

        info!(
            from = right.height(),
            to = left.height(),
            "extracting tipset range"
        );
        let mut written = Vec::new();
        let mut cursor = right;
        loop {
            let path = dir.join(format!("epoch-{}.json", cursor.height()));
            self.extract_tipset(&cursor, &path, provenance)?;
            written.push(path);

            if cursor.key() == left.key() {
                break;
            }
            let parents = cursor.parents().clone();
            let parent = self.client.get_tipset(&parents).with_context(|| {
                format!(
                    "failed to get parent tipset {} of tipset at height {}",
                    parents,
                    cursor.height()
                )
            })?;
            if parent.height() < left.height()
                || (parent.height() == left.height() && parent.key() != left.key())
            {
                return Err(not_ancestor());
            }
            cursor = parent;
        }
        Ok(written)
    }

    fn extract_tipset(&self, ts: &TipSet, path: &Path, provenance: &Provenance) -> Result<()> {
        match &self.store_factory {
            Some(factory) => {
                let store = factory();
                self.extract_with_store(ts, path, provenance, store.as_ref())
            }
            None => {
                let store = TracingBlockstore::new(ProxyingBlockstore::new(
                    MemoryBlockstore::new(),
                    self.fetcher.clone(),
                ));
                let result = self.extract_with_store(ts, path, provenance, &store);
                info!(
                    height = ts.height(),
                    "{}",
                    store.inner().metrics().snapshot().format_report()
                );
                result
            }
        }
    }

    fn extract_with_store(
        &self,
        ts: &TipSet,
        path: &Path,
        provenance: &Provenance,
        store: &dyn Blockstore,
    ) -> Result<()> {
        let tracer = store.tracing().ok_or_else(|| {
            anyhow::Error::new(ConformanceError::Configuration(format!(
                "requested '{}' state retention, but no tracing blockstore was present",
                RETAIN_ACCESSED_CIDS
            )))
        })?;

        let height = ts.height();
        let codename = protocol_codename(height);
        let network_version = self
            .client
            .network_version(ts.key())
            .with_context(|| format!("failed to get network version at height {}", height))?;
        let blocks = self.fetch_blocks(ts)?;
        let tipset = Tipset {
            epoch_offset: 0,
            basefee: ts.parent_base_fee().clone(),
            blocks,
        };
        let preroot = ts.parent_state();

        info!(
            height,
            codename,
            network_version,
            blocks = tipset.blocks.len(),
            messages = tipset.blocks.iter().map(|b| b.messages.len()).sum::<usize>(),
            engine = self.engine.name(),
            "executing tipset"
        );

        let rand = Randomness::recording(self.client.clone());
        let session = TracingSession::begin(tracer);
        let result = self
            .engine
            .execute_tipset(
                store,
                &ExecuteTipsetParams {
                    preroot,
                    parent_epoch: height - 1,
                    exec_epoch: height,
                    network_version,
                    tipset: &tipset,
                    rand: &rand,
                    disable_vm_flush: true,
                },
            )
            .with_context(|| format!("failed to execute tipset at height {}", height))?;
        let accessed = session.finish();
        debug!(height, accessed = accessed.len(), "tracing finished");

        let roots = [preroot, result.post_state_root, result.receipts_root];
        let car = write_gzipped_car(store, &accessed, &roots)
            .with_context(|| format!("failed to write state archive for height {}", height))?;

        let vector = TestVector {
            class: Class::Tipset,
            meta: Metadata {
                id: format!("@{}", height),
                gen: vec![
                    GenerationData::new(format!("network:{}", provenance.network)),
                    GenerationData::new(format!("tipset:{}", ts.key())),
                    GenerationData::with_version(&self.client_source, &provenance.version),
                ],
                ..Metadata::default()
            },
            selector: Selector::from([(
                SELECTOR_MIN_PROTOCOL_VERSION.to_string(),
                codename.to_string(),
            )]),
            randomness: rand.recorded(),
            car: Base64Bytes(car),
            preconditions: Preconditions {
                variants: vec![Variant {
                    id: codename.to_string(),
                    epoch: height,
                    network_version,
                }],
                basefee: Some(tipset.basefee.clone()),
                circ_supply: None,
                state_tree: StateTree::new(preroot),
            },
            apply_messages: Vec::new(),
            apply_tipsets: vec![tipset],
            postconditions: Postconditions {
                state_tree: StateTree::new(result.post_state_root),
                receipts_roots: vec![result.receipts_root],
                receipts: result.applied_results,
            },
        };

        vector.save(path)?;
        info!(
            height,
            path = %path.display(),
            randomness = vector.randomness.len(),
            "wrote test vector"
        );
        Ok(())
    }

    /// Blocks of `ts` with their messages: BLS first, then secp messages
    /// stripped of their signature.
    fn fetch_blocks(&self, ts: &TipSet) -> Result<Vec<Block>> {
        ts.blocks()
            .iter()
            .map(|header| {
                let included = self
                    .client
                    .get_block_messages(&header.cid)
                    .with_context(|| format!("failed to get messages of block {}", header.cid))?;

                let mut messages =
                    Vec::with_capacity(included.bls_messages.len() + included.secpk_messages.len());
                for cid in &included.bls_messages {
                    let raw = self
                        .fetcher
                        .read_obj(cid)
                        .with_context(|| format!("failed to read message {}", cid))?;
                    messages.push(Base64Bytes(raw));
                }
                for cid in &included.secpk_messages {
                    let signed = self
                        .fetcher
                        .read_obj(cid)
                        .with_context(|| format!("failed to read signed message {}", cid))?;
                    let unsigned = dagcbor::first_array_element(&signed)
                        .map_err(|e| anyhow!("failed to unwrap signed message {}: {}", cid, e))?;
                    messages.push(Base64Bytes(unsigned));
                }

                Ok(Block {
                    miner_addr: header.miner.clone(),
                    win_count: header.win_count,
                    messages,
                })
            })
            .collect()
    }
}
