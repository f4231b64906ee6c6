//! Vector replay: run each variant of a vector against an engine and compare
//! the outcome with the recorded postconditions.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use cid::Cid;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use tvx_blockstore::{Blockstore, MemoryBlockstore, ProxyingBlockstore};
use tvx_types::encoding::base64_encode;
use tvx_types::paths::ensure_dir;
use tvx_types::{Class, ObjectFetcher, Receipt, TestVector, TokenAmount, Variant};

use crate::driver::{
    default_circ_supply, ExecuteMessageParams, ExecuteTipsetParams, ExecutionEngine,
    DEFAULT_BASE_FEE,
};
use crate::errors::ConformanceError;
use crate::rand::{Rand, Randomness};
use crate::reporter::Reporter;
use crate::surgeon::load_gzipped_car;

#[derive(Clone, Default)]
pub struct ReplayOptions {
    /// Objects missing from a vector's archive are fetched from here.
    pub fallback: Option<Arc<dyn ObjectFetcher>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantOutcome {
    Passed,
    /// The engine ran but disagreed with the vector.
    Failed { diffs: Vec<String> },
    /// The variant could not be evaluated, e.g. a missing object.
    Errored { error: String },
    /// The engine declined the vector.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantReport {
    pub variant: String,
    pub outcome: VariantOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorStatus {
    Passed,
    Failed,
    Errored,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorReport {
    pub id: String,
    pub variants: Vec<VariantReport>,
}

impl VectorReport {
    /// Worst variant outcome. A vector whose variants were all skipped (or
    /// that has none) counts as skipped.
    pub fn status(&self) -> VectorStatus {
        let any = |f: fn(&VariantOutcome) -> bool| self.variants.iter().any(|v| f(&v.outcome));
        if any(|o| matches!(o, VariantOutcome::Errored { .. })) {
            VectorStatus::Errored
        } else if any(|o| matches!(o, VariantOutcome::Failed { .. })) {
            VectorStatus::Failed
        } else if any(|o| matches!(o, VariantOutcome::Passed)) {
            VectorStatus::Passed
        } else {
            VectorStatus::Skipped
        }
    }
}

fn invalid_input(msg: impl Into<String>) -> anyhow::Error {
    ConformanceError::InvalidInput(msg.into()).into()
}

/// Replay every variant of `vector`, logging progress and diffs to `reporter`.
///
/// Variants are evaluated independently. Only an unsupported class is
/// returned as an error; everything else is folded into the report.
pub fn execute_vector(
    engine: &dyn ExecutionEngine,
    vector: &TestVector,
    opts: &ReplayOptions,
    reporter: &mut Reporter,
) -> Result<VectorReport> {
    if let Class::Other(class) = &vector.class {
        return Err(ConformanceError::UnsupportedClass(class.clone()).into());
    }
    reporter.log(format!("executing test vector: {}", vector.meta.id));

    let mut report = VectorReport {
        id: vector.meta.id.clone(),
        variants: Vec::with_capacity(vector.preconditions.variants.len()),
    };

    if !engine.supports(&vector.selector) {
        let reason = format!(
            "engine {} does not support selector {:?}",
            engine.name(),
            vector.selector
        );
        reporter.log(format!("skipping test vector {}: {}", vector.meta.id, reason));
        report.variants = vector
            .preconditions
            .variants
            .iter()
            .map(|v| VariantReport {
                variant: v.id.clone(),
                outcome: VariantOutcome::Skipped {
                    reason: reason.clone(),
                },
            })
            .collect();
        return Ok(report);
    }

    for variant in &vector.preconditions.variants {
        let outcome = match run_variant(engine, vector, variant, opts) {
            Ok(diffs) if diffs.is_empty() => VariantOutcome::Passed,
            Ok(diffs) => VariantOutcome::Failed { diffs },
            Err(e) if ConformanceError::is_determinism_violation(&e) => VariantOutcome::Failed {
                diffs: vec![format!("{:#}", e)],
            },
            Err(e) => VariantOutcome::Errored {
                error: format!("{:#}", e),
            },
        };

        match &outcome {
            VariantOutcome::Passed => {
                reporter.log(format!("✅ test vector succeeded for variant {}", variant.id))
            }
            VariantOutcome::Failed { diffs } => {
                for diff in diffs {
                    reporter.error(diff.clone());
                }
                reporter.error(format!("❌ test vector failed for variant {}", variant.id));
            }
            VariantOutcome::Errored { error } => {
                reporter.error(error.clone());
                reporter.error(format!("❌ test vector failed for variant {}", variant.id));
            }
            VariantOutcome::Skipped { .. } => {}
        }
        report.variants.push(VariantReport {
            variant: variant.id.clone(),
            outcome,
        });
    }
    Ok(report)
}

/// Evaluate one variant against a fresh store. Returns the diffs found.
fn run_variant(
    engine: &dyn ExecutionEngine,
    vector: &TestVector,
    variant: &Variant,
    opts: &ReplayOptions,
) -> Result<Vec<String>> {
    let rand = Randomness::replaying(vector.randomness.clone());
    let run = |store: &dyn Blockstore| -> Result<Vec<String>> {
        let roots = load_gzipped_car(store, &vector.car)?;
        debug!(id = %vector.meta.id, variant = %variant.id, roots = roots.len(), "loaded vector archive");
        match vector.class {
            Class::Tipset => run_tipsets(engine, store, vector, variant, &rand),
            Class::Message => run_messages(engine, store, vector, variant, &rand),
            Class::Other(ref class) => Err(ConformanceError::UnsupportedClass(class.clone()).into()),
        }
    };

    match &opts.fallback {
        None => {
            let store = MemoryBlockstore::new();
            run(&store as &dyn Blockstore)
        }
        Some(fetcher) => {
            let store = ProxyingBlockstore::new(MemoryBlockstore::new(), fetcher.clone());
            let result = run(&store as &dyn Blockstore);
            info!(
                id = %vector.meta.id,
                "{}",
                store.metrics().snapshot().format_report()
            );
            result
        }
    }
}

fn compare_receipt(label: &str, expected: &Receipt, actual: &Receipt, diffs: &mut Vec<String>) {
    if expected.exit_code != actual.exit_code {
        diffs.push(format!(
            "exit code of msg {} did not match; expected: {}, got: {}",
            label, expected.exit_code, actual.exit_code
        ));
    }
    if expected.gas_used != actual.gas_used {
        diffs.push(format!(
            "gas used of msg {} did not match; expected: {}, got: {}",
            label, expected.gas_used, actual.gas_used
        ));
    }
    if expected.return_value != actual.return_value {
        diffs.push(format!(
            "return value of msg {} did not match; expected: {}, got: {}",
            label,
            base64_encode(&expected.return_value),
            base64_encode(&actual.return_value)
        ));
    }
}

fn compare_post_root(expected: &Cid, actual: &Cid, diffs: &mut Vec<String>) {
    if expected != actual {
        diffs.push(format!(
            "wrong post root cid; expected {}, but got {}",
            expected, actual
        ));
    }
}

fn compare_receipt_count(expected: usize, actual: usize, diffs: &mut Vec<String>) {
    if expected != actual {
        diffs.push(format!(
            "receipt count did not match; expected: {}, got: {}",
            expected, actual
        ));
    }
}

fn run_tipsets(
    engine: &dyn ExecutionEngine,
    store: &dyn Blockstore,
    vector: &TestVector,
    variant: &Variant,
    rand: &dyn Rand,
) -> Result<Vec<String>> {
    let post = &vector.postconditions;
    let mut diffs = Vec::new();
    let mut root = vector.preconditions.state_tree.root_cid;
    let mut prev_epoch: Option<i64> = None;
    let mut receipt_index = 0;

    for (i, tipset) in vector.apply_tipsets.iter().enumerate() {
        let exec_epoch = variant.epoch + tipset.epoch_offset;
        let params = ExecuteTipsetParams {
            preroot: root,
            parent_epoch: prev_epoch.unwrap_or(exec_epoch - 1),
            exec_epoch,
            network_version: variant.network_version,
            tipset,
            rand,
            disable_vm_flush: false,
        };
        let result = engine
            .execute_tipset(store, &params)
            .map_err(|e| e.context(format!("failed to apply tipset {}", i)))?;

        for (j, actual) in result.applied_results.iter().enumerate() {
            let label = format!("{} of tipset {}", j, i);
            if let Some(expected) = post.receipts.get(receipt_index) {
                compare_receipt(&label, expected, actual, &mut diffs);
            }
            receipt_index += 1;
        }

        if let Some(expected) = post.receipts_roots.get(i) {
            if *expected != result.receipts_root {
                diffs.push(format!(
                    "post receipts root doesn't match; expected: {}, was: {}",
                    expected, result.receipts_root
                ));
            }
        }

        root = result.post_state_root;
        prev_epoch = Some(exec_epoch);
    }

    compare_receipt_count(post.receipts.len(), receipt_index, &mut diffs);
    if !post.receipts_roots.is_empty() && post.receipts_roots.len() != vector.apply_tipsets.len() {
        diffs.push(format!(
            "receipts root count did not match; expected: {}, got: {}",
            post.receipts_roots.len(),
            vector.apply_tipsets.len()
        ));
    }
    compare_post_root(&post.state_tree.root_cid, &root, &mut diffs);
    Ok(diffs)
}

fn run_messages(
    engine: &dyn ExecutionEngine,
    store: &dyn Blockstore,
    vector: &TestVector,
    variant: &Variant,
    rand: &dyn Rand,
) -> Result<Vec<String>> {
    let pre = &vector.preconditions;
    let post = &vector.postconditions;
    let base_fee = pre
        .basefee
        .clone()
        .unwrap_or_else(|| TokenAmount::from_atto(DEFAULT_BASE_FEE));
    let circ_supply = pre.circ_supply.clone().unwrap_or_else(default_circ_supply);

    let mut diffs = Vec::new();
    let mut root = pre.state_tree.root_cid;
    for (i, message) in vector.apply_messages.iter().enumerate() {
        let params = ExecuteMessageParams {
            preroot: root,
            epoch: variant.epoch + message.epoch_offset.unwrap_or(0),
            network_version: variant.network_version,
            message: &message.bytes,
            base_fee: base_fee.clone(),
            circ_supply: circ_supply.clone(),
            rand,
        };
        let result = engine
            .execute_message(store, &params)
            .map_err(|e| e.context(format!("failed to apply message {}", i)))?;

        if let Some(expected) = post.receipts.get(i) {
            compare_receipt(&i.to_string(), expected, &result.receipt, &mut diffs);
        }
        root = result.post_state_root;
    }

    compare_receipt_count(post.receipts.len(), vector.apply_messages.len(), &mut diffs);
    compare_post_root(&post.state_tree.root_cid, &root, &mut diffs);
    Ok(diffs)
}

/// One vector's entry in a batch summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// File name or vector id.
    pub source: String,
    pub status: VectorStatus,
    /// Set when the vector could not be evaluated at all.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
    pub entries: Vec<BatchEntry>,
}

impl BatchSummary {
    /// Fold one vector result in. Input errors (unparseable file, unsupported
    /// class) count as failures, anything else as errors.
    pub fn record(&mut self, source: impl Into<String>, result: &Result<VectorReport>) {
        let (status, error) = match result {
            Ok(report) => (report.status(), None),
            Err(e) if ConformanceError::is_input_error(e) => {
                (VectorStatus::Failed, Some(format!("{:#}", e)))
            }
            Err(e) => (VectorStatus::Errored, Some(format!("{:#}", e))),
        };
        self.total += 1;
        match status {
            VectorStatus::Passed => self.passed += 1,
            VectorStatus::Failed => self.failed += 1,
            VectorStatus::Errored => self.errored += 1,
            VectorStatus::Skipped => self.skipped += 1,
        }
        self.entries.push(BatchEntry {
            source: source.into(),
            status,
            error,
        });
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

/// Load a vector file, wrapping parse failures as input errors.
fn load_vector(path: &Path) -> Result<TestVector> {
    TestVector::load(path).map_err(|e| invalid_input(format!("{:#}", e)))
}

/// Replay a single vector file.
pub fn run_file(
    engine: &dyn ExecutionEngine,
    path: &Path,
    opts: &ReplayOptions,
    reporter: &mut Reporter,
) -> Result<VectorReport> {
    let vector = load_vector(path)?;
    execute_vector(engine, &vector, opts, reporter)
}

/// Replay every file in `dir`, writing `<out>/<stem>.out` per vector.
///
/// Vectors run on a pool of `jobs` threads; each has its own reporter whose
/// console output is emitted as one block. A failing vector never stops the
/// batch. Entries are returned in file name order.
pub fn run_dir(
    engine: &dyn ExecutionEngine,
    dir: &Path,
    out: Option<&Path>,
    opts: &ReplayOptions,
    jobs: usize,
) -> Result<BatchSummary> {
    let out = out.ok_or_else(|| invalid_input("no output directory provided"))?;
    ensure_dir(out).map_err(|e| invalid_input(e.to_string()))?;

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| anyhow!("failed to list directory {}: {}", dir.display(), e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    info!(dir = %dir.display(), vectors = files.len(), jobs, "replaying directory");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| anyhow!("failed to build worker pool: {}", e))?;

    let results: Vec<(String, Result<VectorReport>)> = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone());
                let out_path = out.join(format!("{}.out", stem));
                (name, replay_to_report(engine, path, &out_path, opts))
            })
            .collect()
    });

    let mut summary = BatchSummary::default();
    for (name, result) in &results {
        summary.record(name.clone(), result);
    }
    Ok(summary)
}

fn replay_to_report(
    engine: &dyn ExecutionEngine,
    path: &Path,
    out_path: &Path,
    opts: &ReplayOptions,
) -> Result<VectorReport> {
    info!(
        "processing vector {}; sending output to {}",
        path.display(),
        out_path.display()
    );
    let mut reporter = Reporter::buffered().with_file(out_path)?;
    let result = run_file(engine, path, opts, &mut reporter);
    if let Err(e) = &result {
        reporter.error(format!("{:#}", e));
    }
    if let Err(e) = reporter.finish() {
        warn!("failed to finish report {}: {}", out_path.display(), e);
    }
    result
}

/// Replay concatenated JSON vectors from `reader` until end of input.
///
/// A vector that fails to decode aborts the stream. Per-vector replay errors
/// are reported and the stream continues.
pub fn run_stream<R: Read>(
    engine: &dyn ExecutionEngine,
    reader: R,
    opts: &ReplayOptions,
    reporter: &mut Reporter,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    let stream = serde_json::Deserializer::from_reader(reader).into_iter::<TestVector>();
    for (i, item) in stream.enumerate() {
        let vector =
            item.map_err(|e| invalid_input(format!("failed to decode test vector {}: {}", i, e)))?;
        let result = execute_vector(engine, &vector, opts, reporter);
        if let Err(e) = &result {
            reporter.error(format!("{:#}", e));
        }
        summary.record(vector.meta.id.clone(), &result);
    }
    Ok(summary)
}
