//! Conformance test-vector extraction and replay.
//!
//! - [`extract`]: re-executes tipsets from a live chain under a tracing store
//!   and writes self-contained vectors
//! - [`exec`]: replays vectors (single file, directory, or stream) against an
//!   [`ExecutionEngine`] and reports per-variant outcomes
//! - [`surgeon`]: writes the minimal state closure as a gzipped CAR archive
//! - [`rand`]: records and replays randomness draws
//! - [`process`]: an [`ExecutionEngine`] backed by an external executable

pub mod codenames;
pub mod driver;
pub mod errors;
pub mod exec;
pub mod extract;
pub mod process;
pub mod rand;
pub mod reporter;
pub mod surgeon;

pub use codenames::protocol_codename;
pub use driver::{
    ExecuteMessageParams, ExecuteMessageResult, ExecuteTipsetParams, ExecuteTipsetResult,
    ExecutionEngine,
};
pub use errors::ConformanceError;
pub use exec::{
    execute_vector, run_dir, run_file, run_stream, BatchEntry, BatchSummary, ReplayOptions,
    VariantOutcome, VariantReport, VectorReport, VectorStatus,
};
pub use extract::{ExtractOptions, Extractor, TipsetSpec, RETAIN_ACCESSED_CIDS};
pub use process::ProcessEngine;
pub use rand::{Rand, Randomness, RecordingRand, ReplayingRand};
pub use reporter::Reporter;
pub use surgeon::{load_gzipped_car, read_gzipped_car, write_car_including, write_gzipped_car};
