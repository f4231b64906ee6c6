//! Exec command - replay test vectors against an execution engine

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tvx_conformance::{
    run_dir, run_file, run_stream, ConformanceError, ReplayOptions, Reporter, VectorStatus,
};
use tvx_transport::FULLNODE_API_INFO_ENV;

use super::output::print_batch_summary;
use super::{client_from_arg, engine_from_arg, ENGINE_CMD_ENV};

#[derive(Parser, Debug)]
pub struct ExecCmd {
    /// Vector file or directory of vectors; vectors are read from stdin
    /// when omitted
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Directory receiving one `<name>.out` report per vector (directory
    /// input only)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Fetch objects missing from a vector's archive from the full node
    #[arg(long)]
    pub fallback_blockstore: bool,

    /// Full node API info, used by --fallback-blockstore
    #[arg(long, env = FULLNODE_API_INFO_ENV)]
    pub api: Option<String>,

    /// Vectors replayed in parallel (directory input only)
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,

    /// Execution engine command line
    #[arg(long, env = ENGINE_CMD_ENV)]
    pub engine: Option<String>,

    /// Protocol codenames the engine supports; other vectors are skipped
    #[arg(long, value_delimiter = ',')]
    pub supported_versions: Vec<String>,
}

impl ExecCmd {
    /// Returns `true` when nothing failed or errored.
    pub fn execute(&self) -> Result<bool> {
        let is_dir = self.file.as_ref().is_some_and(|p| p.is_dir());
        if is_dir && self.out.is_none() {
            return Err(ConformanceError::InvalidInput("no output directory provided".into()).into());
        }

        let engine = engine_from_arg(self.engine.as_deref(), &self.supported_versions)?;
        let opts = ReplayOptions {
            fallback: if self.fallback_blockstore {
                Some(Arc::new(client_from_arg(self.api.as_deref())?))
            } else {
                None
            },
        };

        match &self.file {
            Some(dir) if is_dir => {
                let summary = run_dir(&engine, dir, self.out.as_deref(), &opts, self.jobs)?;
                print_batch_summary("Vector Replay Summary", &summary);
                Ok(summary.is_success())
            }
            Some(path) => {
                let mut reporter = Reporter::console();
                let report = run_file(&engine, path, &opts, &mut reporter)?;
                reporter.finish()?;
                Ok(matches!(
                    report.status(),
                    VectorStatus::Passed | VectorStatus::Skipped
                ))
            }
            None => {
                let mut reporter = Reporter::console();
                let stdin = std::io::stdin();
                let summary = run_stream(&engine, stdin.lock(), &opts, &mut reporter)?;
                reporter.finish()?;
                print_batch_summary("Stream Replay Summary", &summary);
                Ok(summary.is_success())
            }
        }
    }
}
