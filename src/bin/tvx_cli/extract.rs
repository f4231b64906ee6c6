//! Extract command - turn chain history into test vectors

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tvx_conformance::{ExtractOptions, Extractor, RETAIN_ACCESSED_CIDS};
use tvx_transport::FULLNODE_API_INFO_ENV;

use super::{client_from_arg, engine_from_arg, ENGINE_CMD_ENV};

#[derive(Parser, Debug)]
pub struct ExtractCmd {
    /// Tipset to extract: `@<height>`, comma-separated block CIDs, or
    /// `<left>..<right>` for a range
    #[arg(long)]
    pub tipset: String,

    /// Output vector file; for a range, the directory receiving
    /// `epoch-<height>.json` files
    #[arg(long)]
    pub file: PathBuf,

    /// State retention strategy
    #[arg(long, default_value = RETAIN_ACCESSED_CIDS)]
    pub retain: String,

    /// Full node API info: `[token:]<multiaddr|url>`
    #[arg(long, env = FULLNODE_API_INFO_ENV)]
    pub api: Option<String>,

    /// Execution engine command line
    #[arg(long, env = ENGINE_CMD_ENV)]
    pub engine: Option<String>,
}

impl ExtractCmd {
    /// Returns `true` when every requested vector was written.
    pub fn execute(&self) -> Result<bool> {
        let opts = ExtractOptions {
            tipset: self.tipset.clone(),
            file: self.file.clone(),
            retain: self.retain.clone(),
        };
        // Reject bad input before touching the network.
        opts.validate()?;

        let engine = engine_from_arg(self.engine.as_deref(), &[])?;
        let client = Arc::new(client_from_arg(self.api.as_deref())?);
        let extractor = Extractor::new(client.clone(), client, &engine);

        let written = extractor.extract(&opts)?;
        info!(vectors = written.len(), "extraction complete");
        for path in &written {
            println!("{}", path.display());
        }
        Ok(true)
    }
}
