//! tvx: extract conformance test vectors from chain history and replay them
//!
//! ## Example Usage
//!
//! ```bash
//! # Extract the tipset at height 1000 from a node
//! FULLNODE_API_INFO=<token>:/ip4/127.0.0.1/tcp/1234/http \
//!     tvx extract --tipset @1000 --engine fvm-runner --file ./vectors/1000.json
//!
//! # Extract a range, newest first, into a directory
//! tvx extract --tipset @1000..@1010 --engine fvm-runner --file ./vectors/
//!
//! # Replay a directory of vectors on 8 threads
//! tvx exec --file ./vectors --out ./reports --jobs 8 --engine fvm-runner
//!
//! # Replay newline-delimited vectors from stdin
//! cat vectors/*.json | tvx exec --engine fvm-runner
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod tvx_cli;

use tvx_cli::{exec::ExecCmd, extract::ExtractCmd, output::format_error};

#[derive(Parser)]
#[command(
    name = "tvx",
    author,
    version,
    about = "Conformance test-vector extraction and replay",
    long_about = "Extracts tipsets from a live chain into self-contained test vectors \
                  and replays vectors against an execution engine."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (debug level unless RUST_LOG is set)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a tipset or a tipset range into test vectors
    Extract(ExtractCmd),

    /// Replay test vectors against an execution engine
    Exec(ExecCmd),
}

fn main() -> ExitCode {
    let Cli { command, verbose } = Cli::parse();
    tvx::init_logging(verbose);

    let result = match command {
        Commands::Extract(cmd) => cmd.execute(),
        Commands::Exec(cmd) => cmd.execute(),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprint!("{}", format_error(&e));
            ExitCode::FAILURE
        }
    }
}
