//! tvx: conformance test vectors for a chain's state-transition function.
//!
//! - **Extraction**: re-execute tipsets from a live node under a tracing
//!   store and write self-contained vectors (see [`conformance::extract`])
//! - **Replay**: run vectors against an execution engine and diff the results
//!   (see [`conformance::exec`])
//!
//! The member crates are re-exported here.

pub use tvx_blockstore as blockstore;
pub use tvx_conformance as conformance;
pub use tvx_transport as transport;
pub use tvx_types as types;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str =
    "tvx=info,tvx_conformance=info,tvx_transport=info,tvx_blockstore=info";

/// Install the global subscriber: `RUST_LOG` filtering and human-readable
/// output on stderr. `verbose` lowers the default level to debug.
pub fn init_logging(verbose: bool) {
    let default = if verbose {
        DEFAULT_LOG_FILTER.replace("=info", "=debug")
    } else {
        DEFAULT_LOG_FILTER.to_string()
    };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
