//! CLI subcommand implementations for tvx

pub mod exec;
pub mod extract;
pub mod output;

use anyhow::{anyhow, Result};
use tvx_conformance::{ConformanceError, ProcessEngine};
use tvx_transport::{ApiInfo, LotusClient};

/// Environment variable naming the engine command line.
pub const ENGINE_CMD_ENV: &str = "TVX_ENGINE_CMD";

/// Build the process-backed engine from `--engine` / `TVX_ENGINE_CMD`.
pub fn engine_from_arg(command: Option<&str>, supported_versions: &[String]) -> Result<ProcessEngine> {
    let command = command.ok_or_else(|| {
        anyhow::Error::new(ConformanceError::Configuration(format!(
            "no execution engine configured; pass --engine or set {}",
            ENGINE_CMD_ENV
        )))
    })?;
    let engine = ProcessEngine::from_command(command)?;
    Ok(if supported_versions.is_empty() {
        engine
    } else {
        engine.with_supported_versions(supported_versions.to_vec())
    })
}

/// Build a node client from `--api` / `FULLNODE_API_INFO`.
pub fn client_from_arg(api: Option<&str>) -> Result<LotusClient> {
    let info = match api {
        Some(raw) => raw
            .parse::<ApiInfo>()
            .map_err(|e| anyhow!("invalid --api value: {}", e))?,
        None => ApiInfo::from_env()?,
    };
    tracing::debug!(?info, "using full node endpoint");
    Ok(LotusClient::from_api_info(&info))
}
