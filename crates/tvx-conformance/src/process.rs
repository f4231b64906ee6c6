//! Execution engine backed by an external process.
//!
//! The engine executable speaks newline-delimited JSON on stdin/stdout. tvx
//! writes one request:
//!
//! ```text
//! {"execute_tipset": {"preroot": {"/": ...}, "parent_epoch": ..., ...}}
//! {"execute_message": {"preroot": {"/": ...}, "epoch": ..., "message": "<b64>", ...}}
//! ```
//!
//! The engine may then issue any number of callbacks, each answered with one
//! line, before finishing with `{"result": ...}` or `{"error": "..."}`:
//!
//! | engine sends                                   | tvx answers                |
//! |------------------------------------------------|----------------------------|
//! | `{"get": {"/": cid}}`                           | `{"data": <b64> \| null}`  |
//! | `{"has": {"/": cid}}`                           | `{"has": bool}`            |
//! | `{"put": {"cid": {"/": cid}, "data": <b64>}}`   | `{"ok": true}`             |
//! | `{"rand": {"kind", "dst", "epoch", "entropy"}}` | `{"data": <b64>}`          |
//!
//! A failed callback is answered with `{"error": "..."}`, and that failure is
//! what the execution reports, even if the engine carries on.

use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use cid::Cid;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use tvx_blockstore::Blockstore;
use tvx_types::codec::cid_json;
use tvx_types::{
    Base64Bytes, Block, RandomnessKind, Selector, TokenAmount, SELECTOR_MIN_PROTOCOL_VERSION,
};

use crate::driver::{
    ExecuteMessageParams, ExecuteMessageResult, ExecuteTipsetParams, ExecuteTipsetResult,
    ExecutionEngine,
};
use crate::errors::ConformanceError;
use crate::rand::Rand;

#[derive(Serialize)]
struct TipsetRequest<'a> {
    #[serde(with = "cid_json")]
    preroot: Cid,
    parent_epoch: i64,
    exec_epoch: i64,
    network_version: u32,
    basefee: &'a TokenAmount,
    blocks: &'a [Block],
    disable_vm_flush: bool,
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    #[serde(with = "cid_json")]
    preroot: Cid,
    epoch: i64,
    network_version: u32,
    message: Base64Bytes,
    base_fee: &'a TokenAmount,
    circ_supply: &'a TokenAmount,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum EngineMessage {
    Get(#[serde(with = "cid_json")] Cid),
    Has(#[serde(with = "cid_json")] Cid),
    Put {
        #[serde(with = "cid_json")]
        cid: Cid,
        data: Base64Bytes,
    },
    Rand {
        kind: RandomnessKind,
        dst: i64,
        epoch: i64,
        entropy: Base64Bytes,
    },
    Result(Value),
    Error(String),
}

/// Answer one callback. Errors are returned to the caller, which both reports
/// them to the engine and keeps the first one.
fn answer(message: EngineMessage, store: &dyn Blockstore, rand: &dyn Rand) -> Result<Value> {
    Ok(match message {
        EngineMessage::Get(cid) => match store.get(&cid)? {
            Some(data) => json!({ "data": Base64Bytes(data) }),
            None => json!({ "data": null }),
        },
        EngineMessage::Has(cid) => json!({ "has": store.has(&cid)? }),
        EngineMessage::Put { cid, data } => {
            store.put_keyed(&cid, &data)?;
            json!({ "ok": true })
        }
        EngineMessage::Rand {
            kind,
            dst,
            epoch,
            entropy,
        } => {
            let value = rand.get_randomness(kind, dst, epoch, &entropy)?;
            json!({ "data": Base64Bytes(value) })
        }
        EngineMessage::Result(_) | EngineMessage::Error(_) => {
            bail!("terminal engine message in callback position")
        }
    })
}

/// Run one request/callback/result exchange over an engine's pipes.
fn run_session<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    request: &Value,
    store: &dyn Blockstore,
    rand: &dyn Rand,
) -> Result<Value> {
    let write_line = |writer: &mut W, value: &Value| -> Result<()> {
        serde_json::to_writer(&mut *writer, value)
            .map_err(|e| anyhow!("failed to encode engine message: {}", e))?;
        writer
            .write_all(b"\n")
            .and_then(|_| writer.flush())
            .map_err(|e| anyhow!("failed to write to engine: {}", e))
    };

    write_line(&mut writer, request)?;

    let mut callback_error: Option<anyhow::Error> = None;
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| anyhow!("failed to read from engine: {}", e))?;
        if n == 0 {
            return Err(callback_error.unwrap_or_else(|| anyhow!("engine exited without a result")));
        }
        if line.trim().is_empty() {
            continue;
        }
        let message: EngineMessage = serde_json::from_str(line.trim())
            .map_err(|e| anyhow!("invalid engine message '{}': {}", line.trim(), e))?;

        match message {
            EngineMessage::Result(value) => {
                return match callback_error {
                    Some(e) => Err(e),
                    None => Ok(value),
                }
            }
            EngineMessage::Error(msg) => {
                return Err(callback_error
                    .unwrap_or_else(|| anyhow!("engine reported an error: {}", msg)))
            }
            callback => {
                let reply = match answer(callback, store, rand) {
                    Ok(reply) => reply,
                    Err(e) => {
                        let reply = json!({ "error": format!("{:#}", e) });
                        callback_error.get_or_insert(e);
                        reply
                    }
                };
                write_line(&mut writer, &reply)?;
            }
        }
    }
}

/// Drives an external engine executable, one process per execution.
pub struct ProcessEngine {
    name: String,
    program: String,
    args: Vec<String>,
    supported_versions: Option<Vec<String>>,
}

impl ProcessEngine {
    /// Build from a whitespace-separated command line, e.g. `"fvm-runner --quiet"`.
    pub fn from_command(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| {
            anyhow::Error::new(ConformanceError::Configuration(
                "engine command cannot be empty".into(),
            ))
        })?;
        let name = std::path::Path::new(&program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&program)
            .to_string();
        Ok(Self {
            name,
            program,
            args: parts.collect(),
            supported_versions: None,
        })
    }

    /// Only accept vectors whose `min_protocol_version` is one of `versions`.
    pub fn with_supported_versions(mut self, versions: Vec<String>) -> Self {
        self.supported_versions = Some(versions);
        self
    }

    fn run(&self, request: Value, store: &dyn Blockstore, rand: &dyn Rand) -> Result<Value> {
        debug!(engine = %self.name, "spawning engine process");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| anyhow!("failed to start engine '{}': {}", self.program, e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("engine stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("engine stdout unavailable"))?;

        // stdin is dropped when the session ends, which tells the engine to exit.
        let outcome = run_session(BufReader::new(stdout), stdin, &request, store, rand);
        let status = child
            .wait()
            .with_context(|| format!("failed to wait for engine '{}'", self.name))?;

        match outcome {
            Ok(value) => {
                if !status.success() {
                    warn!(engine = %self.name, %status, "engine returned a result but exited abnormally");
                }
                Ok(value)
            }
            Err(e) => Err(e.context(format!("engine '{}' failed ({})", self.name, status))),
        }
    }
}

impl ExecutionEngine for ProcessEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, selector: &Selector) -> bool {
        match (&self.supported_versions, selector.get(SELECTOR_MIN_PROTOCOL_VERSION)) {
            (Some(versions), Some(min)) => versions.iter().any(|v| v == min),
            _ => true,
        }
    }

    fn execute_tipset(
        &self,
        store: &dyn Blockstore,
        params: &ExecuteTipsetParams<'_>,
    ) -> Result<ExecuteTipsetResult> {
        let request = json!({
            "execute_tipset": TipsetRequest {
                preroot: params.preroot,
                parent_epoch: params.parent_epoch,
                exec_epoch: params.exec_epoch,
                network_version: params.network_version,
                basefee: &params.tipset.basefee,
                blocks: &params.tipset.blocks,
                disable_vm_flush: params.disable_vm_flush,
            }
        });
        let value = self.run(request, store, params.rand)?;
        serde_json::from_value(value).map_err(|e| anyhow!("invalid tipset result from engine: {}", e))
    }

    fn execute_message(
        &self,
        store: &dyn Blockstore,
        params: &ExecuteMessageParams<'_>,
    ) -> Result<ExecuteMessageResult> {
        let request = json!({
            "execute_message": MessageRequest {
                preroot: params.preroot,
                epoch: params.epoch,
                network_version: params.network_version,
                message: Base64Bytes::from(params.message),
                base_fee: &params.base_fee,
                circ_supply: &params.circ_supply,
            }
        });
        let value = self.run(request, store, params.rand)?;
        serde_json::from_value(value)
            .map_err(|e| anyhow!("invalid message result from engine: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rand::ReplayingRand;
    use std::io::Cursor;
    use tvx_blockstore::{cid_for, MemoryBlockstore, RAW};
    use tvx_types::{RandomnessMatch, RandomnessRule};

    fn link(cid: &Cid) -> Value {
        json!({ "/": cid.to_string() })
    }

    fn replies(written: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(written)
            .lines()
            .skip(1)
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_session_answers_callbacks() -> Result<()> {
        let store = MemoryBlockstore::new();
        let existing = store.put(RAW, b"state")?;
        let fresh = cid_for(RAW, b"fresh");
        let rand = ReplayingRand::new(vec![RandomnessMatch {
            on: RandomnessRule {
                kind: RandomnessKind::Chain,
                dst: 1,
                epoch: 9,
                entropy: Base64Bytes(vec![7]),
            },
            ret: Base64Bytes(vec![42; 4]),
        }]);

        let script = [
            json!({ "get": link(&existing) }),
            json!({ "has": link(&fresh) }),
            json!({ "put": { "cid": link(&fresh), "data": "ZnJlc2g=" } }),
            json!({ "rand": { "kind": "chain", "dst": 1, "epoch": 9, "entropy": "Bw==" } }),
            json!({ "result": { "ok": 1 } }),
        ]
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n");

        let mut written = Vec::new();
        let result = run_session(
            Cursor::new(script),
            &mut written,
            &json!({ "execute_tipset": {} }),
            &store,
            &rand,
        )?;
        assert_eq!(result, json!({ "ok": 1 }));
        assert_eq!(store.get(&fresh)?, Some(b"fresh".to_vec()));

        let replies = replies(&written);
        assert_eq!(replies[0], json!({ "data": "c3RhdGU=" }));
        assert_eq!(replies[1], json!({ "has": false }));
        assert_eq!(replies[2], json!({ "ok": true }));
        assert_eq!(replies[3], json!({ "data": "KioqKg==" }));
        Ok(())
    }

    #[test]
    fn test_failed_callback_wins_over_result() {
        let store = MemoryBlockstore::new();
        let rand = ReplayingRand::new(vec![]);
        let script = [
            json!({ "rand": { "kind": "beacon", "dst": 2, "epoch": 5, "entropy": "" } }),
            json!({ "result": {} }),
        ]
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n");

        let mut written = Vec::new();
        let err = run_session(Cursor::new(script), &mut written, &json!({}), &store, &rand)
            .unwrap_err();
        assert!(ConformanceError::is_determinism_violation(&err));
        assert!(replies(&written)[0].get("error").is_some());
    }

    #[test]
    fn test_engine_error_and_eof() {
        let store = MemoryBlockstore::new();
        let rand = ReplayingRand::new(vec![]);

        let err = run_session(
            Cursor::new("{\"error\":\"out of gas\"}\n"),
            Vec::new(),
            &json!({}),
            &store,
            &rand,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "engine reported an error: out of gas");

        let err = run_session(Cursor::new(""), Vec::new(), &json!({}), &store, &rand).unwrap_err();
        assert_eq!(err.to_string(), "engine exited without a result");
    }

    #[test]
    fn test_empty_command_is_configuration_error() {
        let err = ProcessEngine::from_command("   ").err().unwrap();
        assert!(matches!(
            ConformanceError::find(&err),
            Some(ConformanceError::Configuration(_))
        ));
    }

    #[test]
    fn test_supported_versions_filter() -> Result<()> {
        let engine = ProcessEngine::from_command("/usr/bin/engine --flag")?
            .with_supported_versions(vec!["genesis".into()]);
        assert_eq!(engine.name(), "engine");

        let mut selector = Selector::new();
        assert!(engine.supports(&selector));
        selector.insert(SELECTOR_MIN_PROTOCOL_VERSION.into(), "genesis".into());
        assert!(engine.supports(&selector));
        selector.insert(SELECTOR_MIN_PROTOCOL_VERSION.into(), "dragon".into());
        assert!(!engine.supports(&selector));
        Ok(())
    }
}
