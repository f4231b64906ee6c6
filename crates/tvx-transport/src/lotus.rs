//! JSON-RPC client for Lotus-compatible full nodes.
//!
//! ## Usage
//!
//! ```ignore
//! let client = LotusClient::new("http://127.0.0.1:1234/rpc/v1", None);
//! let head = client.chain_head()?;
//! let ts = client.get_tipset_by_height(head.height() - 10, head.key())?;
//! ```
//!
//! Timeouts come from `TVX_RPC_TIMEOUT_SECS` (default 30) and
//! `TVX_RPC_CONNECT_TIMEOUT_SECS` (default 10).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use cid::Cid;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use tvx_types::codec::cid_json;
use tvx_types::env_utils::env_var_or;
use tvx_types::{
    Base64Bytes, BlockHeader, BlockMessages, ChainClient, ObjectFetcher, TipSet, TipSetKey,
    TokenAmount,
};

use crate::api_info::ApiInfo;

/// JSON-RPC client for a full node.
pub struct LotusClient {
    endpoint: String,
    token: Option<String>,
    agent: ureq::Agent,
    next_id: AtomicU64,
}

// Wire shapes returned by the node. Only the fields tvx reads are declared.

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTipSet {
    #[serde(with = "cid_json::vec")]
    cids: Vec<Cid>,
    blocks: Vec<WireBlockHeader>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireBlockHeader {
    miner: String,
    #[serde(with = "cid_json::vec")]
    parents: Vec<Cid>,
    height: i64,
    #[serde(with = "cid_json")]
    parent_state_root: Cid,
    parent_base_fee: TokenAmount,
    #[serde(default)]
    election_proof: Option<WireElectionProof>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireElectionProof {
    win_count: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireBlockMessages {
    #[serde(default)]
    bls_messages: Option<Vec<Value>>,
    #[serde(default)]
    secpk_messages: Option<Vec<Value>>,
    /// All message CIDs, BLS messages first.
    #[serde(with = "cid_json::vec")]
    cids: Vec<Cid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireVersion {
    version: String,
}

impl WireTipSet {
    fn into_tipset(self) -> Result<TipSet> {
        if self.cids.len() != self.blocks.len() {
            return Err(anyhow!(
                "tipset has {} cids but {} blocks",
                self.cids.len(),
                self.blocks.len()
            ));
        }
        let blocks = self
            .cids
            .into_iter()
            .zip(self.blocks)
            .map(|(cid, b)| BlockHeader {
                cid,
                miner: b.miner,
                height: b.height,
                parents: TipSetKey::new(b.parents),
                parent_state_root: b.parent_state_root,
                parent_base_fee: b.parent_base_fee,
                win_count: b.election_proof.map(|p| p.win_count).unwrap_or(0),
            })
            .collect();
        TipSet::new(blocks)
    }
}

impl WireBlockMessages {
    fn into_block_messages(mut self) -> Result<BlockMessages> {
        let bls = self.bls_messages.map(|m| m.len()).unwrap_or(0);
        let secp = self.secpk_messages.map(|m| m.len()).unwrap_or(0);
        if self.cids.len() != bls + secp {
            return Err(anyhow!(
                "block lists {} message cids for {} bls and {} secp messages",
                self.cids.len(),
                bls,
                secp
            ));
        }
        let secpk_messages = self.cids.split_off(bls);
        Ok(BlockMessages {
            bls_messages: self.cids,
            secpk_messages,
        })
    }
}

impl LotusClient {
    /// Default request timeout in seconds (can be overridden by env).
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    /// Default connect timeout in seconds (can be overridden by env).
    const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

    fn default_timeouts() -> (Duration, Duration) {
        let timeout_secs = env_var_or("TVX_RPC_TIMEOUT_SECS", Self::DEFAULT_TIMEOUT_SECS);
        let connect_secs = env_var_or(
            "TVX_RPC_CONNECT_TIMEOUT_SECS",
            Self::DEFAULT_CONNECT_TIMEOUT_SECS,
        );
        (
            Duration::from_secs(timeout_secs),
            Duration::from_secs(connect_secs),
        )
    }

    fn build_agent(timeout: Duration, connect_timeout: Duration) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(timeout)
            .timeout_connect(connect_timeout)
            .build()
    }

    /// Create a client for an endpoint URL.
    pub fn new(endpoint: &str, token: Option<String>) -> Self {
        let (timeout, connect_timeout) = Self::default_timeouts();
        Self::with_timeouts(endpoint, token, timeout, connect_timeout)
    }

    /// Create a client with explicit timeouts.
    pub fn with_timeouts(
        endpoint: &str,
        token: Option<String>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            token,
            agent: Self::build_agent(timeout, connect_timeout),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_api_info(info: &ApiInfo) -> Self {
        Self::new(&info.url, info.token.clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute a JSON-RPC call and decode its `result`.
    fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        debug!(method, id, "rpc call");

        let mut request = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }
        let response: Value = request
            .send_json(&body)
            .map_err(|e| anyhow!("RPC request {} failed: {}", method, e))?
            .into_json()
            .map_err(|e| anyhow!("Failed to parse {} response: {}", method, e))?;

        decode_response(method, response)
    }
}

fn decode_response<T: DeserializeOwned>(method: &str, mut response: Value) -> Result<T> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        let msg = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(anyhow!("{} failed: {}", method, msg));
    }
    let result = response
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| anyhow!("No result in {} response", method))?;
    serde_json::from_value(result).map_err(|e| anyhow!("Failed to decode {} result: {}", method, e))
}

fn key_param(key: &TipSetKey) -> Result<Value> {
    serde_json::to_value(key).map_err(|e| anyhow!("Failed to encode tipset key: {}", e))
}

impl ChainClient for LotusClient {
    fn chain_head(&self) -> Result<TipSet> {
        self.call::<WireTipSet>("Filecoin.ChainHead", json!([]))?
            .into_tipset()
    }

    fn get_tipset(&self, key: &TipSetKey) -> Result<TipSet> {
        self.call::<WireTipSet>("Filecoin.ChainGetTipSet", json!([key_param(key)?]))?
            .into_tipset()
    }

    fn get_tipset_by_height(&self, height: i64, anchor: &TipSetKey) -> Result<TipSet> {
        self.call::<WireTipSet>(
            "Filecoin.ChainGetTipSetByHeight",
            json!([height, key_param(anchor)?]),
        )?
        .into_tipset()
    }

    fn get_block_messages(&self, block: &Cid) -> Result<BlockMessages> {
        self.call::<WireBlockMessages>(
            "Filecoin.ChainGetBlockMessages",
            json!([{ "/": block.to_string() }]),
        )?
        .into_block_messages()
    }

    fn network_version(&self, key: &TipSetKey) -> Result<u32> {
        self.call("Filecoin.StateNetworkVersion", json!([key_param(key)?]))
    }

    fn network_name(&self) -> Result<String> {
        self.call("Filecoin.StateNetworkName", json!([]))
    }

    fn version(&self) -> Result<String> {
        Ok(self
            .call::<WireVersion>("Filecoin.Version", json!([]))?
            .version)
    }

    fn randomness_from_tickets(
        &self,
        dst: i64,
        epoch: i64,
        entropy: &[u8],
        key: &TipSetKey,
    ) -> Result<Vec<u8>> {
        let value: Base64Bytes = self.call(
            "Filecoin.StateGetRandomnessFromTickets",
            json!([dst, epoch, Base64Bytes::from(entropy), key_param(key)?]),
        )?;
        Ok(value.into_inner())
    }

    fn randomness_from_beacon(
        &self,
        dst: i64,
        epoch: i64,
        entropy: &[u8],
        key: &TipSetKey,
    ) -> Result<Vec<u8>> {
        let value: Base64Bytes = self.call(
            "Filecoin.StateGetRandomnessFromBeacon",
            json!([dst, epoch, Base64Bytes::from(entropy), key_param(key)?]),
        )?;
        Ok(value.into_inner())
    }
}

impl ObjectFetcher for LotusClient {
    fn read_obj(&self, cid: &Cid) -> Result<Vec<u8>> {
        let value: Base64Bytes =
            self.call("Filecoin.ChainReadObj", json!([{ "/": cid.to_string() }]))?;
        Ok(value.into_inner())
    }
}
