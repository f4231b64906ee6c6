//! The execution-engine seam.
//!
//! tvx never implements the state transition itself. Extraction and replay
//! drive an [`ExecutionEngine`] through a store and a randomness source.

use anyhow::Result;
use cid::Cid;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use tvx_blockstore::Blockstore;
use tvx_types::codec::cid_json;
use tvx_types::{Receipt, Selector, Tipset, TokenAmount};

use crate::rand::Rand;

/// Default base fee for message-class vectors that do not set one.
pub const DEFAULT_BASE_FEE: u64 = 100;

/// Default circulating supply for message-class vectors: 2 billion whole
/// tokens, in atto units.
pub fn default_circ_supply() -> TokenAmount {
    TokenAmount(BigInt::from(2u32) * BigInt::from(10u32).pow(27))
}

pub struct ExecuteTipsetParams<'a> {
    pub preroot: Cid,
    pub parent_epoch: i64,
    pub exec_epoch: i64,
    pub network_version: u32,
    pub tipset: &'a Tipset,
    pub rand: &'a dyn Rand,
    /// Keep all writes in the supplied store and skip flushing into any
    /// engine-owned long-lived state. Set during extraction.
    pub disable_vm_flush: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteTipsetResult {
    #[serde(with = "cid_json")]
    pub post_state_root: Cid,
    #[serde(with = "cid_json")]
    pub receipts_root: Cid,
    /// One receipt per applied message, in application order.
    #[serde(default)]
    pub applied_results: Vec<Receipt>,
}

pub struct ExecuteMessageParams<'a> {
    pub preroot: Cid,
    pub epoch: i64,
    pub network_version: u32,
    /// Serialized unsigned message.
    pub message: &'a [u8],
    pub base_fee: TokenAmount,
    pub circ_supply: TokenAmount,
    pub rand: &'a dyn Rand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteMessageResult {
    pub receipt: Receipt,
    #[serde(with = "cid_json")]
    pub post_state_root: Cid,
}

/// An engine able to apply tipsets and messages to a state tree held in a
/// [`Blockstore`].
///
/// Every state object the engine reads must be read through `store`; that is
/// how extraction learns the closure to archive.
pub trait ExecutionEngine: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether this engine can run vectors with the given selector.
    /// Declined vectors are reported as skipped.
    fn supports(&self, _selector: &Selector) -> bool {
        true
    }

    fn execute_tipset(
        &self,
        store: &dyn Blockstore,
        params: &ExecuteTipsetParams<'_>,
    ) -> Result<ExecuteTipsetResult>;

    fn execute_message(
        &self,
        store: &dyn Blockstore,
        params: &ExecuteMessageParams<'_>,
    ) -> Result<ExecuteMessageResult>;
}
