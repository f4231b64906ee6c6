//! A toy execution engine.
//!
//! State root: `{"actors": [link, ...]}`. Actor: `{"balance": int}`.
//! Message: `[actor_index, amount]`. Applying a message reads the root and
//! the target actor, draws chain randomness keyed on the message bytes, and
//! writes the updated actor and root. The receipt returns the first four
//! randomness bytes. An out-of-range index exits with code 16.

use anyhow::Result;
use cid::Cid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tvx_blockstore::dagcbor::{self, Ipld};
use tvx_blockstore::{Blockstore, DAG_CBOR};
use tvx_conformance::{
    ExecuteMessageParams, ExecuteMessageResult, ExecuteTipsetParams, ExecuteTipsetResult,
    ExecutionEngine, Rand,
};
use tvx_types::{Base64Bytes, Receipt};

pub const RANDOMNESS_DST: i64 = 1;
pub const EXIT_NOT_FOUND: i64 = 16;

#[derive(Serialize, Deserialize)]
struct StateRoot {
    actors: Vec<Cid>,
}

#[derive(Serialize, Deserialize)]
struct Actor {
    balance: i64,
}

pub fn encode_message(actor: u64, amount: u64) -> Vec<u8> {
    dagcbor::encode(&(actor, amount)).unwrap()
}

pub fn encode_state(actors: &[Cid]) -> Vec<u8> {
    dagcbor::encode(&StateRoot {
        actors: actors.to_vec(),
    })
    .unwrap()
}

pub fn encode_actor(balance: i64) -> Vec<u8> {
    dagcbor::encode(&Actor { balance }).unwrap()
}

#[derive(Default)]
pub struct ToyEngine {
    /// Execution epochs of every `execute_tipset` call, in call order.
    pub executed: Mutex<Vec<i64>>,
    /// Parent epochs seen by `execute_tipset`.
    pub parent_epochs: Mutex<Vec<i64>>,
}

impl ToyEngine {
    fn apply(
        &self,
        store: &dyn Blockstore,
        root: Cid,
        message: &[u8],
        epoch: i64,
        rand: &dyn Rand,
    ) -> Result<(Cid, Receipt)> {
        let StateRoot { mut actors } = dagcbor::decode(&store.get_required(&root)?)?;
        let (index, amount): (usize, i64) = dagcbor::decode(message)?;

        let randomness = rand.get_chain_randomness(RANDOMNESS_DST, epoch, message)?;
        let gas_used = 100 + message.len() as i64;

        let Some(actor_cid) = actors.get(index).copied() else {
            return Ok((
                root,
                Receipt {
                    exit_code: EXIT_NOT_FOUND,
                    return_value: Base64Bytes::default(),
                    gas_used,
                },
            ));
        };

        let actor: Actor = dagcbor::decode(&store.get_required(&actor_cid)?)?;
        actors[index] = store.put(DAG_CBOR, &encode_actor(actor.balance + amount))?;
        let new_root = store.put(DAG_CBOR, &encode_state(&actors))?;

        Ok((
            new_root,
            Receipt {
                exit_code: 0,
                return_value: Base64Bytes(randomness.iter().take(4).copied().collect()),
                gas_used,
            },
        ))
    }
}

fn encode_receipts(receipts: &[Receipt]) -> Vec<u8> {
    let receipts: Vec<Ipld> = receipts
        .iter()
        .map(|r| {
            Ipld::List(vec![
                Ipld::Integer(r.exit_code.into()),
                Ipld::Bytes(r.return_value.to_vec()),
                Ipld::Integer(r.gas_used.into()),
            ])
        })
        .collect();
    dagcbor::encode(&receipts).unwrap()
}

impl ExecutionEngine for ToyEngine {
    fn name(&self) -> &str {
        "toy"
    }

    fn execute_tipset(
        &self,
        store: &dyn Blockstore,
        params: &ExecuteTipsetParams<'_>,
    ) -> Result<ExecuteTipsetResult> {
        self.executed.lock().push(params.exec_epoch);
        self.parent_epochs.lock().push(params.parent_epoch);

        let mut root = params.preroot;
        let mut receipts = Vec::new();
        for block in &params.tipset.blocks {
            for message in &block.messages {
                let (next, receipt) =
                    self.apply(store, root, message, params.exec_epoch, params.rand)?;
                root = next;
                receipts.push(receipt);
            }
        }
        let receipts_root = store.put(DAG_CBOR, &encode_receipts(&receipts))?;
        Ok(ExecuteTipsetResult {
            post_state_root: root,
            receipts_root,
            applied_results: receipts,
        })
    }

    fn execute_message(
        &self,
        store: &dyn Blockstore,
        params: &ExecuteMessageParams<'_>,
    ) -> Result<ExecuteMessageResult> {
        let (post_state_root, receipt) =
            self.apply(store, params.preroot, params.message, params.epoch, params.rand)?;
        Ok(ExecuteMessageResult {
            receipt,
            post_state_root,
        })
    }
}
