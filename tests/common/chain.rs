//! An in-memory chain.
//!
//! Heights `first..=last` each hold one tipset of one block. Every tipset
//! shares the genesis state as its parent state and carries one BLS and one
//! secp message.

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, Result};
use cid::Cid;
use parking_lot::Mutex;
use tvx_blockstore::dagcbor::{self, Ipld};
use tvx_blockstore::{cid_for, DAG_CBOR, RAW};
use tvx_types::{
    BlockHeader, BlockMessages, ChainClient, ObjectFetcher, TipSet, TipSetKey, TokenAmount,
};

use super::engine::{encode_actor, encode_message, encode_state};

/// Balances of the genesis actors.
pub const GENESIS_ACTORS: [i64; 4] = [1_000, 2_000, 3_000, 4_000];
pub const NETWORK_VERSION: u32 = 21;

pub struct MockChain {
    tipsets: BTreeMap<i64, TipSet>,
    messages: HashMap<Cid, BlockMessages>,
    objects: HashMap<Cid, Vec<u8>>,
    pub genesis_root: Cid,
    pub genesis_actors: Vec<Cid>,
    /// Objects served through `read_obj`, in request order.
    pub reads: Mutex<Vec<Cid>>,
}

impl MockChain {
    pub fn new(first: i64, last: i64) -> Self {
        let mut objects = HashMap::new();
        let mut put = |codec: u64, data: Vec<u8>| {
            let cid = cid_for(codec, &data);
            objects.insert(cid, data);
            cid
        };

        let genesis_actors: Vec<Cid> = GENESIS_ACTORS
            .iter()
            .map(|balance| put(DAG_CBOR, encode_actor(*balance)))
            .collect();
        let genesis_root = put(DAG_CBOR, encode_state(&genesis_actors));

        let mut tipsets = BTreeMap::new();
        let mut messages = HashMap::new();
        let mut parents = TipSetKey::default();
        for height in first..=last {
            let bls = put(DAG_CBOR, encode_message(0, height as u64));
            let unsigned: Ipld = dagcbor::decode(&encode_message(2, 7)).unwrap();
            let signed =
                dagcbor::encode(&Ipld::List(vec![unsigned, Ipld::Bytes(vec![0xaa; 65])])).unwrap();
            let secp = put(DAG_CBOR, signed);

            let header = BlockHeader {
                cid: cid_for(RAW, format!("block-{}", height).as_bytes()),
                miner: "f01000".into(),
                height,
                parents: parents.clone(),
                parent_state_root: genesis_root,
                parent_base_fee: TokenAmount::from_atto(100),
                win_count: 1,
            };
            messages.insert(
                header.cid,
                BlockMessages {
                    bls_messages: vec![bls],
                    secpk_messages: vec![secp],
                },
            );
            let tipset = TipSet::new(vec![header]).unwrap();
            parents = tipset.key().clone();
            tipsets.insert(height, tipset);
        }

        Self {
            tipsets,
            messages,
            objects,
            genesis_root,
            genesis_actors,
            reads: Mutex::new(Vec::new()),
        }
    }

    pub fn tipset(&self, height: i64) -> &TipSet {
        &self.tipsets[&height]
    }

    /// Tipset reference string for `height` in block-CID form.
    pub fn key_ref(&self, height: i64) -> String {
        self.tipset(height)
            .key()
            .cids()
            .iter()
            .map(Cid::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn mock_randomness(tag: u8, dst: i64, epoch: i64, entropy: &[u8]) -> Vec<u8> {
    let mut seed = Vec::with_capacity(entropy.len() + 17);
    seed.push(tag);
    seed.extend_from_slice(&dst.to_be_bytes());
    seed.extend_from_slice(&epoch.to_be_bytes());
    seed.extend_from_slice(entropy);
    cid_for(RAW, &seed).hash().digest().to_vec()
}

impl ChainClient for MockChain {
    fn chain_head(&self) -> Result<TipSet> {
        self.tipsets
            .values()
            .next_back()
            .cloned()
            .ok_or_else(|| anyhow!("empty chain"))
    }

    fn get_tipset(&self, key: &TipSetKey) -> Result<TipSet> {
        self.tipsets
            .values()
            .find(|ts| ts.key() == key)
            .cloned()
            .ok_or_else(|| anyhow!("tipset {} not found", key))
    }

    fn get_tipset_by_height(&self, height: i64, _anchor: &TipSetKey) -> Result<TipSet> {
        self.tipsets
            .get(&height)
            .cloned()
            .ok_or_else(|| anyhow!("no tipset at height {}", height))
    }

    fn get_block_messages(&self, block: &Cid) -> Result<BlockMessages> {
        self.messages
            .get(block)
            .cloned()
            .ok_or_else(|| anyhow!("block {} not found", block))
    }

    fn network_version(&self, _key: &TipSetKey) -> Result<u32> {
        Ok(NETWORK_VERSION)
    }

    fn network_name(&self) -> Result<String> {
        Ok("testnet".into())
    }

    fn version(&self) -> Result<String> {
        Ok("1.0.0-mock".into())
    }

    fn randomness_from_tickets(
        &self,
        dst: i64,
        epoch: i64,
        entropy: &[u8],
        _key: &TipSetKey,
    ) -> Result<Vec<u8>> {
        Ok(mock_randomness(b'c', dst, epoch, entropy))
    }

    fn randomness_from_beacon(
        &self,
        dst: i64,
        epoch: i64,
        entropy: &[u8],
        _key: &TipSetKey,
    ) -> Result<Vec<u8>> {
        Ok(mock_randomness(b'b', dst, epoch, entropy))
    }
}

impl ObjectFetcher for MockChain {
    fn read_obj(&self, cid: &Cid) -> Result<Vec<u8>> {
        self.reads.lock().push(*cid);
        self.objects
            .get(cid)
            .cloned()
            .ok_or_else(|| anyhow!("object {} not found on node", cid))
    }
}
