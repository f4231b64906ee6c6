//! Chain data and the collaborator traits extraction depends on.
//!
//! Only the header fields that vector assembly reads are modelled.
//! Node-specific wire formats live in `tvx-transport`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use cid::Cid;
use serde::{Deserialize, Serialize};

use crate::codec::{cid_json, TokenAmount};

/// Ordered list of block CIDs identifying a tipset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TipSetKey(#[serde(with = "cid_json::vec")] Vec<Cid>);

impl TipSetKey {
    pub fn new(cids: Vec<Cid>) -> Self {
        Self(cids)
    }

    pub fn cids(&self) -> &[Cid] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Cid>> for TipSetKey {
    fn from(cids: Vec<Cid>) -> Self {
        Self(cids)
    }
}

impl fmt::Display for TipSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, cid) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", cid)?;
        }
        f.write_str("}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    #[serde(with = "cid_json")]
    pub cid: Cid,
    pub miner: String,
    pub height: i64,
    pub parents: TipSetKey,
    #[serde(with = "cid_json")]
    pub parent_state_root: Cid,
    pub parent_base_fee: TokenAmount,
    pub win_count: i64,
}

/// A validated, non-empty set of blocks at the same height with the same parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipSet {
    key: TipSetKey,
    blocks: Vec<BlockHeader>,
}

impl TipSet {
    pub fn new(blocks: Vec<BlockHeader>) -> Result<Self> {
        let Some(first) = blocks.first() else {
            bail!("tipset must contain at least one block");
        };
        for block in &blocks[1..] {
            if block.height != first.height {
                bail!(
                    "block {} has height {}, expected {}",
                    block.cid,
                    block.height,
                    first.height
                );
            }
            if block.parents != first.parents {
                bail!("block {} has mismatching parents", block.cid);
            }
            if block.parent_state_root != first.parent_state_root {
                bail!("block {} has mismatching parent state root", block.cid);
            }
        }
        let key = TipSetKey::new(blocks.iter().map(|b| b.cid).collect());
        Ok(Self { key, blocks })
    }

    pub fn key(&self) -> &TipSetKey {
        &self.key
    }

    pub fn height(&self) -> i64 {
        self.blocks[0].height
    }

    pub fn blocks(&self) -> &[BlockHeader] {
        &self.blocks
    }

    pub fn parents(&self) -> &TipSetKey {
        &self.blocks[0].parents
    }

    /// State root this tipset's messages execute against.
    pub fn parent_state(&self) -> Cid {
        self.blocks[0].parent_state_root
    }

    pub fn parent_base_fee(&self) -> &TokenAmount {
        &self.blocks[0].parent_base_fee
    }
}

/// Message CIDs included by one block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMessages {
    #[serde(with = "cid_json::vec")]
    pub bls_messages: Vec<Cid>,
    #[serde(with = "cid_json::vec")]
    pub secpk_messages: Vec<Cid>,
}

/// A reference to one tipset: `@head`, `@<height>`, or a comma-separated list
/// of block CIDs, optionally wrapped in `{}` as [`TipSetKey`] displays it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TipSetRef {
    Head,
    Height(i64),
    Key(TipSetKey),
}

impl FromStr for TipSetRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("tipset key cannot be empty");
        }
        if s == "@head" {
            return Ok(TipSetRef::Head);
        }
        if let Some(height) = s.strip_prefix('@') {
            let height: i64 = height
                .parse()
                .map_err(|e| anyhow!("invalid tipset height '{}': {}", height, e))?;
            if height < 0 {
                bail!("invalid tipset height '{}': must not be negative", height);
            }
            return Ok(TipSetRef::Height(height));
        }
        let list = match s.strip_prefix('{') {
            Some(inner) => inner
                .strip_suffix('}')
                .ok_or_else(|| anyhow!("unbalanced braces in tipset key '{}'", s))?,
            None => s,
        };
        let cids = list
            .split(',')
            .map(|part| {
                let part = part.trim();
                Cid::from_str(part).map_err(|e| anyhow!("invalid block cid '{}': {}", part, e))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TipSetRef::Key(TipSetKey::new(cids)))
    }
}

impl fmt::Display for TipSetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TipSetRef::Head => f.write_str("@head"),
            TipSetRef::Height(h) => write!(f, "@{}", h),
            TipSetRef::Key(key) => {
                let parts: Vec<String> = key.cids().iter().map(Cid::to_string).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

/// Read access to a live chain.
pub trait ChainClient: Send + Sync {
    fn chain_head(&self) -> Result<TipSet>;

    fn get_tipset(&self, key: &TipSetKey) -> Result<TipSet>;

    /// Tipset at `height` on the chain ending at `anchor`.
    fn get_tipset_by_height(&self, height: i64, anchor: &TipSetKey) -> Result<TipSet>;

    fn get_block_messages(&self, block: &Cid) -> Result<BlockMessages>;

    fn network_version(&self, key: &TipSetKey) -> Result<u32>;

    fn network_name(&self) -> Result<String>;

    /// Human-readable client version, recorded in vector provenance.
    fn version(&self) -> Result<String>;

    fn randomness_from_tickets(
        &self,
        dst: i64,
        epoch: i64,
        entropy: &[u8],
        key: &TipSetKey,
    ) -> Result<Vec<u8>>;

    fn randomness_from_beacon(
        &self,
        dst: i64,
        epoch: i64,
        entropy: &[u8],
        key: &TipSetKey,
    ) -> Result<Vec<u8>>;
}

/// Fetch raw object bytes by identifier from a remote source.
pub trait ObjectFetcher: Send + Sync {
    fn read_obj(&self, cid: &Cid) -> Result<Vec<u8>>;
}

impl<T: ObjectFetcher + ?Sized> ObjectFetcher for Arc<T> {
    fn read_obj(&self, cid: &Cid) -> Result<Vec<u8>> {
        (**self).read_obj(cid)
    }
}

impl<T: ObjectFetcher + ?Sized> ObjectFetcher for &T {
    fn read_obj(&self, cid: &Cid) -> Result<Vec<u8>> {
        (**self).read_obj(cid)
    }
}

impl<T: ChainClient + ?Sized> ChainClient for Arc<T> {
    fn chain_head(&self) -> Result<TipSet> {
        (**self).chain_head()
    }

    fn get_tipset(&self, key: &TipSetKey) -> Result<TipSet> {
        (**self).get_tipset(key)
    }

    fn get_tipset_by_height(&self, height: i64, anchor: &TipSetKey) -> Result<TipSet> {
        (**self).get_tipset_by_height(height, anchor)
    }

    fn get_block_messages(&self, block: &Cid) -> Result<BlockMessages> {
        (**self).get_block_messages(block)
    }

    fn network_version(&self, key: &TipSetKey) -> Result<u32> {
        (**self).network_version(key)
    }

    fn network_name(&self) -> Result<String> {
        (**self).network_name()
    }

    fn version(&self) -> Result<String> {
        (**self).version()
    }

    fn randomness_from_tickets(
        &self,
        dst: i64,
        epoch: i64,
        entropy: &[u8],
        key: &TipSetKey,
    ) -> Result<Vec<u8>> {
        (**self).randomness_from_tickets(dst, epoch, entropy, key)
    }

    fn randomness_from_beacon(
        &self,
        dst: i64,
        epoch: i64,
        entropy: &[u8],
        key: &TipSetKey,
    ) -> Result<Vec<u8>> {
        (**self).randomness_from_beacon(dst, epoch, entropy, key)
    }
}
