//! The portable test-vector format.
//!
//! A vector is a single JSON document that carries everything needed to replay
//! a slice of chain history: the starting state (as a gzipped CAR archive plus a
//! root), the messages or tipsets to apply, the randomness that was drawn, and
//! the expected end state.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use cid::Cid;
use serde::{Deserialize, Deserializer, Serialize};

use crate::codec::{cid_json, Base64Bytes, TokenAmount};
use crate::paths::atomic_write_json;

/// Selector key naming the oldest protocol version able to run a vector.
pub const SELECTOR_MIN_PROTOCOL_VERSION: &str = "min_protocol_version";

/// Free-form engine requirements, e.g. `min_protocol_version`.
pub type Selector = BTreeMap<String, String>;

/// Lotus writes absent collections as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Vector class. Unknown classes still parse so that a replay run can report
/// them per vector instead of failing to load the file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Class {
    Message,
    Tipset,
    Other(String),
}

impl Class {
    pub fn as_str(&self) -> &str {
        match self {
            Class::Message => "message",
            Class::Tipset => "tipset",
            Class::Other(s) => s,
        }
    }
}

impl From<String> for Class {
    fn from(s: String) -> Self {
        match s.as_str() {
            "message" => Class::Message,
            "tipset" => Class::Tipset,
            _ => Class::Other(s),
        }
    }
}

impl From<Class> for String {
    fn from(class: Class) -> Self {
        class.as_str().to_string()
    }
}

impl std::fmt::Display for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub gen: Vec<GenerationData>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tags: Vec<String>,
}

/// Provenance entry, e.g. `network:mainnet` or `tipset:{...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationData {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl GenerationData {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            version: None,
        }
    }

    pub fn with_version(source: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            version: Some(version.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RandomnessKind {
    Chain,
    Beacon,
}

impl std::fmt::Display for RandomnessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RandomnessKind::Chain => f.write_str("chain"),
            RandomnessKind::Beacon => f.write_str("beacon"),
        }
    }
}

/// The parameters of one randomness draw. Written as
/// `[kind, dst, epoch, entropy]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    from = "(RandomnessKind, i64, i64, Base64Bytes)",
    into = "(RandomnessKind, i64, i64, Base64Bytes)"
)]
pub struct RandomnessRule {
    pub kind: RandomnessKind,
    pub dst: i64,
    pub epoch: i64,
    pub entropy: Base64Bytes,
}

impl From<(RandomnessKind, i64, i64, Base64Bytes)> for RandomnessRule {
    fn from((kind, dst, epoch, entropy): (RandomnessKind, i64, i64, Base64Bytes)) -> Self {
        Self {
            kind,
            dst,
            epoch,
            entropy,
        }
    }
}

impl From<RandomnessRule> for (RandomnessKind, i64, i64, Base64Bytes) {
    fn from(rule: RandomnessRule) -> Self {
        (rule.kind, rule.dst, rule.epoch, rule.entropy)
    }
}

/// A recorded draw and the value it returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessMatch {
    pub on: RandomnessRule,
    pub ret: Base64Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTree {
    #[serde(with = "cid_json")]
    pub root_cid: Cid,
}

impl StateTree {
    pub fn new(root_cid: Cid) -> Self {
        Self { root_cid }
    }
}

/// One protocol configuration a vector is valid under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub epoch: i64,
    #[serde(rename = "nv", alias = "network_version")]
    pub network_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preconditions {
    #[serde(default, deserialize_with = "null_as_default")]
    pub variants: Vec<Variant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basefee: Option<TokenAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circ_supply: Option<TokenAmount>,
    pub state_tree: StateTree,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Postconditions {
    pub state_tree: StateTree,
    #[serde(
        default,
        with = "cid_json::vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub receipts_roots: Vec<Cid>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub receipts: Vec<Receipt>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub exit_code: i64,
    #[serde(default, alias = "return")]
    pub return_value: Base64Bytes,
    pub gas_used: i64,
}

/// A single message to apply (message-class vectors).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyMessage {
    pub bytes: Base64Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_offset: Option<i64>,
}

/// A tipset to apply (tipset-class vectors).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tipset {
    #[serde(default)]
    pub epoch_offset: i64,
    pub basefee: TokenAmount,
    #[serde(default, deserialize_with = "null_as_default")]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub miner_addr: String,
    pub win_count: i64,
    /// Unsigned messages, exactly as committed on chain.
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<Base64Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVector {
    pub class: Class,
    #[serde(default)]
    pub meta: Metadata,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub selector: Selector,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub randomness: Vec<RandomnessMatch>,
    /// Gzip-compressed CARv1 archive holding the state closure.
    pub car: Base64Bytes,
    pub preconditions: Preconditions,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub apply_messages: Vec<ApplyMessage>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub apply_tipsets: Vec<Tipset>,
    pub postconditions: Postconditions,
}

impl TestVector {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| anyhow!("Failed to parse test vector: {}", e))
    }

    /// Load a vector from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow!("Failed to read vector {}: {}", path.display(), e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| anyhow!("Failed to parse vector {}: {}", path.display(), e))
    }

    /// Write the vector as indented JSON, atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self)
    }

    /// The `min_protocol_version` selector entry, if present.
    pub fn min_protocol_version(&self) -> Option<&str> {
        self.selector
            .get(SELECTOR_MIN_PROTOCOL_VERSION)
            .map(String::as_str)
    }
}
