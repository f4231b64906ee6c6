//! Shared types for the tvx workspace.
//!
//! This crate provides foundational types used across the workspace crates:
//!
//! - [`schema`]: the portable test-vector format ([`TestVector`] and friends)
//! - [`codec`]: JSON codecs for CIDs, base64 byte strings and token amounts
//! - [`chain`]: chain data ([`TipSet`], [`BlockHeader`]) and the collaborator
//!   traits the extraction side consumes ([`ChainClient`], [`ObjectFetcher`])
//! - [`encoding`], [`env_utils`], [`paths`]: small helpers

pub mod chain;
pub mod codec;
pub mod encoding;
pub mod env_utils;
pub mod paths;
pub mod schema;

pub use chain::{BlockHeader, BlockMessages, ChainClient, ObjectFetcher, TipSet, TipSetKey, TipSetRef};
pub use codec::{Base64Bytes, TokenAmount};
pub use schema::{
    ApplyMessage, Block, Class, GenerationData, Metadata, Postconditions, Preconditions,
    RandomnessKind, RandomnessMatch, RandomnessRule, Receipt, Selector, StateTree, TestVector,
    Tipset, Variant, SELECTOR_MIN_PROTOCOL_VERSION,
};

/// Re-exported so downstream crates agree on a single CID type.
pub use cid::Cid;
