//! Typed error kinds for extraction and replay.
//!
//! Everything propagates as `anyhow::Error`; these kinds are attached at the
//! point of failure so callers can classify with [`ConformanceError::find`].

use cid::Cid;
use tvx_types::RandomnessKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConformanceError {
    /// Malformed or unsupported user input (tipset reference, retention
    /// strategy, missing output directory).
    InvalidInput(String),

    /// The runtime wiring cannot satisfy the request, e.g. a store without
    /// tracing capability.
    Configuration(String),

    /// A required object is absent from the store.
    MissingObject {
        cid: Cid,
    },

    /// An object was traced during execution but cannot be read back while
    /// writing the archive.
    BrokenClosure {
        cid: Cid,
        /// The object linking to `cid`.
        parent: Cid,
    },

    /// Replay asked for a randomness draw that was never recorded.
    DeterminismViolation {
        kind: RandomnessKind,
        dst: i64,
        epoch: i64,
        entropy: Vec<u8>,
    },

    /// Vector class other than `message` or `tipset`.
    UnsupportedClass(String),
}

impl std::fmt::Display for ConformanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConformanceError::InvalidInput(msg) | ConformanceError::Configuration(msg) => {
                write!(f, "{}", msg)
            }
            ConformanceError::MissingObject { cid } => {
                write!(f, "object {} not found in block store", cid)
            }
            ConformanceError::BrokenClosure { cid, parent } => write!(
                f,
                "broken closure: {} (linked from {}) was accessed but is not in the store",
                cid, parent
            ),
            ConformanceError::DeterminismViolation {
                kind,
                dst,
                epoch,
                entropy,
            } => write!(
                f,
                "determinism violation: no recorded {} randomness for dst={} epoch={} entropy={}",
                kind,
                dst,
                epoch,
                hex::encode(entropy)
            ),
            ConformanceError::UnsupportedClass(class) => {
                write!(f, "test vector class {} not supported", class)
            }
        }
    }
}

impl std::error::Error for ConformanceError {}

impl From<tvx_blockstore::MissingObject> for ConformanceError {
    fn from(e: tvx_blockstore::MissingObject) -> Self {
        ConformanceError::MissingObject { cid: e.cid }
    }
}

impl ConformanceError {
    /// First typed conformance error anywhere in the chain of `err`.
    pub fn find(err: &anyhow::Error) -> Option<&ConformanceError> {
        err.chain().find_map(|e| e.downcast_ref::<ConformanceError>())
    }

    pub fn is_determinism_violation(err: &anyhow::Error) -> bool {
        matches!(
            Self::find(err),
            Some(ConformanceError::DeterminismViolation { .. })
        )
    }

    /// True when `err` stems from an absent object, whether raised by a
    /// store or by conformance code.
    pub fn is_missing_object(err: &anyhow::Error) -> bool {
        err.chain().any(|e| {
            e.downcast_ref::<tvx_blockstore::MissingObject>().is_some()
                || matches!(
                    e.downcast_ref::<ConformanceError>(),
                    Some(ConformanceError::MissingObject { .. })
                )
        })
    }

    pub fn is_input_error(err: &anyhow::Error) -> bool {
        matches!(
            Self::find(err),
            Some(ConformanceError::InvalidInput(_) | ConformanceError::UnsupportedClass(_))
        )
    }
}
