//! Randomness sources handed to execution engines.
//!
//! During extraction a [`RecordingRand`] forwards every draw to the live chain
//! and logs it. During replay a [`ReplayingRand`] answers from that log only.

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::debug;
use tvx_types::{
    Base64Bytes, ChainClient, RandomnessKind, RandomnessMatch, RandomnessRule, TipSetKey,
};

use crate::errors::ConformanceError;

/// Randomness interface consumed by engines.
pub trait Rand: Send + Sync {
    fn get_chain_randomness(&self, dst: i64, epoch: i64, entropy: &[u8]) -> Result<Vec<u8>>;

    fn get_beacon_randomness(&self, dst: i64, epoch: i64, entropy: &[u8]) -> Result<Vec<u8>>;

    /// Dispatch on the draw kind.
    fn get_randomness(
        &self,
        kind: RandomnessKind,
        dst: i64,
        epoch: i64,
        entropy: &[u8],
    ) -> Result<Vec<u8>> {
        match kind {
            RandomnessKind::Chain => self.get_chain_randomness(dst, epoch, entropy),
            RandomnessKind::Beacon => self.get_beacon_randomness(dst, epoch, entropy),
        }
    }
}

/// Forwards draws to a live chain, anchored at the chain head (loaded once on
/// first use), and records every `(rule, value)` pair in call order.
pub struct RecordingRand {
    client: Arc<dyn ChainClient>,
    head: Mutex<Option<TipSetKey>>,
    recorded: Mutex<Vec<RandomnessMatch>>,
}

impl RecordingRand {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self {
            client,
            head: Mutex::new(None),
            recorded: Mutex::new(Vec::new()),
        }
    }

    fn head(&self) -> Result<TipSetKey> {
        let mut head = self.head.lock();
        if let Some(key) = head.as_ref() {
            return Ok(key.clone());
        }
        let ts = self
            .client
            .chain_head()
            .context("failed to load chain head for randomness")?;
        debug!(height = ts.height(), "anchoring randomness at chain head");
        let key = ts.key().clone();
        *head = Some(key.clone());
        Ok(key)
    }

    fn draw(&self, kind: RandomnessKind, dst: i64, epoch: i64, entropy: &[u8]) -> Result<Vec<u8>> {
        let head = self.head()?;
        let value = match kind {
            RandomnessKind::Chain => self
                .client
                .randomness_from_tickets(dst, epoch, entropy, &head),
            RandomnessKind::Beacon => self.client.randomness_from_beacon(dst, epoch, entropy, &head),
        }
        .with_context(|| format!("failed to draw {} randomness at epoch {}", kind, epoch))?;

        debug!(%kind, dst, epoch, "recorded randomness draw");
        self.recorded.lock().push(RandomnessMatch {
            on: RandomnessRule {
                kind,
                dst,
                epoch,
                entropy: Base64Bytes::from(entropy),
            },
            ret: Base64Bytes(value.clone()),
        });
        Ok(value)
    }

    /// Snapshot of the draws recorded so far.
    pub fn recorded(&self) -> Vec<RandomnessMatch> {
        self.recorded.lock().clone()
    }
}

impl Rand for RecordingRand {
    fn get_chain_randomness(&self, dst: i64, epoch: i64, entropy: &[u8]) -> Result<Vec<u8>> {
        self.draw(RandomnessKind::Chain, dst, epoch, entropy)
    }

    fn get_beacon_randomness(&self, dst: i64, epoch: i64, entropy: &[u8]) -> Result<Vec<u8>> {
        self.draw(RandomnessKind::Beacon, dst, epoch, entropy)
    }
}

/// Answers draws from a recorded log. A draw with no matching entry fails
/// with [`ConformanceError::DeterminismViolation`].
#[derive(Debug, Clone)]
pub struct ReplayingRand {
    recorded: Vec<RandomnessMatch>,
}

impl ReplayingRand {
    pub fn new(recorded: Vec<RandomnessMatch>) -> Self {
        Self { recorded }
    }

    fn lookup(&self, kind: RandomnessKind, dst: i64, epoch: i64, entropy: &[u8]) -> Result<Vec<u8>> {
        self.recorded
            .iter()
            .find(|m| {
                m.on.kind == kind && m.on.dst == dst && m.on.epoch == epoch && *m.on.entropy == *entropy
            })
            .map(|m| m.ret.0.clone())
            .ok_or_else(|| {
                ConformanceError::DeterminismViolation {
                    kind,
                    dst,
                    epoch,
                    entropy: entropy.to_vec(),
                }
                .into()
            })
    }
}

impl Rand for ReplayingRand {
    fn get_chain_randomness(&self, dst: i64, epoch: i64, entropy: &[u8]) -> Result<Vec<u8>> {
        self.lookup(RandomnessKind::Chain, dst, epoch, entropy)
    }

    fn get_beacon_randomness(&self, dst: i64, epoch: i64, entropy: &[u8]) -> Result<Vec<u8>> {
        self.lookup(RandomnessKind::Beacon, dst, epoch, entropy)
    }
}

/// The randomness mode for one execution, chosen explicitly by the caller.
pub enum Randomness {
    Recording(RecordingRand),
    Replaying(ReplayingRand),
}

impl Randomness {
    pub fn recording(client: Arc<dyn ChainClient>) -> Self {
        Randomness::Recording(RecordingRand::new(client))
    }

    pub fn replaying(recorded: Vec<RandomnessMatch>) -> Self {
        Randomness::Replaying(ReplayingRand::new(recorded))
    }

    fn source(&self) -> &dyn Rand {
        match self {
            Randomness::Recording(r) => r,
            Randomness::Replaying(r) => r,
        }
    }

    /// Draws recorded so far. Replaying sources record nothing.
    pub fn recorded(&self) -> Vec<RandomnessMatch> {
        match self {
            Randomness::Recording(r) => r.recorded(),
            Randomness::Replaying(_) => Vec::new(),
        }
    }
}

impl Rand for Randomness {
    fn get_chain_randomness(&self, dst: i64, epoch: i64, entropy: &[u8]) -> Result<Vec<u8>> {
        self.source().get_chain_randomness(dst, epoch, entropy)
    }

    fn get_beacon_randomness(&self, dst: i64, epoch: i64, entropy: &[u8]) -> Result<Vec<u8>> {
        self.source().get_beacon_randomness(dst, epoch, entropy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use cid::Cid;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tvx_types::{BlockHeader, BlockMessages, TipSet, TokenAmount};

    /// Chain stub whose randomness is a function of the draw parameters.
    #[derive(Default)]
    struct StubChain {
        head_calls: AtomicUsize,
    }

    impl ChainClient for StubChain {
        fn chain_head(&self) -> Result<TipSet> {
            self.head_calls.fetch_add(1, Ordering::SeqCst);
            TipSet::new(vec![BlockHeader {
                cid: tvx_blockstore::cid_for(tvx_blockstore::RAW, b"head"),
                miner: "f01000".into(),
                height: 500,
                parents: TipSetKey::default(),
                parent_state_root: tvx_blockstore::cid_for(tvx_blockstore::RAW, b"state"),
                parent_base_fee: TokenAmount::from_atto(100),
                win_count: 1,
            }])
        }
        fn get_tipset(&self, _: &TipSetKey) -> Result<TipSet> {
            bail!("unused")
        }
        fn get_tipset_by_height(&self, _: i64, _: &TipSetKey) -> Result<TipSet> {
            bail!("unused")
        }
        fn get_block_messages(&self, _: &Cid) -> Result<BlockMessages> {
            bail!("unused")
        }
        fn network_version(&self, _: &TipSetKey) -> Result<u32> {
            bail!("unused")
        }
        fn network_name(&self) -> Result<String> {
            bail!("unused")
        }
        fn version(&self) -> Result<String> {
            bail!("unused")
        }
        fn randomness_from_tickets(
            &self,
            dst: i64,
            epoch: i64,
            entropy: &[u8],
            _: &TipSetKey,
        ) -> Result<Vec<u8>> {
            Ok([&[b'c', dst as u8, epoch as u8][..], entropy].concat())
        }
        fn randomness_from_beacon(
            &self,
            dst: i64,
            epoch: i64,
            entropy: &[u8],
            _: &TipSetKey,
        ) -> Result<Vec<u8>> {
            Ok([&[b'b', dst as u8, epoch as u8][..], entropy].concat())
        }
    }

    #[test]
    fn test_recorded_draws_replay_exactly() -> Result<()> {
        let chain = Arc::new(StubChain::default());
        let recording = RecordingRand::new(chain.clone());
        let c = recording.get_chain_randomness(1, 10, b"e1")?;
        let b = recording.get_beacon_randomness(1, 10, b"e1")?;
        assert_ne!(c, b);
        // Head is resolved once per recorder.
        assert_eq!(chain.head_calls.load(Ordering::SeqCst), 1);

        let log = recording.recorded();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].on.kind, RandomnessKind::Chain);

        let replay = ReplayingRand::new(log);
        assert_eq!(replay.get_chain_randomness(1, 10, b"e1")?, c);
        assert_eq!(replay.get_beacon_randomness(1, 10, b"e1")?, b);
        Ok(())
    }

    #[test]
    fn test_unseen_draw_is_determinism_violation() {
        let replay = Randomness::replaying(vec![]);
        let err = replay.get_chain_randomness(7, 11, b"x").unwrap_err();
        assert!(ConformanceError::is_determinism_violation(&err));
        assert!(err.to_string().contains("dst=7 epoch=11"));
    }

    #[test]
    fn test_chain_and_beacon_entries_do_not_collide() -> Result<()> {
        let recording = Randomness::recording(Arc::new(StubChain::default()));
        recording.get_beacon_randomness(3, 4, b"same")?;

        let replay = Randomness::replaying(recording.recorded());
        assert!(replay.get_beacon_randomness(3, 4, b"same").is_ok());
        let err = replay.get_chain_randomness(3, 4, b"same").unwrap_err();
        assert!(ConformanceError::is_determinism_violation(&err));
        Ok(())
    }
}
