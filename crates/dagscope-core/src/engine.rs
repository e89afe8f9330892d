//! Consensus-engine contract and the default node-reported implementation.
//!
//! The actual root/frame/atropos decision algorithm is an external
//! collaborator. The pipeline only drives the `Bootstrap → Reset →
//! Process* → read checkpoints` protocol, so the whole algorithm sits
//! behind [`ConsensusEngine`] and tests substitute scripted engines
//! without touching the pipeline.

use std::collections::BTreeMap;

use crate::event::{Epoch, Event, EventId, Frame, ValidatorSet};

/// An engine call failed. The pipeline treats this as fatal: a broken
/// engine means the observation can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("consensus engine: {0}")]
pub struct EngineError(pub String);

/// Replays delivered events and reports decided frames and their roots.
///
/// `process` is only ever called with events whose parents have already
/// been processed — the ordering buffer guarantees it.
pub trait ConsensusEngine {
    /// One-time startup before the first reset.
    fn bootstrap(&mut self) -> Result<(), EngineError>;

    /// Drop all state and start observing `epoch` with `validators`.
    fn reset(&mut self, epoch: Epoch, validators: &ValidatorSet) -> Result<(), EngineError>;

    /// Feed one delivered event.
    fn process(&mut self, event: &Event) -> Result<(), EngineError>;

    /// Highest frame whose root set is final; `None` while everything
    /// observed still sits in the frontier frame.
    fn last_decided_frame(&self) -> Option<Frame>;

    /// Root event ids of a decided frame. Empty for undecided or unknown
    /// frames.
    fn frame_roots(&self, frame: Frame) -> Vec<EventId>;
}

// ---------------------------------------------------------------------------
// NodeReportedEngine
// ---------------------------------------------------------------------------

/// Default engine that trusts the observed node's own root claims.
///
/// Each event arrives with a `claimed_root` flag the node computed for
/// itself; this engine just indexes those claims by frame. A frame counts
/// as decided once a higher frame has been seen — the frontier frame may
/// still gain roots, so it is never reported decided.
#[derive(Debug, Default)]
pub struct NodeReportedEngine {
    roots: BTreeMap<Frame, Vec<EventId>>,
    max_frame: Option<Frame>,
}

impl NodeReportedEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConsensusEngine for NodeReportedEngine {
    fn bootstrap(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn reset(&mut self, epoch: Epoch, validators: &ValidatorSet) -> Result<(), EngineError> {
        if validators.is_empty() {
            return Err(EngineError(format!("empty validator set for epoch {epoch}")));
        }
        self.roots.clear();
        self.max_frame = None;
        Ok(())
    }

    fn process(&mut self, event: &Event) -> Result<(), EngineError> {
        if self.max_frame.is_none_or(|f| event.frame > f) {
            self.max_frame = Some(event.frame);
        }
        if event.claimed_root {
            self.roots.entry(event.frame).or_default().push(event.id);
        }
        Ok(())
    }

    fn last_decided_frame(&self) -> Option<Frame> {
        self.max_frame.and_then(|f| f.0.checked_sub(1).map(Frame))
    }

    fn frame_roots(&self, frame: Frame) -> Vec<EventId> {
        self.roots.get(&frame).cloned().unwrap_or_default()
    }
}
