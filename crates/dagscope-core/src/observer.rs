//! One-pass poll driver.
//!
//! [`Observer`] owns everything that survives between polling iterations:
//! the epoch manager, the set of heads already captured, and the previous
//! snapshot/epoch used for diffing. A call to [`Observer::poll`] performs
//! one complete pass — heads, discovery, ordered delivery, consensus
//! replay, finalization, diff — and returns either a finished DOT capture
//! or the reason the pass was skipped. Iterations never overlap, so no
//! locking is involved anywhere.
//!
//! A failed pass leaves no partial state behind: the next poll rebuilds
//! the epoch from scratch.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::engine::ConsensusEngine;
use crate::event::{Epoch, EventId};
use crate::lifecycle::{EpochManager, LifecycleError};
use crate::order::DEFAULT_PENDING_LIMIT;
use crate::snapshot::{GraphSnapshot, Palette, mark_changes};
use crate::source::{EpochSelector, EventSource, SourceError};
use crate::traverse::{TraverseError, discover};

/// A pass-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObserveError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Traverse(#[from] TraverseError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl ObserveError {
    /// Whether the caller should just retry on the next poll. Network
    /// and missing-data failures are retryable; everything else means a
    /// core assumption broke and the process should stop.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Source(_)
                | Self::Traverse(TraverseError::Source(_))
                | Self::Lifecycle(LifecycleError::Source(_))
        )
    }
}

/// Why a poll produced no capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// The node reported no heads at all.
    NoHeads,
    /// Every reported head was already captured by an earlier pass.
    NoNewHeads,
}

/// One finished observation.
#[derive(Debug, Clone)]
pub struct Capture {
    /// Pass name (`DAG<unix-nanos>`), used for per-change file naming.
    pub name: String,
    /// The epoch this capture observed.
    pub epoch: Epoch,
    /// True when this is the first capture of a new epoch — the previous
    /// capture (if any) was the last one of the now-sealed epoch.
    pub epoch_changed: bool,
    /// Serialized DOT text.
    pub dot: String,
}

/// Result of one poll.
#[derive(Debug, Clone)]
pub enum PassOutcome {
    Idle(IdleReason),
    Captured(Capture),
}

/// Observer configuration.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Traversal depth limit in sequence numbers; 0 means unlimited.
    pub depth_limit: u32,
    /// Ordering-buffer pending capacity.
    pub pending_limit: usize,
    pub palette: Palette,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            depth_limit: 0,
            pending_limit: DEFAULT_PENDING_LIMIT,
            palette: Palette::default(),
        }
    }
}

/// Polls an event source and produces diffed DOT captures.
#[derive(Debug)]
pub struct Observer<C> {
    manager: EpochManager<C>,
    processed_heads: HashSet<EventId>,
    prev_snapshot: Option<GraphSnapshot>,
    prev_epoch: Option<Epoch>,
    depth_limit: u32,
    palette: Palette,
}

impl<C: ConsensusEngine> Observer<C> {
    #[must_use]
    pub fn new(engine: C, config: ObserverConfig) -> Self {
        Self {
            manager: EpochManager::new(engine, config.pending_limit, config.palette.clone()),
            processed_heads: HashSet::new(),
            prev_snapshot: None,
            prev_epoch: None,
            depth_limit: config.depth_limit,
            palette: config.palette,
        }
    }

    /// Run one full pass against `source`.
    ///
    /// # Errors
    ///
    /// [`ObserveError`]; check [`ObserveError::is_transient`] to decide
    /// between retrying on the next poll and terminating.
    pub fn poll<S: EventSource>(&mut self, source: &S) -> Result<PassOutcome, ObserveError> {
        let name = pass_name();

        let heads = source.heads(EpochSelector::Pending)?;
        if heads.is_empty() {
            debug!(pass = %name, "no heads reported");
            return Ok(PassOutcome::Idle(IdleReason::NoHeads));
        }
        if heads.iter().all(|h| self.processed_heads.contains(h)) {
            debug!(pass = %name, "frontier unchanged");
            return Ok(PassOutcome::Idle(IdleReason::NoNewHeads));
        }

        info!(pass = %name, heads = heads.len(), "starting capture pass");
        let discovery = discover(source, &heads, self.depth_limit)?;
        let epoch = discovery.epoch;

        let epoch_changed = self.prev_epoch.is_some_and(|p| p != epoch);
        if epoch_changed {
            // Heads of a sealed epoch can never come back.
            self.processed_heads.clear();
        }
        // Only heads of the pass epoch count as processed; heads whose
        // events discovery dropped as foreign stay eligible to seed a
        // later pass.
        self.processed_heads.extend(discovery.heads.iter().copied());

        self.manager.enter_epoch(source, epoch, name.clone())?;
        for event in discovery.events {
            self.manager.ingest(event)?;
        }
        self.manager.mark_heads(&discovery.heads);
        let (graph, mut snapshot) = self.manager.finalize(source)?;

        if let Some(prev) = &self.prev_snapshot {
            mark_changes(&mut snapshot, prev, &self.palette);
        }
        let dot = graph.to_dot(&snapshot);

        info!(pass = %name, epoch = %epoch, nodes = snapshot.node_count(),
            edges = snapshot.edge_count(), "capture pass done");

        self.prev_snapshot = Some(snapshot);
        self.prev_epoch = Some(epoch);

        Ok(PassOutcome::Captured(Capture { name, epoch, epoch_changed, dot }))
    }
}

/// Timestamp-based pass name, unique per observation.
fn pass_name() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("DAG{nanos}")
}
