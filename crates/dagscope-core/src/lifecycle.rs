//! Epoch lifecycle management.
//!
//! [`EpochManager`] keeps the pipeline and the consensus engine in step
//! across epoch boundaries:
//!
//! ```text
//! Uninitialized ──first event──▶ Active(e) ──pass complete──▶ Finalizing(e)
//!                                    ▲                            │
//!                                    └──next pass, epoch e or e+1─┘
//! ```
//!
//! Entering `Active(e)` resets the engine, ordering buffer, and graph
//! builder against epoch `e`'s validator set, so no state from a previous
//! epoch can survive. Finalizing tags decided frame roots and atropos
//! events and hands the finished graph out. Re-entering the *same* epoch
//! is allowed (every pass rebuilds the epoch from scratch); entering a
//! smaller epoch is an invariant violation.

use tracing::{debug, info, warn};

use crate::build::{BuildError, GraphBuilder};
use crate::dot::Graph;
use crate::engine::{ConsensusEngine, EngineError};
use crate::event::{Epoch, Event, EventId, Frame};
use crate::order::{OrderingBuffer, OrderingError};
use crate::snapshot::{GraphSnapshot, Palette};
use crate::source::{EventSource, SourceError};

/// Where the manager sits in the epoch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No event observed yet.
    Uninitialized,
    /// Mid-pass, collecting epoch `e`.
    Active(Epoch),
    /// Pass for `e` complete; waiting to see whether the next pass still
    /// observes `e` or moves on.
    Finalizing(Epoch),
}

/// Lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error(transparent)]
    Build(#[from] BuildError),

    /// Epoch numbers must never decrease across transitions.
    #[error("epoch regression: observed {observed} after {current}")]
    EpochRegression { current: Epoch, observed: Epoch },

    /// An operation that requires an active epoch was called outside one.
    #[error("no active epoch for {0}")]
    NotActive(&'static str),
}

/// Drives engine resets, ordered ingestion, and finalization for one
/// epoch at a time.
#[derive(Debug)]
pub struct EpochManager<C> {
    state: LifecycleState,
    engine: C,
    buffer: OrderingBuffer,
    builder: Option<GraphBuilder>,
    pending_limit: usize,
    palette: Palette,
    bootstrapped: bool,
}

impl<C: ConsensusEngine> EpochManager<C> {
    #[must_use]
    pub fn new(engine: C, pending_limit: usize, palette: Palette) -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            engine,
            buffer: OrderingBuffer::new(pending_limit),
            builder: None,
            pending_limit,
            palette,
            bootstrapped: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn engine(&self) -> &C {
        &self.engine
    }

    /// Transition into `Active(epoch)`: fetch the validator set, reset
    /// the engine, and start a fresh buffer and graph builder.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::EpochRegression`] when `epoch` is below the
    /// epoch already observed; source and engine failures pass through.
    pub fn enter_epoch<S: EventSource>(
        &mut self,
        source: &S,
        epoch: Epoch,
        graph_name: impl Into<String>,
    ) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Uninitialized => {}
            LifecycleState::Active(current) | LifecycleState::Finalizing(current) => {
                if epoch < current {
                    return Err(LifecycleError::EpochRegression { current, observed: epoch });
                }
            }
        }

        let validators = source.validators(epoch)?;
        info!(epoch = %epoch, validators = validators.len(), "entering epoch");

        if !self.bootstrapped {
            self.engine.bootstrap()?;
            self.bootstrapped = true;
        }
        self.engine.reset(epoch, &validators)?;

        self.buffer = OrderingBuffer::new(self.pending_limit);
        self.builder = Some(GraphBuilder::begin(graph_name, &validators, self.palette.clone()));
        self.state = LifecycleState::Active(epoch);
        Ok(())
    }

    /// Feed one downloaded event through the ordering buffer; everything
    /// the push makes deliverable goes to the engine and the builder, in
    /// parents-first order.
    pub fn ingest(&mut self, event: Event) -> Result<(), LifecycleError> {
        let LifecycleState::Active(_) = self.state else {
            return Err(LifecycleError::NotActive("ingest"));
        };
        let builder = self.builder.as_mut().ok_or(LifecycleError::NotActive("ingest"))?;

        for delivered in self.buffer.push(event)? {
            self.engine.process(&delivered)?;
            builder.add_event(&delivered)?;
        }
        Ok(())
    }

    /// Tag the current frontier events.
    pub fn mark_heads(&mut self, heads: &[EventId]) {
        let Some(builder) = self.builder.as_mut() else {
            return;
        };
        for &head in heads {
            if !builder.mark_head(head) {
                debug!(id = %head, "head has no node; left untagged");
            }
        }
    }

    /// Close out the pass: tag decided frame roots and atropos events,
    /// transition to `Finalizing`, and hand the finished graph over.
    ///
    /// A block whose hash matches no observed event is skipped with a
    /// debug log — finalized events can lie outside the local frontier.
    ///
    /// # Errors
    ///
    /// Source failures during block iteration pass through; they abort
    /// the pass.
    pub fn finalize<S: EventSource>(
        &mut self,
        source: &S,
    ) -> Result<(Graph, GraphSnapshot), LifecycleError> {
        let LifecycleState::Active(epoch) = self.state else {
            return Err(LifecycleError::NotActive("finalize"));
        };
        let mut builder = self.builder.take().ok_or(LifecycleError::NotActive("finalize"))?;

        if self.buffer.pending_len() > 0 {
            warn!(
                pending = self.buffer.pending_len(),
                "events with unresolved parents never delivered"
            );
        }

        // Roots of every decided frame; the frontier frame never counts.
        if let Some(last) = self.engine.last_decided_frame() {
            for f in 0..=last.0 {
                for id in self.engine.frame_roots(Frame(f)) {
                    if !builder.mark_root(id) {
                        debug!(id = %id, frame = f, "decided root not in observed graph");
                    }
                }
            }
        }

        // Atropos events for the epoch's block range.
        self.tag_atropoi(source, epoch, &mut builder)?;

        self.state = LifecycleState::Finalizing(epoch);
        Ok(builder.finish())
    }

    fn tag_atropoi<S: EventSource>(
        &self,
        source: &S,
        epoch: Epoch,
        builder: &mut GraphBuilder,
    ) -> Result<(), LifecycleError> {
        let Some(start) = source.epoch_block(epoch)? else {
            debug!(epoch = %epoch, "epoch start block unknown; skipping atropos tagging");
            return Ok(());
        };
        // Zero from the next epoch means it has not sealed yet; walk to
        // the chain tip instead. The start bound keeps zero: the first
        // epoch's blocks count from 1.
        let upper = source.epoch_block(epoch.next())?.filter(|b| b.0 > 0);

        let mut block = start.next();
        loop {
            if let Some(upper) = upper {
                if block > upper {
                    break;
                }
            }
            let Some(info) = source.block_by_number(block)? else {
                break;
            };
            if builder.mark_atropos(info.atropos) {
                debug!(block = %block, atropos = %info.atropos, "tagged atropos");
            } else {
                debug!(block = %block, atropos = %info.atropos,
                    "finalized event outside the observed frontier");
            }
            block = block.next();
        }
        Ok(())
    }
}
