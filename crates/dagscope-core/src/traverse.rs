//! Backward discovery of the observable DAG.
//!
//! Walks from the current head ids over parent links with an explicit
//! worklist and seen-set (no recursion, so deep DAGs cannot blow the
//! stack), downloading each unseen event exactly once. The epoch under
//! observation is fixed by the first event downloaded; events from any
//! other epoch are dropped so one pass never mixes epochs.
//!
//! Any download failure aborts the whole pass — partial results are never
//! committed.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::event::{Epoch, Event, EventId, Seq};
use crate::source::{EventSource, SourceError};

/// Discovery failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraverseError {
    /// A download call failed; the pass is aborted.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Traversal was started with no heads.
    #[error("no heads to traverse")]
    NoHeads,
}

/// Everything one pass downloaded.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// The epoch of the first downloaded event; every event in `events`
    /// belongs to it.
    pub epoch: Epoch,
    /// Downloaded events in download (depth-first) order.
    pub events: Vec<Event>,
    /// The heads that seeded the walk and belong to `epoch`.
    pub heads: Vec<EventId>,
}

/// Walk backward from `heads`, downloading every reachable ancestor.
///
/// `depth_limit` (when non-zero) stops *expanding* an event's parents once
/// the event sits more than `depth_limit` sequence numbers below the
/// highest head; the event itself is still returned. Cut-off events whose
/// parents were never downloaded will simply stay pending downstream.
///
/// # Errors
///
/// [`TraverseError::NoHeads`] for an empty head list, or the first
/// [`SourceError`] a download produces.
pub fn discover<S: EventSource>(
    source: &S,
    heads: &[EventId],
    depth_limit: u32,
) -> Result<Discovery, TraverseError> {
    if heads.is_empty() {
        return Err(TraverseError::NoHeads);
    }

    let mut worklist: Vec<EventId> = heads.to_vec();
    let mut seen: HashSet<EventId> = HashSet::new();
    let mut events: Vec<Event> = Vec::new();
    let mut epoch: Option<Epoch> = None;
    let mut start_seq: Option<Seq> = None;
    let head_set: HashSet<EventId> = heads.iter().copied().collect();
    let mut epoch_heads: Vec<EventId> = Vec::new();

    while let Some(id) = worklist.pop() {
        if !seen.insert(id) {
            continue;
        }

        let event = source.event(id)?;

        let pass_epoch = *epoch.get_or_insert(event.epoch);
        if event.epoch != pass_epoch {
            debug!(id = %id, event_epoch = %event.epoch, pass_epoch = %pass_epoch,
                "dropping event outside the observed epoch");
            continue;
        }
        if head_set.contains(&id) {
            epoch_heads.push(id);
            if start_seq.is_none_or(|s| event.seq > s) {
                start_seq = Some(event.seq);
            }
        }

        let expand = depth_limit == 0
            || start_seq.is_none_or(|s| s.0.saturating_sub(event.seq.0) <= depth_limit);
        if expand {
            worklist.extend(event.parents.iter().copied());
        } else {
            debug!(id = %id, seq = %event.seq, "depth limit reached, not expanding parents");
        }

        events.push(event);
    }

    let Some(epoch) = epoch else {
        // Unreachable with a non-empty head list, but keep it non-panicking.
        warn!("traversal downloaded nothing");
        return Err(TraverseError::NoHeads);
    };

    debug!(epoch = %epoch, downloaded = events.len(), "discovery complete");
    Ok(Discovery { epoch, events, heads: epoch_heads })
}
