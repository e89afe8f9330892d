//! Contract for the node that supplies DAG data.
//!
//! The pipeline never talks to a socket itself; everything it needs from
//! the observed node comes through [`EventSource`]. The CLI implements it
//! over JSON-RPC, tests implement it over in-memory fixtures.

use crate::event::{BlockNumber, Epoch, Event, EventId, ValidatorSet};

/// Which epoch's heads to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochSelector {
    /// The epoch currently being built on the node.
    Pending,
    /// A specific, already-known epoch.
    Sealed(Epoch),
}

/// Failures reported by an event source.
///
/// `Transient` aborts the current poll and is retried on the next one;
/// `NotFound` is degradable — the caller skips the dependent feature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The call itself failed (network, encoding, node error reply).
    #[error("transient source failure: {0}")]
    Transient(String),

    /// The call succeeded but the requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// A block as far as the observer cares: its hash doubles as the id of
/// the event that finalized it (the atropos).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: BlockNumber,
    pub atropos: EventId,
}

/// Read-only view of a running DAG-consensus node.
///
/// All calls block; the pipeline keeps at most one in flight.
pub trait EventSource {
    /// Current DAG frontier: events with no known children.
    fn heads(&self, epoch: EpochSelector) -> Result<Vec<EventId>, SourceError>;

    /// Download one event by id.
    fn event(&self, id: EventId) -> Result<Event, SourceError>;

    /// The validator set active in `epoch`.
    fn validators(&self, epoch: Epoch) -> Result<ValidatorSet, SourceError>;

    /// The last block height of the epoch *before* `epoch`, i.e. the
    /// block from which `epoch`'s own blocks start counting. Zero is a
    /// legitimate answer for the first epoch; callers probing an epoch
    /// that has not sealed yet get zero back and must treat it as
    /// "no upper bound". `None` when the node gave no answer at all.
    fn epoch_block(&self, epoch: Epoch) -> Result<Option<BlockNumber>, SourceError>;

    /// Block by height; `None` past the chain tip.
    fn block_by_number(&self, n: BlockNumber) -> Result<Option<BlockInfo>, SourceError>;
}
