//! Event and validator model for the observed DAG.
//!
//! Every type here is a plain value: an [`Event`] is created when it is
//! downloaded from the node and never mutated afterwards. Identifiers are
//! newtypes so an epoch number can never be passed where a frame number is
//! expected.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A 32-byte event hash, the unique identity of an event within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub [u8; 32]);

/// Error parsing an [`EventId`] from its hex form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid event id {0:?}: expected 0x-prefixed 64-char hex")]
pub struct ParseEventIdError(pub String);

impl EventId {
    /// Shortened identity used in node names: the first 16 hex chars.
    ///
    /// 64 bits of the hash is comfortably collision-free for the size of
    /// DAG a single run observes.
    #[must_use]
    pub fn short(&self) -> String {
        let mut s = String::with_capacity(16);
        for b in &self.0[..8] {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for EventId {
    type Err = ParseEventIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix("0x").unwrap_or(s);
        if hex.len() != 64 {
            return Err(ParseEventIdError(s.to_string()));
        }
        let mut bytes = [0_u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| ParseEventIdError(s.to_string()))?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| ParseEventIdError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

/// A consensus participant's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValidatorId(pub u32);

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bounded era during which one validator set is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(pub u64);

impl Epoch {
    /// The epoch following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sub-epoch ordering level used by the consensus engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frame(pub u32);

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-creator event sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seq(pub u32);

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chain block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockNumber(pub u64);

impl BlockNumber {
    /// The next block height.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One gossiped DAG event as downloaded from the node.
///
/// Immutable once constructed. `parents` keeps the wire order; an empty
/// list marks a creator's first event of the epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub creator: ValidatorId,
    pub seq: Seq,
    pub frame: Frame,
    pub epoch: Epoch,
    pub parents: Vec<EventId>,
    /// The node's own claim that this event is a frame root, as reported
    /// on the wire. Informational; a consensus engine may ignore it.
    pub claimed_root: bool,
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// A consensus participant with its relative voting weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    pub id: ValidatorId,
    pub weight: u64,
}

/// The validator set active for one epoch.
///
/// Iteration is always in ascending validator-id order, which downstream
/// layout code relies on for deterministic cluster ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: BTreeMap<ValidatorId, u64>,
}

impl ValidatorSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a validator's weight.
    pub fn insert(&mut self, id: ValidatorId, weight: u64) {
        self.validators.insert(id, weight);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: ValidatorId) -> bool {
        self.validators.contains_key(&id)
    }

    /// Validators in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = Validator> + '_ {
        self.validators
            .iter()
            .map(|(&id, &weight)| Validator { id, weight })
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ValidatorId> + '_ {
        self.validators.keys().copied()
    }
}

impl FromIterator<Validator> for ValidatorSet {
    fn from_iter<T: IntoIterator<Item = Validator>>(iter: T) -> Self {
        let mut set = Self::new();
        for v in iter {
            set.insert(v.id, v.weight);
        }
        set
    }
}
