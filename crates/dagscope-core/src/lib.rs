#![forbid(unsafe_code)]
//! dagscope-core: DAG ingestion, ordering, epoch lifecycle, and graph/diff
//! construction for observing a DAG-based consensus node.
//!
//! The pipeline, leaves first:
//!
//! - [`dot`] / [`snapshot`] — the graph model and per-observation
//!   attribute store, plus the pure change marker.
//! - [`source`] / [`engine`] — contracts for the two external
//!   collaborators: the observed node and the consensus decision engine.
//! - [`order`] — topological delivery buffer (parents before children).
//! - [`traverse`] — backward discovery from the DAG frontier.
//! - [`build`] — per-epoch graph construction from delivered events.
//! - [`lifecycle`] — the Uninitialized/Active/Finalizing epoch machine.
//! - [`observer`] — the one-pass poll driver tying it all together.
//!
//! # Conventions
//!
//! - **Errors**: per-module `thiserror` enums; transient source failures
//!   are retried by the caller, everything else is fatal.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod build;
pub mod dot;
pub mod engine;
pub mod event;
pub mod lifecycle;
pub mod observer;
pub mod order;
pub mod snapshot;
pub mod source;
pub mod traverse;

pub use engine::{ConsensusEngine, EngineError, NodeReportedEngine};
pub use event::{BlockNumber, Epoch, Event, EventId, Frame, Seq, Validator, ValidatorId, ValidatorSet};
pub use observer::{Capture, IdleReason, ObserveError, Observer, ObserverConfig, PassOutcome};
pub use snapshot::{GraphSnapshot, Palette, mark_changes};
pub use source::{BlockInfo, EpochSelector, EventSource, SourceError};
