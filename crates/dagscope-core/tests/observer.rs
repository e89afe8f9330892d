//! End-to-end pipeline tests: mock event source + scripted consensus
//! engine driving full poll passes.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use dagscope_core::observer::{IdleReason, PassOutcome};
use dagscope_core::{
    BlockInfo, BlockNumber, ConsensusEngine, Epoch, EpochSelector, Event, EventId, EventSource,
    Frame, ObserveError, Observer, ObserverConfig, SourceError, Validator, ValidatorId,
    ValidatorSet,
};
use dagscope_core::event::Seq;
use dagscope_core::engine::EngineError;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// In-memory node: heads and events are adjusted between polls to
/// simulate a live chain.
#[derive(Default)]
struct MockSource {
    heads: RefCell<Vec<EventId>>,
    events: RefCell<HashMap<EventId, Event>>,
    validators: RefCell<HashMap<u64, ValidatorSet>>,
    epoch_blocks: RefCell<HashMap<u64, u64>>,
    blocks: RefCell<HashMap<u64, EventId>>,
    fail_heads: RefCell<bool>,
}

impl MockSource {
    fn set_heads(&self, heads: &[Event]) {
        *self.heads.borrow_mut() = heads.iter().map(|e| e.id).collect();
    }

    fn add_events(&self, events: &[Event]) {
        let mut map = self.events.borrow_mut();
        for e in events {
            map.insert(e.id, e.clone());
        }
    }

    fn set_validators(&self, epoch: u64, ids: &[u32]) {
        let set: ValidatorSet = ids
            .iter()
            .map(|&id| Validator { id: ValidatorId(id), weight: 1 })
            .collect();
        self.validators.borrow_mut().insert(epoch, set);
    }
}

impl EventSource for MockSource {
    fn heads(&self, _epoch: EpochSelector) -> Result<Vec<EventId>, SourceError> {
        if *self.fail_heads.borrow() {
            return Err(SourceError::Transient("connection refused".into()));
        }
        Ok(self.heads.borrow().clone())
    }

    fn event(&self, id: EventId) -> Result<Event, SourceError> {
        self.events
            .borrow()
            .get(&id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }

    fn validators(&self, epoch: Epoch) -> Result<ValidatorSet, SourceError> {
        self.validators
            .borrow()
            .get(&epoch.0)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("validators for epoch {epoch}")))
    }

    fn epoch_block(&self, epoch: Epoch) -> Result<Option<BlockNumber>, SourceError> {
        Ok(self.epoch_blocks.borrow().get(&epoch.0).copied().map(BlockNumber))
    }

    fn block_by_number(&self, n: BlockNumber) -> Result<Option<BlockInfo>, SourceError> {
        Ok(self
            .blocks
            .borrow()
            .get(&n.0)
            .map(|&atropos| BlockInfo { number: n, atropos }))
    }
}

/// Engine with a fixed script: records resets, reports a fixed decided
/// frame and fixed per-frame root lists. The reset trail is shared so
/// tests can inspect it after the engine moves into the observer.
#[derive(Default)]
struct ScriptedEngine {
    last_decided: Option<Frame>,
    roots: BTreeMap<u32, Vec<EventId>>,
    resets: Rc<RefCell<Vec<Epoch>>>,
}

impl ConsensusEngine for ScriptedEngine {
    fn bootstrap(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn reset(&mut self, epoch: Epoch, _validators: &ValidatorSet) -> Result<(), EngineError> {
        self.resets.borrow_mut().push(epoch);
        Ok(())
    }

    fn process(&mut self, _event: &Event) -> Result<(), EngineError> {
        Ok(())
    }

    fn last_decided_frame(&self) -> Option<Frame> {
        self.last_decided
    }

    fn frame_roots(&self, frame: Frame) -> Vec<EventId> {
        self.roots.get(&frame.0).cloned().unwrap_or_default()
    }
}

fn ev(id: u8, creator: u32, epoch: u64, frame: u32, seq: u32, parents: &[u8]) -> Event {
    Event {
        id: EventId([id; 32]),
        creator: ValidatorId(creator),
        seq: Seq(seq),
        frame: Frame(frame),
        epoch: Epoch(epoch),
        parents: parents.iter().map(|&p| EventId([p; 32])).collect(),
        claimed_root: false,
    }
}

/// DOT node label for `ev(id, …, frame, seq, …)` as it appears in output.
fn node_label(id: u8, frame: u32, seq: u32) -> String {
    format!("\"{}\\n{}-{}\"", EventId([id; 32]).short(), frame, seq)
}

fn capture(outcome: PassOutcome) -> dagscope_core::Capture {
    match outcome {
        PassOutcome::Captured(c) => c,
        PassOutcome::Idle(reason) => panic!("expected capture, got idle: {reason:?}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn one_pass_produces_a_complete_dot_capture() {
    let source = MockSource::default();
    source.set_validators(1, &[1, 2]);
    let a = ev(0xa1, 1, 1, 1, 1, &[]);
    let b = ev(0xb2, 2, 1, 1, 1, &[0xa1]);
    let c = ev(0xc3, 1, 1, 2, 2, &[0xa1, 0xb2]);
    source.add_events(&[a, b, c.clone()]);
    source.set_heads(std::slice::from_ref(&c));

    let mut engine = ScriptedEngine::default();
    engine.last_decided = Some(Frame(1));
    engine.roots.insert(1, vec![EventId([0xa1; 32])]);

    let mut observer = Observer::new(engine, ObserverConfig::default());
    let cap = capture(observer.poll(&source).expect("poll"));

    assert_eq!(cap.epoch, Epoch(1));
    assert!(!cap.epoch_changed);
    assert!(cap.name.starts_with("DAG"));

    // All three events rendered, clusters for both validators present.
    assert!(cap.dot.contains(&node_label(0xa1, 1, 1)), "{}", cap.dot);
    assert!(cap.dot.contains(&node_label(0xb2, 1, 1)));
    assert!(cap.dot.contains(&node_label(0xc3, 2, 2)));
    assert!(cap.dot.contains("label = \"validator-1\""));
    assert!(cap.dot.contains("label = \"validator-2\""));

    // The scripted root is filled yellow; the head got the frontier shape.
    let root_line = cap
        .dot
        .lines()
        .find(|l| l.contains(&node_label(0xa1, 1, 1)))
        .expect("root line");
    assert!(root_line.contains("fillcolor=\"#FFFF00\""), "{root_line}");
    let head_line = cap
        .dot
        .lines()
        .find(|l| l.contains(&node_label(0xc3, 2, 2)))
        .expect("head line");
    assert!(head_line.contains("shape=\"tripleoctagon\""), "{head_line}");

    // Cross-validator edge (c → b) rendered at graph level, i.e. at
    // two-space indent rather than inside a cluster.
    let cross = format!("  {} -> {}", node_label(0xc3, 2, 2), node_label(0xb2, 1, 1));
    assert!(cap.dot.contains(&cross), "{}", cap.dot);
}

#[test]
fn exactly_the_scripted_roots_are_tagged() {
    let source = MockSource::default();
    source.set_validators(1, &[1]);
    let a = ev(1, 1, 1, 1, 1, &[]);
    let b = ev(2, 1, 1, 2, 2, &[1]);
    source.add_events(&[a, b.clone()]);
    source.set_heads(std::slice::from_ref(&b));

    let mut engine = ScriptedEngine::default();
    engine.last_decided = Some(Frame(1));
    engine.roots.insert(1, vec![EventId([1; 32])]);
    // A root the engine decided but we never observed: skipped, no error.
    engine.roots.insert(0, vec![EventId([99; 32])]);

    let mut observer = Observer::new(engine, ObserverConfig::default());
    let cap = capture(observer.poll(&source).expect("poll"));

    let filled: Vec<&str> = cap.dot.lines().filter(|l| l.contains("fillcolor")).collect();
    assert_eq!(filled.len(), 1, "exactly one root tagged: {filled:?}");
    assert!(filled[0].contains(&node_label(1, 1, 1)));
}

#[test]
fn matching_block_hash_tags_atropos_and_unknown_hash_is_skipped() {
    let source = MockSource::default();
    source.set_validators(1, &[1]);
    let a = ev(1, 1, 1, 1, 1, &[]);
    source.add_events(std::slice::from_ref(&a));
    source.set_heads(std::slice::from_ref(&a));
    source.epoch_blocks.borrow_mut().insert(1, 10);
    source.blocks.borrow_mut().insert(11, EventId([1; 32]));
    source.blocks.borrow_mut().insert(12, EventId([42; 32])); // unknown

    let mut observer = Observer::new(ScriptedEngine::default(), ObserverConfig::default());
    let cap = capture(observer.poll(&source).expect("poll"));

    let line = cap
        .dot
        .lines()
        .find(|l| l.contains(&node_label(1, 1, 1)))
        .expect("node line");
    assert!(line.contains("fillcolor=\"#00FF00\""), "{line}");
}

#[test]
fn second_pass_highlights_only_what_is_new() {
    let source = MockSource::default();
    source.set_validators(1, &[1]);
    let a = ev(1, 1, 1, 1, 1, &[]);
    source.add_events(std::slice::from_ref(&a));
    source.set_heads(std::slice::from_ref(&a));

    let mut observer = Observer::new(ScriptedEngine::default(), ObserverConfig::default());
    let first = capture(observer.poll(&source).expect("first poll"));
    assert!(!first.dot.contains("penwidth"), "first capture has no diff marks");

    // The chain grows by one event.
    let b = ev(2, 1, 1, 1, 2, &[1]);
    source.add_events(std::slice::from_ref(&b));
    source.set_heads(std::slice::from_ref(&b));

    let second = capture(observer.poll(&source).expect("second poll"));
    assert!(!second.epoch_changed);

    let a_line = second
        .dot
        .lines()
        .find(|l| l.contains(&node_label(1, 1, 1)) && !l.contains("->"))
        .expect("a line");
    assert!(!a_line.contains("penwidth"), "unchanged node untouched: {a_line}");

    let b_line = second
        .dot
        .lines()
        .find(|l| l.contains(&node_label(2, 1, 2)) && !l.contains("->"))
        .expect("b line");
    assert!(b_line.contains("color=\"red\""), "{b_line}");
    assert!(b_line.contains("penwidth=\"2.5\""), "{b_line}");

    // The new edge b → a is highlighted too.
    let edge_line = second
        .dot
        .lines()
        .find(|l| l.contains("->") && l.contains(&node_label(2, 1, 2)))
        .expect("edge line");
    assert!(edge_line.contains("color=\"red\""), "{edge_line}");
}

#[test]
fn unchanged_frontier_is_idle() {
    let source = MockSource::default();
    source.set_validators(1, &[1]);
    let a = ev(1, 1, 1, 1, 1, &[]);
    source.add_events(std::slice::from_ref(&a));
    source.set_heads(std::slice::from_ref(&a));

    let mut observer = Observer::new(ScriptedEngine::default(), ObserverConfig::default());
    let _ = capture(observer.poll(&source).expect("first poll"));

    match observer.poll(&source).expect("second poll") {
        PassOutcome::Idle(IdleReason::NoNewHeads) => {}
        other => panic!("expected idle frontier, got {other:?}"),
    }
}

#[test]
fn empty_frontier_is_idle() {
    let source = MockSource::default();
    let mut observer = Observer::new(ScriptedEngine::default(), ObserverConfig::default());
    match observer.poll(&source).expect("poll") {
        PassOutcome::Idle(IdleReason::NoHeads) => {}
        other => panic!("expected no-heads idle, got {other:?}"),
    }
}

#[test]
fn new_epoch_resets_graph_and_flags_the_capture() {
    let source = MockSource::default();
    source.set_validators(1, &[1, 2]);
    source.set_validators(2, &[1]);

    let a = ev(1, 1, 1, 1, 1, &[]);
    source.add_events(std::slice::from_ref(&a));
    source.set_heads(std::slice::from_ref(&a));

    let mut observer = Observer::new(ScriptedEngine::default(), ObserverConfig::default());
    let first = capture(observer.poll(&source).expect("epoch 1 poll"));
    assert_eq!(first.epoch, Epoch(1));

    // Epoch 2 begins with a fresh DAG.
    let b = ev(2, 1, 2, 1, 1, &[]);
    source.add_events(std::slice::from_ref(&b));
    source.set_heads(std::slice::from_ref(&b));

    let second = capture(observer.poll(&source).expect("epoch 2 poll"));
    assert_eq!(second.epoch, Epoch(2));
    assert!(second.epoch_changed);

    // Nothing from epoch 1 leaks into epoch 2's graph.
    assert!(!second.dot.contains(&node_label(1, 1, 1)), "{}", second.dot);
    assert!(!second.dot.contains("validator-2"), "epoch-1 validator gone");
    assert!(second.dot.contains(&node_label(2, 1, 1)));
}

#[test]
fn foreign_epoch_heads_stay_eligible_for_later_passes() {
    let source = MockSource::default();
    source.set_validators(1, &[1]);
    source.set_validators(2, &[1]);

    // Mixed frontier around an epoch boundary: the epoch-1 head fixes
    // the pass epoch, the epoch-2 head gets dropped by discovery.
    let a = ev(1, 1, 1, 1, 1, &[]);
    let b = ev(2, 1, 2, 1, 1, &[]);
    source.add_events(&[a.clone(), b.clone()]);
    source.set_heads(&[b.clone(), a]);

    let mut observer = Observer::new(ScriptedEngine::default(), ObserverConfig::default());
    let first = capture(observer.poll(&source).expect("first poll"));
    assert_eq!(first.epoch, Epoch(1));
    assert!(!first.dot.contains(&node_label(2, 1, 1)), "epoch-2 event not captured yet");

    // The identical frontier must not go idle: the epoch-2 head was
    // never captured.
    let second = capture(observer.poll(&source).expect("second poll"));
    assert_eq!(second.epoch, Epoch(1));

    // Once the old head leaves the frontier, epoch 2 is observed.
    source.set_heads(std::slice::from_ref(&b));
    let third = capture(observer.poll(&source).expect("third poll"));
    assert_eq!(third.epoch, Epoch(2));
    assert!(third.epoch_changed);
    assert!(third.dot.contains(&node_label(2, 1, 1)));
}

#[test]
fn transient_source_failure_is_retryable() {
    let source = MockSource::default();
    *source.fail_heads.borrow_mut() = true;

    let mut observer = Observer::new(ScriptedEngine::default(), ObserverConfig::default());
    let err = observer.poll(&source).expect_err("heads failure");
    assert!(err.is_transient());
    assert!(matches!(err, ObserveError::Source(SourceError::Transient(_))));

    // The node comes back; polling resumes.
    *source.fail_heads.borrow_mut() = false;
    source.set_validators(1, &[1]);
    let a = ev(1, 1, 1, 1, 1, &[]);
    source.add_events(std::slice::from_ref(&a));
    source.set_heads(std::slice::from_ref(&a));
    let _ = capture(observer.poll(&source).expect("recovered poll"));
}

#[test]
fn engine_reset_follows_epoch_transitions() {
    let source = MockSource::default();
    source.set_validators(1, &[1]);
    source.set_validators(2, &[1]);

    let a = ev(1, 1, 1, 1, 1, &[]);
    source.add_events(std::slice::from_ref(&a));
    source.set_heads(std::slice::from_ref(&a));

    let engine = ScriptedEngine::default();
    let resets = Rc::clone(&engine.resets);

    let mut observer = Observer::new(engine, ObserverConfig::default());
    let _ = capture(observer.poll(&source).expect("epoch 1"));

    let b = ev(2, 1, 2, 1, 1, &[]);
    source.add_events(std::slice::from_ref(&b));
    source.set_heads(std::slice::from_ref(&b));
    let _ = capture(observer.poll(&source).expect("epoch 2"));

    assert_eq!(*resets.borrow(), vec![Epoch(1), Epoch(2)]);
}
