//! Per-epoch graph construction.
//!
//! A [`GraphBuilder`] is the explicit context for one epoch's graph:
//! event-id → node-name and creator → cluster mappings, the structural
//! [`Graph`] and its attribute [`GraphSnapshot`]. It is created on epoch
//! reset, fed one delivered event at a time, tagged during finalization,
//! and consumed by [`GraphBuilder::finish`] — nothing leaks into the next
//! epoch.
//!
//! Elements are never removed; after creation the only mutation is adding
//! attributes (root/atropos/head/diff tags).

use std::collections::HashMap;

use crate::dot::{Graph, GraphEdge, GraphNode, Subgraph, edge_key};
use crate::event::{Event, EventId, ValidatorId, ValidatorSet};
use crate::snapshot::{GraphSnapshot, Palette};

/// Shape given to frontier (head) events.
const HEAD_SHAPE: &str = "tripleoctagon";

/// Graph-construction failures. Both variants mean a core assumption is
/// broken, so callers treat them as fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A delivered event's creator is not in the epoch's validator set.
    #[error("event {event} created by {creator}, which is not in the validator set")]
    UnknownValidator { event: EventId, creator: ValidatorId },

    /// A delivered event references a parent that was never delivered —
    /// the ordering buffer should have made that impossible.
    #[error("event {event} references undelivered parent {parent}")]
    UnknownParent { event: EventId, parent: EventId },
}

/// Builds one epoch's graph from delivered events.
#[derive(Debug)]
pub struct GraphBuilder {
    graph: Graph,
    snapshot: GraphSnapshot,
    node_names: HashMap<EventId, String>,
    creators: HashMap<EventId, ValidatorId>,
    clusters: HashMap<ValidatorId, usize>,
    palette: Palette,
}

impl GraphBuilder {
    /// Start a fresh epoch graph.
    ///
    /// Creates one cluster per validator in ascending validator-id order,
    /// each seeded with an invisible zero-width placeholder node, and a
    /// single invisible constraint-edge chain across the placeholders so
    /// rendered columns keep validator-id order.
    #[must_use]
    pub fn begin(name: impl Into<String>, validators: &ValidatorSet, palette: Palette) -> Self {
        let mut graph = Graph::new(name);
        graph.attrs.set("clusterrank", "local");
        graph.attrs.set("compound", "true");
        graph.attrs.set("newrank", "true");
        graph.attrs.set("ranksep", "0.05");

        let mut snapshot = GraphSnapshot::new();
        let mut clusters = HashMap::with_capacity(validators.len());
        let mut placeholders = Vec::with_capacity(validators.len());

        for (i, v) in validators.iter().enumerate() {
            let label = format!("validator-{}", v.id);

            let mut sg = Subgraph::new(format!("cluster{i}"));
            sg.attrs.set("label", &label);
            sg.attrs.set("sortv", &v.id.to_string());
            sg.attrs.set("style", "dotted");

            let mut placeholder = GraphNode::new(label.clone());
            placeholder.attrs.set("style", "invis");
            placeholder.attrs.set("width", "0");
            sg.nodes.push(placeholder.name.clone());
            snapshot.upsert_node(placeholder);

            graph.subgraphs.push(sg);
            clusters.insert(v.id, i);
            placeholders.push(label);
        }

        if placeholders.len() > 1 {
            let chain = placeholders
                .iter()
                .map(|p| format!("\"{p}\""))
                .collect::<Vec<_>>()
                .join(" -> ");
            graph.add_rank_hint(format!("{chain} [style = invis, constraint = true];"));
        }

        Self {
            graph,
            snapshot,
            node_names: HashMap::new(),
            creators: HashMap::new(),
            clusters,
            palette,
        }
    }

    /// Add one delivered event: its node in the creator's cluster, and
    /// one edge per parent link. Same-creator edges live inside the
    /// cluster; cross-creator edges go to the epoch-level graph so they
    /// stay visible across cluster boundaries.
    ///
    /// # Errors
    ///
    /// [`BuildError`] when the creator or a parent is unknown; both are
    /// invariant violations.
    pub fn add_event(&mut self, event: &Event) -> Result<(), BuildError> {
        let &cluster = self.clusters.get(&event.creator).ok_or(BuildError::UnknownValidator {
            event: event.id,
            creator: event.creator,
        })?;

        let name = format!("{}\n{}-{}", event.id.short(), event.frame, event.seq);
        self.snapshot.upsert_node(GraphNode::new(name.clone()));
        self.graph.subgraphs[cluster].nodes.push(name.clone());
        self.node_names.insert(event.id, name.clone());
        self.creators.insert(event.id, event.creator);

        for parent in &event.parents {
            let parent_name =
                self.node_names
                    .get(parent)
                    .ok_or(BuildError::UnknownParent { event: event.id, parent: *parent })?;

            let mut edge = GraphEdge::new(name.clone(), parent_name.clone());
            edge.attrs.set("constraint", "true");
            let key = edge.key();
            self.snapshot.upsert_edge(edge);

            if self.creators.get(parent) == Some(&event.creator) {
                self.graph.subgraphs[cluster].edges.push(key);
            } else {
                self.graph.edges.push(key);
            }
        }

        Ok(())
    }

    /// Whether `id` has a node in this epoch's graph.
    #[must_use]
    pub fn contains(&self, id: EventId) -> bool {
        self.node_names.contains_key(&id)
    }

    /// Fill `id`'s node with the root color. Returns false for ids with
    /// no node in this epoch.
    pub fn mark_root(&mut self, id: EventId) -> bool {
        self.fill(id, self.palette.root.clone())
    }

    /// Fill `id`'s node with the atropos color.
    pub fn mark_atropos(&mut self, id: EventId) -> bool {
        self.fill(id, self.palette.atropos.clone())
    }

    /// Give `id`'s node the frontier shape.
    pub fn mark_head(&mut self, id: EventId) -> bool {
        let Some(name) = self.node_names.get(&id) else {
            return false;
        };
        if let Some(node) = self.snapshot.node_mut(name) {
            node.attrs.set("shape", HEAD_SHAPE);
            return true;
        }
        false
    }

    fn fill(&mut self, id: EventId, color: String) -> bool {
        let Some(name) = self.node_names.get(&id) else {
            return false;
        };
        if let Some(node) = self.snapshot.node_mut(name) {
            node.attrs.set("style", "filled");
            node.attrs.set("fillcolor", &color);
            return true;
        }
        false
    }

    /// Number of event nodes added (placeholders excluded).
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.node_names.len()
    }

    /// Hand over the completed structure and attribute store.
    #[must_use]
    pub fn finish(self) -> (Graph, GraphSnapshot) {
        (self.graph, self.snapshot)
    }
}
