//! Observation snapshots and the change marker.
//!
//! A [`GraphSnapshot`] is the attribute store for one poll's graph: every
//! node and edge the pass produced, keyed by node name and edge key.
//! [`mark_changes`] compares the current snapshot against the previous
//! one and recolors what changed — it reads nothing but its arguments, so
//! diffing identical inputs twice gives identical output.

use std::collections::BTreeMap;

use crate::dot::{GraphEdge, GraphNode};

// ---------------------------------------------------------------------------
// Palette
// ---------------------------------------------------------------------------

/// Colors and stroke width used for consensus and diff tagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    /// Fill for frame roots.
    pub root: String,
    /// Fill for a node that just *became* a root since the last capture.
    pub new_root: String,
    /// Fill for a node whose marked status changed away from root.
    pub old_root: String,
    /// Fill for the atropos (block-finalizing) event.
    pub atropos: String,
    /// Stroke color for elements absent from the previous capture.
    pub highlight: String,
    /// Stroke width that goes with `highlight`.
    pub pen_width: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            root: "#FFFF00".to_string(),
            new_root: "#AAAA00".to_string(),
            old_root: "#888888".to_string(),
            atropos: "#00FF00".to_string(),
            highlight: "red".to_string(),
            pen_width: "2.5".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// GraphSnapshot
// ---------------------------------------------------------------------------

/// Full node-name → node and edge-key → edge mapping for one observation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    nodes: BTreeMap<String, GraphNode>,
    edges: BTreeMap<String, GraphEdge>,
}

impl GraphSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, replacing any previous node of the same name.
    pub fn upsert_node(&mut self, node: GraphNode) {
        self.nodes.insert(node.name.clone(), node);
    }

    /// Insert an edge keyed by `from->to`.
    pub fn upsert_edge(&mut self, edge: GraphEdge) {
        self.edges.insert(edge.key(), edge);
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.get(name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut GraphNode> {
        self.nodes.get_mut(name)
    }

    #[must_use]
    pub fn edge(&self, key: &str) -> Option<&GraphEdge> {
        self.edges.get(key)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn edge_keys(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Diff marker
// ---------------------------------------------------------------------------

/// Recolor `current` in place against `previous`.
///
/// - Nodes and edges whose key is absent from `previous` get the
///   highlight stroke (`color` + `penwidth`).
/// - Nodes present in both whose `fillcolor` differs get the "newly
///   confirmed" treatment: a node now filled with the root color becomes
///   `new_root`, any other fill change becomes `old_root`.
///
/// Pure over its arguments; mutates only `current`.
pub fn mark_changes(current: &mut GraphSnapshot, previous: &GraphSnapshot, palette: &Palette) {
    for (name, node) in &mut current.nodes {
        match previous.nodes.get(name) {
            None => {
                node.attrs.set("color", &palette.highlight);
                node.attrs.set("penwidth", &palette.pen_width);
            }
            Some(old) => {
                if node.attrs.get("fillcolor") != old.attrs.get("fillcolor") {
                    node.attrs.set("style", "filled");
                    if node.attrs.get("fillcolor") == Some(palette.root.as_str()) {
                        node.attrs.set("fillcolor", &palette.new_root);
                    } else {
                        node.attrs.set("fillcolor", &palette.old_root);
                    }
                }
            }
        }
    }

    for (key, edge) in &mut current.edges {
        if !previous.edges.contains_key(key) {
            edge.attrs.set("color", &palette.highlight);
            edge.attrs.set("penwidth", &palette.pen_width);
        }
    }
}
