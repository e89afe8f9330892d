//! Graphviz DOT output model.
//!
//! A [`Graph`] holds *structure* only: which node names belong to which
//! cluster, which edges exist, and the verbatim rank hints. The per-element
//! attribute bags live in the companion snapshot
//! ([`crate::snapshot::GraphSnapshot`]), so the diff marker can mutate
//! attributes without touching structure. [`Graph::to_dot`] joins the two.
//!
//! # Cluster ordering
//!
//! Graphviz does not honor the order clusters are declared in; columns
//! come out in whatever order layout picks. The builder works around it
//! with one invisible placeholder node per cluster, chained by an
//! invisible constraint edge emitted through [`Graph::add_rank_hint`].

use std::fmt::Write as _;

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Ordered attribute bag. Insertion order is preserved so serialized
/// output is stable; setting an existing key overwrites in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrList {
    attrs: Vec<(String, String)>,
}

impl AttrList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: &str) {
        if let Some(slot) = self.attrs.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value.to_string();
        } else {
            self.attrs.push((key.to_string(), value.to_string()));
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `[k="v", …]` suffix, or empty string when there are no attributes.
    #[must_use]
    pub fn to_suffix(&self) -> String {
        if self.attrs.is_empty() {
            return String::new();
        }
        let body: Vec<String> = self
            .attrs
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape(v)))
            .collect();
        format!(" [{}]", body.join(", "))
    }
}

/// Escape a string for use inside a double-quoted DOT id.
#[must_use]
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Stable key identifying an edge: `source -> destination`.
#[must_use]
pub fn edge_key(from: &str, to: &str) -> String {
    format!("{from}->{to}")
}

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

/// A named node and its attribute bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub name: String,
    pub attrs: AttrList,
}

impl GraphNode {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attrs: AttrList::new() }
    }
}

/// A directed edge and its attribute bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub attrs: AttrList,
}

impl GraphEdge {
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into(), attrs: AttrList::new() }
    }

    #[must_use]
    pub fn key(&self) -> String {
        edge_key(&self.from, &self.to)
    }
}

/// A cluster subgraph scoped to one validator within one epoch.
///
/// Members are node names and edge keys; the attribute bags for those
/// members live in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subgraph {
    /// Cluster id, e.g. `cluster0`. Must start with `cluster` for
    /// Graphviz to draw it as a box.
    pub id: String,
    pub attrs: AttrList,
    pub nodes: Vec<String>,
    pub edges: Vec<String>,
}

impl Subgraph {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attrs: AttrList::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A named digraph: graph attributes, ordered cluster subgraphs,
/// epoch-level (cross-cluster) edges, and verbatim rank hints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    pub name: String,
    pub attrs: AttrList,
    pub subgraphs: Vec<Subgraph>,
    /// Keys of edges that must render outside any cluster so they stay
    /// visible across cluster boundaries.
    pub edges: Vec<String>,
    /// Raw statement lines emitted at the end of the body, used for the
    /// invisible placeholder chain that pins cluster order.
    pub rank_hints: Vec<String>,
}

impl Graph {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn add_rank_hint(&mut self, hint: impl Into<String>) {
        self.rank_hints.push(hint.into());
    }

    /// Serialize to DOT text, looking element attributes up in `snapshot`.
    ///
    /// Elements listed in the structure but absent from the snapshot are
    /// emitted bare; the builder keeps the two in sync so that only
    /// happens in hand-assembled tests.
    #[must_use]
    pub fn to_dot(&self, snapshot: &crate::snapshot::GraphSnapshot) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", escape(&self.name));
        for (k, v) in self.attrs.iter() {
            let _ = writeln!(out, "  {k} = \"{}\";", escape(v));
        }
        for sg in &self.subgraphs {
            let _ = writeln!(out, "  subgraph \"{}\" {{", escape(&sg.id));
            for (k, v) in sg.attrs.iter() {
                let _ = writeln!(out, "    {k} = \"{}\";", escape(v));
            }
            for name in &sg.nodes {
                write_node(&mut out, "    ", name, snapshot);
            }
            for key in &sg.edges {
                write_edge(&mut out, "    ", key, snapshot);
            }
            let _ = writeln!(out, "  }}");
        }
        for key in &self.edges {
            write_edge(&mut out, "  ", key, snapshot);
        }
        for hint in &self.rank_hints {
            let _ = writeln!(out, "  {hint}");
        }
        let _ = writeln!(out, "}}");
        out
    }
}

fn write_node(out: &mut String, indent: &str, name: &str, snapshot: &crate::snapshot::GraphSnapshot) {
    let suffix = snapshot
        .node(name)
        .map(|n| n.attrs.to_suffix())
        .unwrap_or_default();
    let _ = writeln!(out, "{indent}\"{}\"{suffix};", escape(name));
}

fn write_edge(out: &mut String, indent: &str, key: &str, snapshot: &crate::snapshot::GraphSnapshot) {
    if let Some(e) = snapshot.edge(key) {
        let _ = writeln!(
            out,
            "{indent}\"{}\" -> \"{}\"{};",
            escape(&e.from),
            escape(&e.to),
            e.attrs.to_suffix()
        );
    }
}
