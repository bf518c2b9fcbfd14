//! Swim-lane diagrams for an instrumented resource's event log.
//!
//! [`build`] turns a time-sorted slice of [`Action`]s into a [`Graph`]: plain
//! node / edge / rank values laid out in three lane families that share one
//! tick axis.
//!
//! - the timeline lane (`t0_<tick>`), a logical clock labeled with capture times,
//! - one lane per execution context (`g<context>_<n>`), opened with a branch
//!   edge from the context's parent,
//! - the resource lane (`m0_<tick>`).
//!
//! Every action adds one node to each of the timeline, its context's lane and
//! the resource lane, all on the same rank, plus an edge between the context
//! node and the resource node describing what happened. [`Graph::to_dot`]
//! serializes the result and a [`Renderer`] turns it into an image.

use std::fmt;
use std::time::Duration;

use lockscope_types::{Action, ContextId};

mod dot;
mod lanes;
mod render;

pub use lanes::build;
pub use render::*;

/// Node identifier, unique within one graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// `<prefix><lane>_<seq>`, e.g. `g3_2` or `m0_7`.
    pub fn lane(prefix: &str, lane: u64, seq: u64) -> Self {
        Self(format!("{prefix}{lane}_{seq}"))
    }

    pub fn named(name: &str) -> Self {
        Self(name.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Circle,
    Square,
    Plaintext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    /// Lane the node belongs to; the renderer keeps a group in one column.
    pub group: String,
    pub label: String,
    pub shape: Shape,
    pub dashed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Back,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStyle {
    Solid,
    Dashed,
}

/// Role of an edge in the lane layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Timeline node to the next timeline node.
    Tick,
    /// Context node to the next node of the same context.
    LaneStep,
    /// Resource node to the next resource node.
    ResourceStep,
    /// Spawn relationship: parent's lane (or the placeholder root) to a new lane.
    Branch,
    /// Context node to resource node for one action.
    Access,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    pub label: Option<String>,
    pub direction: Direction,
    pub color: Option<String>,
    pub style: EdgeStyle,
}

impl Edge {
    pub(crate) fn new(from: NodeId, to: NodeId, kind: EdgeKind) -> Self {
        Self {
            from,
            to,
            kind,
            label: None,
            direction: Direction::None,
            color: None,
            style: EdgeStyle::Solid,
        }
    }

    pub(crate) fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub(crate) fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub(crate) fn color(mut self, color: &str) -> Self {
        self.color = Some(color.to_owned());
        self
    }

    pub(crate) fn style(mut self, style: EdgeStyle) -> Self {
        self.style = style;
        self
    }
}

/// A laid-out but not yet serialized diagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Groups of nodes the renderer must place on the same row.
    pub ranks: Vec<Vec<NodeId>>,
    /// Context lanes, in the order they were opened.
    pub lanes: Vec<ContextId>,
    pub(crate) font: String,
}

impl Graph {
    pub fn edges_of(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |edge| edge.kind == kind)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id.as_str() == id)
    }
}

/// Knobs for the lane layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphOptions {
    /// Label of the resource lane header.
    pub resource_label: String,
    /// Lock waits at least this long are annotated on the waiting lane.
    pub wait_threshold: Duration,
    /// Color of `lock` edges.
    pub lock_color: String,
    /// Color of the annotated lane edge leading up to a contended lock.
    pub contention_color: String,
    /// Color of abandoned lock attempts.
    pub abandoned_color: String,
    pub font: String,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            resource_label: "mutex".to_owned(),
            wait_threshold: Duration::from_millis(1),
            lock_color: "#FF9205".to_owned(),
            contention_color: "#D7263D".to_owned(),
            abandoned_color: "#7F7F7F".to_owned(),
            font: "Consolas".to_owned(),
        }
    }
}

/// Human-sized duration, e.g. `850ns`, `12.5µs`, `1.250ms`, `2.000s`.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos < 1_000 {
        format!("{nanos}ns")
    } else if nanos < 1_000_000 {
        format!("{:.1}µs", nanos as f64 / 1_000.0)
    } else if nanos < 1_000_000_000 {
        format!("{:.3}ms", nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

/// Builds the graph for `actions` and serializes it in one go.
pub fn to_dot(actions: &[Action], options: &GraphOptions) -> String {
    build(actions, options).to_dot()
}
