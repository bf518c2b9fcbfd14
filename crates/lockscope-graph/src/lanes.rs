use std::collections::{HashMap, HashSet};

use lockscope_types::{Action, ActionKind, ContextId, ROOT_CREATOR, Timestamp};

use crate::{
    Direction, Edge, EdgeKind, EdgeStyle, Graph, GraphOptions, Node, NodeId, Shape,
    format_duration,
};

const TIME_GROUP: &str = "time";
const RESOURCE_GROUP: &str = "resource";
const PLACEHOLDER_ROOT: &str = "root";

/// Lays out `actions` as a three-lane-family graph.
///
/// `actions` should come from an event log snapshot; they are re-sorted by
/// start time (stable, so equal timestamps keep their given order) before
/// layout. Never fails: contexts whose parent is missing from the log, or
/// whose lineage loops back on itself, branch off a placeholder root node.
pub fn build(actions: &[Action], options: &GraphOptions) -> Graph {
    let mut ordered: Vec<&Action> = actions.iter().collect();
    ordered.sort_by_key(|action| action.start);
    LaneBuilder::new(&ordered, options).run()
}

struct Lane {
    next_seq: u64,
    last: NodeId,
}

struct LaneBuilder<'a> {
    actions: &'a [&'a Action],
    options: &'a GraphOptions,
    /// Parent and creator of every context in the log, from its first action.
    lineage: HashMap<ContextId, (Option<ContextId>, &'a str)>,
    /// First context of the log, when nobody spawned it. It needs no branch.
    diagram_root: Option<ContextId>,
    lanes: HashMap<ContextId, Lane>,
    placeholder: Option<NodeId>,
    graph: Graph,
}

impl<'a> LaneBuilder<'a> {
    fn new(actions: &'a [&'a Action], options: &'a GraphOptions) -> Self {
        let mut lineage = HashMap::new();
        for action in actions {
            lineage
                .entry(action.context)
                .or_insert((action.parent, action.creator.as_str()));
        }
        let diagram_root = actions
            .first()
            .filter(|action| action.parent.is_none())
            .map(|action| action.context);

        Self {
            actions,
            options,
            lineage,
            diagram_root,
            lanes: HashMap::new(),
            placeholder: None,
            graph: Graph {
                nodes: Vec::new(),
                edges: Vec::new(),
                ranks: Vec::new(),
                lanes: Vec::new(),
                font: options.font.clone(),
            },
        }
    }

    fn run(mut self) -> Graph {
        let time_header = NodeId::lane("t", 0, 0);
        let resource_header = NodeId::lane("m", 0, 0);
        self.push_node(time_header.clone(), TIME_GROUP, "time", Shape::Square);
        let resource_label = self.options.resource_label.clone();
        self.push_node(
            resource_header.clone(),
            RESOURCE_GROUP,
            &resource_label,
            Shape::Square,
        );

        let mut top_rank = vec![time_header.clone(), resource_header.clone()];
        if let Some(root) = self.diagram_root {
            top_rank.push(self.open_lane(root, &mut HashSet::new()));
        }
        self.graph.ranks.push(top_rank);

        let actions = self.actions;
        let origin = actions
            .first()
            .map(|action| action.start)
            .unwrap_or(Timestamp::from_nanos(0));

        let mut last_tick = time_header;
        let mut last_resource = resource_header;
        for (index, action) in actions.iter().enumerate() {
            let tick = index as u64 + 1;
            self.open_lane(action.context, &mut HashSet::new());

            let time_node = NodeId::lane("t", 0, tick);
            let offset = action.start.saturating_duration_since(origin);
            self.push_node(
                time_node.clone(),
                TIME_GROUP,
                &format!("+{}", format_duration(offset)),
                Shape::Plaintext,
            );
            self.graph
                .edges
                .push(Edge::new(last_tick, time_node.clone(), EdgeKind::Tick));

            let context_node = self.step_lane(action);

            let resource_node = NodeId::lane("m", 0, tick);
            self.push_node(resource_node.clone(), RESOURCE_GROUP, "", Shape::Circle);
            self.graph.edges.push(Edge::new(
                last_resource,
                resource_node.clone(),
                EdgeKind::ResourceStep,
            ));

            self.graph.ranks.push(vec![
                time_node.clone(),
                context_node.clone(),
                resource_node.clone(),
            ]);
            let access = self.access_edge(action.kind, context_node, resource_node.clone());
            self.graph.edges.push(access);

            last_tick = time_node;
            last_resource = resource_node;
        }

        tracing::trace!(
            actions = actions.len(),
            lanes = self.graph.lanes.len(),
            nodes = self.graph.nodes.len(),
            edges = self.graph.edges.len(),
            "built lane graph"
        );
        self.graph
    }

    /// Opens the lane of `context` if needed and returns its header node.
    ///
    /// A parent that appears in the log is opened first, so the branch edge
    /// always starts from the parent's latest node.
    fn open_lane(&mut self, context: ContextId, visiting: &mut HashSet<ContextId>) -> NodeId {
        let header = NodeId::lane("g", context.get(), 0);
        if self.lanes.contains_key(&context) {
            return header;
        }
        visiting.insert(context);

        let (parent, creator) = self
            .lineage
            .get(&context)
            .copied()
            .unwrap_or((None, ROOT_CREATOR));
        self.push_node(
            header.clone(),
            &lane_group(context),
            &format!("{creator} #{context}"),
            Shape::Square,
        );
        self.lanes.insert(
            context,
            Lane {
                next_seq: 1,
                last: header.clone(),
            },
        );
        self.graph.lanes.push(context);

        if self.diagram_root != Some(context) {
            let source = match parent {
                Some(parent)
                    if self.lineage.contains_key(&parent) && !visiting.contains(&parent) =>
                {
                    self.open_lane(parent, visiting);
                    match self.lanes.get(&parent) {
                        Some(lane) => lane.last.clone(),
                        None => self.placeholder(),
                    }
                }
                _ => self.placeholder(),
            };
            self.graph.edges.push(
                Edge::new(source, header.clone(), EdgeKind::Branch)
                    .direction(Direction::Forward)
                    .style(EdgeStyle::Dashed),
            );
        }
        header
    }

    fn placeholder(&mut self) -> NodeId {
        if let Some(id) = &self.placeholder {
            return id.clone();
        }
        let id = NodeId::named(PLACEHOLDER_ROOT);
        self.graph.nodes.push(Node {
            id: id.clone(),
            group: PLACEHOLDER_ROOT.to_owned(),
            label: "unknown parent".to_owned(),
            shape: Shape::Square,
            dashed: true,
        });
        self.placeholder = Some(id.clone());
        id
    }

    /// Appends a node to the acting context's lane.
    fn step_lane(&mut self, action: &Action) -> NodeId {
        let context = action.context;
        let Some(lane) = self.lanes.get_mut(&context) else {
            unreachable!("lane for context {context} must be opened before stepping");
        };
        let node = NodeId::lane("g", context.get(), lane.next_seq);
        lane.next_seq += 1;
        let previous = std::mem::replace(&mut lane.last, node.clone());

        self.push_node(node.clone(), &lane_group(context), "", Shape::Circle);

        let mut edge = Edge::new(previous, node.clone(), EdgeKind::LaneStep);
        match action.kind {
            ActionKind::LockAcquired { .. } => {
                if let Some(waited) = action.waited()
                    && waited >= self.options.wait_threshold
                {
                    edge = edge
                        .label(format!("waited {}", format_duration(waited)))
                        .color(&self.options.contention_color)
                        .direction(Direction::Forward);
                }
            }
            ActionKind::LockAbandoned { .. } => {
                let waited = action.waited().unwrap_or_default();
                edge = edge
                    .label(format!("gave up after {}", format_duration(waited)))
                    .color(&self.options.abandoned_color)
                    .style(EdgeStyle::Dashed);
            }
            _ => {}
        }
        self.graph.edges.push(edge);
        node
    }

    fn access_edge(&self, kind: ActionKind, context_node: NodeId, resource_node: NodeId) -> Edge {
        let edge = Edge::new(context_node, resource_node, EdgeKind::Access);
        match kind {
            ActionKind::LockRequested => edge
                .label("request")
                .direction(Direction::Forward)
                .style(EdgeStyle::Dashed),
            ActionKind::LockAcquired { .. } => edge
                .label("lock")
                .direction(Direction::Forward)
                .color(&self.options.lock_color),
            ActionKind::LockAbandoned { .. } => edge
                .label("timeout")
                .direction(Direction::Forward)
                .color(&self.options.abandoned_color)
                .style(EdgeStyle::Dashed),
            ActionKind::Unlock => edge.label("unlock").direction(Direction::Back),
            ActionKind::Read => edge.label("read").direction(Direction::Back),
            ActionKind::Set => edge.label("set").direction(Direction::Forward),
        }
    }

    fn push_node(&mut self, id: NodeId, group: &str, label: &str, shape: Shape) {
        self.graph.nodes.push(Node {
            id,
            group: group.to_owned(),
            label: label.to_owned(),
            shape,
            dashed: false,
        });
    }
}

fn lane_group(context: ContextId) -> String {
    format!("g{context}")
}
