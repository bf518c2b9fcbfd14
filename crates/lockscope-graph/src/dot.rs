//! Graphviz DOT serialization of a [`Graph`].

use std::fmt;

use crate::{Direction, Edge, EdgeStyle, Graph, Node, Shape};

impl Graph {
    pub fn to_dot(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digraph lockscope {{")?;
        writeln!(f, "  rankdir=\"TB\";")?;
        writeln!(f, "  nodesep=0.5;")?;
        writeln!(f, "  ranksep=0.25;")?;
        writeln!(f, "  splines=line;")?;
        writeln!(f, "  forcelabels=false;")?;
        writeln!(f)?;
        writeln!(
            f,
            "  node [style=filled, color=\"black\", fontcolor=\"black\", fontname=\"{}\", fontsize=\"8pt\"];",
            escape(&self.font)
        )?;
        writeln!(
            f,
            "  edge [arrowhead=vee, color=\"black\", penwidth=2, dir=none, fontsize=\"6pt\"];"
        )?;
        writeln!(
            f,
            "  node [width=0.2, height=0.2, label=\"\", margin=\"0.11,0.055\", shape=circle, penwidth=2, fillcolor=\"#FF8000\"];"
        )?;

        writeln!(f)?;
        for node in &self.nodes {
            write_node(f, node)?;
        }

        writeln!(f)?;
        for edge in &self.edges {
            write_edge(f, edge)?;
        }

        writeln!(f)?;
        for rank in &self.ranks {
            write!(f, "  {{ rank=\"same\";")?;
            for id in rank {
                write!(f, " {id};")?;
            }
            writeln!(f, " }}")?;
        }
        writeln!(f, "}}")
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &Node) -> fmt::Result {
    write!(f, "  {} [group=\"{}\"", node.id, escape(&node.group))?;
    if !node.label.is_empty() {
        write!(f, ", label=\"{}\"", escape(&node.label))?;
    }
    match node.shape {
        Shape::Circle => {}
        Shape::Square => write!(f, ", shape=square")?,
        Shape::Plaintext => write!(f, ", shape=plaintext")?,
    }
    if node.dashed {
        write!(f, ", style=\"filled,dashed\"")?;
    }
    writeln!(f, "];")
}

fn write_edge(f: &mut fmt::Formatter<'_>, edge: &Edge) -> fmt::Result {
    let mut attrs = Vec::new();
    if let Some(label) = &edge.label {
        attrs.push(format!("label=\"{}\"", escape(label)));
    }
    match edge.direction {
        Direction::Forward => attrs.push("dir=forward".to_owned()),
        Direction::Back => attrs.push("dir=back".to_owned()),
        Direction::None => {}
    }
    if let Some(color) = &edge.color {
        attrs.push(format!("color=\"{}\"", escape(color)));
    }
    if edge.style == EdgeStyle::Dashed {
        attrs.push("style=dashed".to_owned());
    }

    write!(f, "  {} -> {}", edge.from, edge.to)?;
    if !attrs.is_empty() {
        write!(f, " [{}]", attrs.join(", "))?;
    }
    writeln!(f, ";")
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_backslashes_and_newlines() {
        assert_eq!(escape(r#"say "hi"\now"#), r#"say \"hi\"\\now"#);
        assert_eq!(escape("two\nlines"), "two\\nlines");
    }
}
