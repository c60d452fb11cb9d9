//! DOT rendering of the relation map.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::graph::RelationEdge;

/// Draw one node per entity, or one node per type with duplicate edges merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DotLevel {
    #[default]
    Instance,
    Type,
}

#[derive(Debug, Clone, Copy, Default)]
pub enum RankDir {
    #[default]
    LR,
    TB,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DotOptions {
    pub level: DotLevel,
    pub rankdir: RankDir,
    /// Group nodes into one subgraph per type group.
    pub clusters: bool,
}

#[derive(Debug, Default)]
pub struct DotGenerator;

impl DotGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {}
    }

    #[must_use]
    pub fn generate_dot(&self, edges: &[RelationEdge]) -> String {
        self.generate_dot_with_options(edges, DotOptions::default())
    }

    #[must_use]
    pub fn generate_dot_with_options(&self, edges: &[RelationEdge], opts: DotOptions) -> String {
        // (group, node) pairs and (source, target, label) triples, deduplicated
        let mut nodes: BTreeSet<(String, String)> = BTreeSet::new();
        let mut lines: BTreeSet<(String, String, String)> = BTreeSet::new();
        for e in edges {
            let (src, dst) = match opts.level {
                DotLevel::Instance => (e.source.to_string(), e.target.to_string()),
                DotLevel::Type => (e.source.type_label(), e.target.type_label()),
            };
            nodes.insert((e.source.type_name.group().to_string(), src.clone()));
            nodes.insert((e.target.type_name.group().to_string(), dst.clone()));
            lines.insert((src, dst, e.label.clone()));
        }

        let mut s = String::from("digraph G {\n");
        let rank = match opts.rankdir {
            RankDir::LR => "LR",
            RankDir::TB => "TB",
        };
        let _ = writeln!(s, "  rankdir={rank};\n  node [shape=box, fontsize=10];\n  edge [fontsize=9];");

        if opts.clusters {
            let mut by_group: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
            for (group, node) in &nodes {
                by_group.entry(group.as_str()).or_default().push(node.as_str());
            }
            for (group, members) in by_group {
                let _ = writeln!(
                    s,
                    "  subgraph \"cluster_{}\" {{\n    label=\"{}\";\n    color=lightgrey;",
                    sanitize_id(group),
                    escape_label(group)
                );
                for node in members {
                    let _ = writeln!(s, "    \"{}\";", escape_label(node));
                }
                s.push_str("  }\n");
            }
        }

        for (src, dst, label) in &lines {
            let _ = writeln!(
                s,
                "  \"{}\" -> \"{}\" [label=\"{}\"];",
                escape_label(src),
                escape_label(dst),
                escape_label(label)
            );
        }
        s.push_str("}\n");
        s
    }
}

fn sanitize_id(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .collect()
}

fn escape_label(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
