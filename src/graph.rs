//! JSON graph interchange
//!
//! Graphs on disk name their nodes by string id and reference those ids from
//! links. Reading resolves the ids to array indices; writing a layout pairs
//! each id with its final position.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::error::{Result, SimulationError};
use crate::model::{Link, Node};
use crate::random::Lcg;

/// A node as stored in a graph file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x: None,
            y: None,
            fx: None,
            fy: None,
            strength: None,
            radius: None,
        }
    }
}

/// A link between two node ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
}

/// A graph file: nodes plus links
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphFile {
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub links: Vec<GraphLink>,
}

impl GraphFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| SimulationError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| SimulationError::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Resolve ids into simulation nodes and index-based links.
    ///
    /// Fails with `InvalidLink` if a link names an id that no node has, and
    /// with `Config` if two nodes share an id.
    pub fn to_simulation(&self) -> Result<(Vec<Node>, Vec<Link>)> {
        let mut ids = HashMap::with_capacity(self.nodes.len());
        for (index, node) in self.nodes.iter().enumerate() {
            if ids.insert(node.id.as_str(), index).is_some() {
                return Err(SimulationError::Config(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }

        let nodes = self
            .nodes
            .iter()
            .map(|n| Node {
                x: n.x.unwrap_or(f32::NAN),
                y: n.y.unwrap_or(f32::NAN),
                fx: n.fx,
                fy: n.fy,
                strength: n.strength,
                radius: n.radius,
                ..Node::new()
            })
            .collect();

        let lookup = |index: usize, id: &str| {
            ids.get(id).copied().ok_or_else(|| SimulationError::InvalidLink {
                index,
                reason: format!("unknown node id '{id}'"),
            })
        };
        let links = self
            .links
            .iter()
            .enumerate()
            .map(|(index, l)| {
                Ok(Link {
                    distance: l.distance,
                    strength: l.strength,
                    ..Link::new(lookup(index, &l.source)?, lookup(index, &l.target)?)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((nodes, links))
    }

    /// A random graph for benchmarking: `node_count` nodes, `link_count` links
    /// with distinct endpoints, chosen deterministically from `seed`
    pub fn generate_random(node_count: usize, link_count: usize, seed: u32) -> Self {
        let mut random = Lcg::new(seed);
        let nodes = (0..node_count)
            .map(|i| GraphNode::new(format!("n{i}")))
            .collect();
        let links = if node_count < 2 {
            Vec::new()
        } else {
            (0..link_count)
                .map(|_| {
                    let source = random.next_index(node_count);
                    // Offset in 1..n so the target never equals the source
                    let target = (source + 1 + random.next_index(node_count - 1)) % node_count;
                    GraphLink {
                        source: format!("n{source}"),
                        target: format!("n{target}"),
                        distance: None,
                        strength: None,
                    }
                })
                .collect()
        };
        Self { nodes, links }
    }
}

/// Final position of one node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionedNode {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

/// Result of a layout run, as written by the CLI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutOutput {
    pub mode: BackendKind,
    pub alpha: f64,
    pub ticks: usize,
    pub nodes: Vec<PositionedNode>,
}

impl LayoutOutput {
    pub fn new(graph: &GraphFile, nodes: &[Node], mode: BackendKind, alpha: f64, ticks: usize) -> Self {
        let nodes = graph
            .nodes
            .iter()
            .zip(nodes)
            .map(|(g, n)| PositionedNode {
                id: g.id.clone(),
                x: n.x,
                y: n.y,
                vx: n.vx,
                vy: n.vy,
            })
            .collect();
        Self {
            mode,
            alpha,
            ticks,
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_resolve_to_indices() {
        let graph = GraphFile::from_json(
            r#"{
                "nodes": [{"id": "a"}, {"id": "b", "x": 3, "y": 4, "fx": 3}, {"id": "c"}],
                "links": [{"source": "a", "target": "c", "distance": 50}]
            }"#,
        )
        .unwrap();
        let (nodes, links) = graph.to_simulation().unwrap();

        assert_eq!(nodes.len(), 3);
        assert!(!nodes[0].is_placed());
        assert_eq!((nodes[1].x, nodes[1].y, nodes[1].fx), (3.0, 4.0, Some(3.0)));
        assert_eq!((links[0].source, links[0].target), (0, 2));
        assert_eq!(links[0].distance, Some(50.0));
    }

    #[test]
    fn unknown_id_is_an_invalid_link() {
        let graph = GraphFile::from_json(
            r#"{"nodes": [{"id": "a"}], "links": [{"source": "a", "target": "zz"}]}"#,
        )
        .unwrap();
        let err = graph.to_simulation().unwrap_err();
        assert!(matches!(err, SimulationError::InvalidLink { index: 0, .. }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let graph = GraphFile::from_json(r#"{"nodes": [{"id": "a"}, {"id": "a"}]}"#).unwrap();
        assert!(matches!(
            graph.to_simulation(),
            Err(SimulationError::Config(_))
        ));
    }

    #[test]
    fn random_graph_has_no_self_links() {
        let graph = GraphFile::generate_random(50, 200, 7);
        assert_eq!(graph.nodes.len(), 50);
        assert_eq!(graph.links.len(), 200);
        assert!(graph.links.iter().all(|l| l.source != l.target));
        assert_eq!(graph, GraphFile::generate_random(50, 200, 7));
        assert!(graph.to_simulation().is_ok());
    }

    #[test]
    fn single_node_graph_gets_no_links() {
        let graph = GraphFile::generate_random(1, 10, 1);
        assert!(graph.links.is_empty());
    }

    #[test]
    fn layout_output_shape() {
        let graph = GraphFile {
            nodes: vec![GraphNode::new("only")],
            links: Vec::new(),
        };
        let output = LayoutOutput::new(&graph, &[Node::at(1.5, -2.0)], BackendKind::Cpu, 0.0009, 300);
        insta::assert_snapshot!(
            serde_json::to_string(&output).unwrap(),
            @r#"{"mode":"cpu","alpha":0.0009,"ticks":300,"nodes":[{"id":"only","x":1.5,"y":-2.0,"vx":0.0,"vy":0.0}]}"#
        );
    }
}
