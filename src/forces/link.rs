//! Link (spring) force

use super::{Force, ForceConfig, LinkConfig};
use crate::error::{Result, SimulationError};
use crate::jiggle::jiggle;
use crate::model::{Link, Node};
use crate::random::Lcg;

/// A link with every parameter resolved against a node array
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLink {
    pub source: u32,
    pub target: u32,
    pub distance: f32,
    pub strength: f32,
    /// Share of the spring displacement applied to the target
    pub bias: f32,
}

/// Resolve links against `node_count` nodes.
///
/// Missing distances fall back to `default_distance`; missing strengths to
/// `default_strength`, or `1 / min(degree(source), degree(target))` when that
/// is `None` too. Bias is `degree(source) / (degree(source) + degree(target))`.
pub fn resolve_links(
    links: &[Link],
    node_count: usize,
    default_distance: f32,
    default_strength: Option<f32>,
) -> Result<Vec<ResolvedLink>> {
    let mut degree = vec![0u32; node_count];

    for (index, link) in links.iter().enumerate() {
        for endpoint in [link.source, link.target] {
            if endpoint >= node_count {
                return Err(SimulationError::InvalidLink {
                    index,
                    reason: format!("node {endpoint} out of range for {node_count} nodes"),
                });
            }
        }
        let values = [link.distance, link.strength];
        if values.iter().flatten().any(|v| !v.is_finite()) {
            return Err(SimulationError::InvalidLink {
                index,
                reason: "distance and strength must be finite".to_string(),
            });
        }
        degree[link.source] += 1;
        degree[link.target] += 1;
    }

    Ok(links
        .iter()
        .map(|link| {
            let source_degree = degree[link.source];
            let target_degree = degree[link.target];
            debug_assert!(source_degree >= 1 && target_degree >= 1);

            ResolvedLink {
                source: link.source as u32,
                target: link.target as u32,
                distance: link.distance.unwrap_or(default_distance),
                strength: link
                    .strength
                    .or(default_strength)
                    .unwrap_or_else(|| 1.0 / source_degree.min(target_degree) as f32),
                bias: source_degree as f32 / (source_degree + target_degree) as f32,
            }
        })
        .collect())
}

/// Spring displacement for link `k` given a `[x, y, vx, vy]` snapshot
fn spring(link: &ResolvedLink, k: usize, snapshot: &[[f32; 4]], alpha: f32) -> (f32, f32) {
    let s = snapshot[link.source as usize];
    let t = snapshot[link.target as usize];
    let seed = (k as u32).wrapping_mul(2);

    let mut dx = t[0] + t[2] - s[0] - s[2];
    let mut dy = t[1] + t[3] - s[1] - s[3];
    if dx == 0.0 {
        dx = jiggle(seed);
    }
    if dy == 0.0 {
        dy = jiggle(seed.wrapping_add(1));
    }
    let l = (dx * dx + dy * dy).sqrt();
    let w = (l - link.distance) / l * alpha * link.strength;
    (dx * w, dy * w)
}

/// Spring force pulling linked nodes toward their rest distance.
///
/// Each iteration reads a snapshot of the node state taken at its start, so
/// the result does not depend on link order.
#[derive(Debug, Clone, Default)]
pub struct LinkForce {
    links: Vec<Link>,
    config: LinkConfig,
}

impl LinkForce {
    pub fn new(links: Vec<Link>) -> Self {
        Self {
            links,
            config: LinkConfig::default(),
        }
    }

    pub fn from_config(links: Vec<Link>, mut config: LinkConfig) -> Self {
        config.links.clear();
        Self { links, config }
    }

    /// Rest length for links without their own
    pub fn distance(mut self, distance: f32) -> Self {
        self.config.distance = distance;
        self
    }

    /// Strength for links without their own (overrides the degree-derived default)
    pub fn strength(mut self, strength: f32) -> Self {
        self.config.strength = Some(strength);
        self
    }

    /// Relaxation passes per step
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.config.iterations = iterations;
        self
    }

    /// The links as given
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// The links resolved at the last initialization
    pub fn resolved(&self) -> &[ResolvedLink] {
        &self.config.links
    }
}

impl Force for LinkForce {
    fn initialize(&mut self, nodes: &[Node], _random: &mut Lcg) -> Result<()> {
        self.config.links = resolve_links(
            &self.links,
            nodes.len(),
            self.config.distance,
            self.config.strength,
        )?;
        Ok(())
    }

    fn apply(&mut self, nodes: &mut [Node], alpha: f32) {
        if self.config.links.is_empty() {
            return;
        }
        let mut delta = vec![(0.0_f32, 0.0_f32); nodes.len()];

        for _ in 0..self.config.iterations {
            let snapshot: Vec<[f32; 4]> = nodes.iter().map(|n| [n.x, n.y, n.vx, n.vy]).collect();
            delta.fill((0.0, 0.0));

            for (k, link) in self.config.links.iter().enumerate() {
                let (fx, fy) = spring(link, k, &snapshot, alpha);
                let target = &mut delta[link.target as usize];
                target.0 -= fx * link.bias;
                target.1 -= fy * link.bias;
                let source = &mut delta[link.source as usize];
                source.0 += fx * (1.0 - link.bias);
                source.1 += fy * (1.0 - link.bias);
            }

            for (node, (dvx, dvy)) in nodes.iter_mut().zip(&delta) {
                node.vx += dvx;
                node.vy += dvy;
            }
        }
    }

    fn configuration(&self) -> Option<ForceConfig> {
        Some(ForceConfig::Link(self.config.clone()))
    }
}
