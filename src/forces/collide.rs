//! Collision force

use super::{CollideConfig, Force, ForceConfig};
use crate::jiggle::pair_jiggle;
use crate::model::Node;

/// Pushes apart nodes whose circles overlap.
///
/// Works on predicted positions (`x + vx`) snapshotted at the start of every
/// iteration. The impulse `(r_i + r_j - l) * strength / 2` is weighted by the
/// other node's share of the combined radius, so larger nodes move less.
#[derive(Debug, Clone, Default)]
pub struct Collide {
    config: CollideConfig,
}

impl Collide {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CollideConfig) -> Self {
        Self { config }
    }

    /// Radius for nodes without their own
    pub fn radius(mut self, radius: f32) -> Self {
        self.config.radius = radius;
        self
    }

    pub fn strength(mut self, strength: f32) -> Self {
        self.config.strength = strength;
        self
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.config.iterations = iterations;
        self
    }
}

impl Force for Collide {
    fn apply(&mut self, nodes: &mut [Node], _alpha: f32) {
        let n = nodes.len() as u32;

        for _ in 0..self.config.iterations {
            let predicted: Vec<(f32, f32, f32)> = nodes
                .iter()
                .map(|node| {
                    (
                        node.x + node.vx,
                        node.y + node.vy,
                        node.radius.unwrap_or(self.config.radius),
                    )
                })
                .collect();

            for (i, node) in nodes.iter_mut().enumerate() {
                let (x, y, r) = predicted[i];
                let (mut dvx, mut dvy) = (0.0_f32, 0.0_f32);

                for (j, &(ox, oy, other_r)) in predicted.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let combined = r + other_r;
                    let mut dx = x - ox;
                    let mut dy = y - oy;
                    let mut l2 = dx * dx + dy * dy;
                    if l2 >= combined * combined {
                        continue;
                    }
                    if dx == 0.0 {
                        dx = pair_jiggle(i as u32, j as u32, n, 0);
                        l2 += dx * dx;
                    }
                    if dy == 0.0 {
                        dy = pair_jiggle(i as u32, j as u32, n, 1);
                        l2 += dy * dy;
                    }
                    let l = l2.sqrt();
                    let impulse =
                        (combined - l) * self.config.strength * 0.5 * (other_r / combined);
                    dvx += dx / l * impulse;
                    dvy += dy / l * impulse;
                }

                node.vx += dvx;
                node.vy += dvy;
            }
        }
    }

    fn configuration(&self) -> Option<ForceConfig> {
        Some(ForceConfig::Collide(self.config.clone()))
    }
}
