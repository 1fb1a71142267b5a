//! Many-body (charge) force

use super::{Force, ForceConfig, ManyBodyConfig};
use crate::jiggle::pair_jiggle;
use crate::model::Node;

/// Largest squared cutoff representable on the GPU without overflow
pub const DISTANCE_MAX2_LIMIT: f32 = 1e30;

/// Squared cutoff distance, clamping unbounded or huge values to [`DISTANCE_MAX2_LIMIT`]
pub fn distance_max_squared(distance_max: Option<f32>) -> f32 {
    match distance_max {
        Some(d) => {
            let d2 = d * d;
            if d2.is_finite() && d2 <= DISTANCE_MAX2_LIMIT {
                d2
            } else {
                DISTANCE_MAX2_LIMIT
            }
        }
        None => DISTANCE_MAX2_LIMIT,
    }
}

/// Pairwise repulsion (negative strength) or attraction (positive strength).
///
/// Evaluated exactly over all pairs, matching the tiled GPU kernel term for term.
#[derive(Debug, Clone, Default)]
pub struct ManyBody {
    config: ManyBodyConfig,
}

impl ManyBody {
    /// Many-body force with d3-force defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: ManyBodyConfig) -> Self {
        Self { config }
    }

    /// Default strength for nodes without their own
    pub fn strength(mut self, strength: f32) -> Self {
        self.config.strength = strength;
        self
    }

    pub fn theta(mut self, theta: f32) -> Self {
        self.config.theta = theta;
        self
    }

    /// Minimum distance; closer pairs have their force capped
    pub fn distance_min(mut self, distance: f32) -> Self {
        self.config.distance_min = distance;
        self
    }

    /// Maximum distance; farther pairs are ignored
    pub fn distance_max(mut self, distance: f32) -> Self {
        self.config.distance_max = Some(distance);
        self
    }
}

impl Force for ManyBody {
    fn apply(&mut self, nodes: &mut [Node], alpha: f32) {
        let n = nodes.len() as u32;
        let min2 = self.config.distance_min * self.config.distance_min;
        let max2 = distance_max_squared(self.config.distance_max);
        let bodies: Vec<(f32, f32, f32)> = nodes
            .iter()
            .map(|node| {
                (
                    node.x,
                    node.y,
                    node.strength.unwrap_or(self.config.strength),
                )
            })
            .collect();

        for (i, node) in nodes.iter_mut().enumerate() {
            let (x, y, _) = bodies[i];
            let (mut fx, mut fy) = (0.0_f32, 0.0_f32);

            for (j, &(ox, oy, strength)) in bodies.iter().enumerate() {
                if i == j {
                    continue;
                }
                let mut dx = ox - x;
                let mut dy = oy - y;
                let mut l2 = dx * dx + dy * dy;
                if l2 >= max2 {
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
                if l2 < min2 {
                    l2 = (min2 * l2).sqrt();
                }
                let w = strength * alpha / l2;
                fx += dx * w;
                fy += dy * w;
            }

            node.vx += fx;
            node.vy += fy;
        }
    }

    fn configuration(&self) -> Option<ForceConfig> {
        Some(ForceConfig::ManyBody(self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repulsion_pushes_apart() {
        let mut nodes = vec![Node::at(0.0, 0.0), Node::at(10.0, 0.0)];
        ManyBody::new().apply(&mut nodes, 1.0);

        // -30 * 1 / 100 along dx = 10
        assert!((nodes[0].vx - -3.0).abs() < 1e-5);
        assert!((nodes[1].vx - 3.0).abs() < 1e-5);
        // dy == 0 is jittered in opposite directions
        assert_eq!(nodes[0].vy, -nodes[1].vy);
        assert!(nodes[0].vy.abs() < 1e-5);
    }

    #[test]
    fn coincident_nodes_separate_without_nan() {
        let mut nodes = vec![Node::at(5.0, 5.0), Node::at(5.0, 5.0)];
        ManyBody::new().apply(&mut nodes, 1.0);

        for node in &nodes {
            assert!(node.vx.is_finite() && node.vy.is_finite());
        }
        assert!(nodes[0].vx != 0.0);
        assert_eq!(nodes[0].vx, -nodes[1].vx);
        assert_eq!(nodes[0].vy, -nodes[1].vy);
    }

    #[test]
    fn distance_max_cuts_off_far_pairs() {
        let mut nodes = vec![Node::at(0.0, 0.0), Node::at(100.0, 0.0)];
        ManyBody::new().distance_max(50.0).apply(&mut nodes, 1.0);
        assert_eq!(nodes[0].vx, 0.0);
    }

    #[test]
    fn per_node_strength_overrides_default() {
        let mut nodes = vec![
            Node::at(0.0, 0.0),
            Node::at(10.0, 0.0).with_strength(0.0),
        ];
        ManyBody::new().apply(&mut nodes, 1.0);
        assert_eq!(nodes[0].vx, 0.0);
        assert!(nodes[1].vx > 0.0);
    }

    #[test]
    fn infinite_cutoff_is_clamped() {
        assert_eq!(distance_max_squared(None), DISTANCE_MAX2_LIMIT);
        assert_eq!(distance_max_squared(Some(f32::INFINITY)), DISTANCE_MAX2_LIMIT);
        assert_eq!(distance_max_squared(Some(1e20)), DISTANCE_MAX2_LIMIT);
        assert_eq!(distance_max_squared(Some(10.0)), 100.0);
    }
}
