//! Radial positioning force

use super::{Force, ForceConfig, RadialConfig};
use crate::model::Node;

/// Offset substituted for a zero axis so a node at the exact center still moves
const CENTER_EPSILON: f32 = 1e-6;

/// Pulls nodes toward a circle of `radius` around `(x, y)`
#[derive(Debug, Clone, Default)]
pub struct Radial {
    config: RadialConfig,
}

impl Radial {
    pub fn new(radius: f32, x: f32, y: f32) -> Self {
        Self {
            config: RadialConfig {
                x,
                y,
                radius,
                ..RadialConfig::default()
            },
        }
    }

    pub fn from_config(config: RadialConfig) -> Self {
        Self { config }
    }

    pub fn strength(mut self, strength: f32) -> Self {
        self.config.strength = strength;
        self
    }
}

impl Force for Radial {
    fn apply(&mut self, nodes: &mut [Node], alpha: f32) {
        let RadialConfig {
            x,
            y,
            radius,
            strength,
        } = self.config;

        for node in nodes {
            let mut dx = node.x - x;
            let mut dy = node.y - y;
            if dx == 0.0 {
                dx = CENTER_EPSILON;
            }
            if dy == 0.0 {
                dy = CENTER_EPSILON;
            }
            let r = (dx * dx + dy * dy).sqrt();
            let k = (radius - r) * strength * alpha / r;
            node.vx += dx * k;
            node.vy += dy * k;
        }
    }

    fn configuration(&self) -> Option<ForceConfig> {
        Some(ForceConfig::Radial(self.config.clone()))
    }
}
