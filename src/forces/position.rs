//! Single-axis positioning forces

use super::{Force, ForceConfig, PositionConfig};
use crate::model::Node;

/// Pulls every node's x toward a target
#[derive(Debug, Clone, Default)]
pub struct ForceX {
    config: PositionConfig,
}

impl ForceX {
    pub fn new(x: f32) -> Self {
        Self {
            config: PositionConfig {
                target: x,
                ..PositionConfig::default()
            },
        }
    }

    pub fn from_config(config: PositionConfig) -> Self {
        Self { config }
    }

    pub fn strength(mut self, strength: f32) -> Self {
        self.config.strength = strength;
        self
    }
}

impl Force for ForceX {
    fn apply(&mut self, nodes: &mut [Node], alpha: f32) {
        let PositionConfig { target, strength } = self.config;
        for node in nodes {
            node.vx += (target - node.x) * strength * alpha;
        }
    }

    fn configuration(&self) -> Option<ForceConfig> {
        Some(ForceConfig::X(self.config.clone()))
    }
}

/// Pulls every node's y toward a target
#[derive(Debug, Clone, Default)]
pub struct ForceY {
    config: PositionConfig,
}

impl ForceY {
    pub fn new(y: f32) -> Self {
        Self {
            config: PositionConfig {
                target: y,
                ..PositionConfig::default()
            },
        }
    }

    pub fn from_config(config: PositionConfig) -> Self {
        Self { config }
    }

    pub fn strength(mut self, strength: f32) -> Self {
        self.config.strength = strength;
        self
    }
}

impl Force for ForceY {
    fn apply(&mut self, nodes: &mut [Node], alpha: f32) {
        let PositionConfig { target, strength } = self.config;
        for node in nodes {
            node.vy += (target - node.y) * strength * alpha;
        }
    }

    fn configuration(&self) -> Option<ForceConfig> {
        Some(ForceConfig::Y(self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_forces_pull_toward_target() {
        let mut nodes = vec![Node::at(10.0, -20.0)];
        ForceX::new(0.0).apply(&mut nodes, 0.5);
        ForceY::new(0.0).strength(1.0).apply(&mut nodes, 0.5);
        assert!((nodes[0].vx - -0.5).abs() < 1e-6);
        assert!((nodes[0].vy - 10.0).abs() < 1e-6);
    }
}
