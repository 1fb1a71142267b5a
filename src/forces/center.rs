//! Centering force

use super::{CenterConfig, Force, ForceConfig};
use crate::model::Node;

/// Translates all nodes so their mean position moves toward `(x, y)`.
///
/// Acts on positions directly and ignores alpha, like d3's `forceCenter`.
#[derive(Debug, Clone, Default)]
pub struct Center {
    config: CenterConfig,
}

impl Center {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            config: CenterConfig {
                x,
                y,
                ..CenterConfig::default()
            },
        }
    }

    pub fn from_config(config: CenterConfig) -> Self {
        Self { config }
    }

    pub fn strength(mut self, strength: f32) -> Self {
        self.config.strength = strength;
        self
    }
}

impl Force for Center {
    fn apply(&mut self, nodes: &mut [Node], _alpha: f32) {
        if nodes.is_empty() {
            return;
        }
        let (sx, sy) = nodes
            .iter()
            .fold((0.0_f32, 0.0_f32), |(sx, sy), n| (sx + n.x, sy + n.y));
        let count = nodes.len() as f32;
        let shift_x = (sx / count - self.config.x) * self.config.strength;
        let shift_y = (sy / count - self.config.y) * self.config.strength;

        for node in nodes {
            node.x -= shift_x;
            node.y -= shift_y;
        }
    }

    fn configuration(&self) -> Option<ForceConfig> {
        Some(ForceConfig::Center(self.config.clone()))
    }
}
