//! Named force registry and the GPU force plan derived from it

use std::fmt;

use super::{
    CenterConfig, CollideConfig, DEFAULT_CHARGE, DEFAULT_COLLIDE_RADIUS, Force, ForceConfig,
    LinkConfig, ManyBodyConfig, PositionConfig, RadialConfig,
};
use crate::error::{Result, SimulationError};
use crate::model::Node;
use crate::random::Lcg;

/// Named forces in registration order.
///
/// Replacing a force keeps its position, so the CPU evaluation order only
/// changes when forces are added or removed.
#[derive(Default)]
pub struct ForceRegistry {
    entries: Vec<(String, Box<dyn Force>)>,
}

impl ForceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names in evaluation order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Force> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, force)| &**force)
    }

    /// Register or replace a force, returning the one it replaced
    pub fn insert(&mut self, name: &str, force: Box<dyn Force>) -> Option<Box<dyn Force>> {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, force)),
            None => {
                self.entries.push((name.to_string(), force));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Force>> {
        let position = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(position).1)
    }

    /// Re-bind every force to a node array
    pub fn initialize_all(&mut self, nodes: &[Node], random: &mut Lcg) -> Result<()> {
        for (_, force) in &mut self.entries {
            force.initialize(nodes, random)?;
        }
        Ok(())
    }

    /// Apply every force in registration order
    pub fn apply_all(&mut self, nodes: &mut [Node], alpha: f32) {
        for (_, force) in &mut self.entries {
            force.apply(nodes, alpha);
        }
    }

    /// Number of resolved links, if a link force is registered
    pub fn link_count(&self) -> Option<usize> {
        self.entries
            .iter()
            .find_map(|(_, force)| match force.configuration() {
                Some(ForceConfig::Link(link)) => Some(link.links.len()),
                _ => None,
            })
    }

    /// Build the GPU force plan.
    ///
    /// Fails with `CapabilityUnavailable` when a force has no GPU
    /// configuration or two forces share a kind.
    pub fn parallel_plan(&self) -> Result<ForcePlan> {
        let mut plan = ForcePlan::default();
        for (name, force) in &self.entries {
            let config = force.configuration().ok_or_else(|| {
                SimulationError::CapabilityUnavailable(format!(
                    "force '{name}' has no GPU kernel"
                ))
            })?;
            plan.enable(name, config)?;
        }
        Ok(plan)
    }
}

impl fmt::Debug for ForceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Enabled GPU forces by kind; `None` means disabled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForcePlan {
    pub many_body: Option<ManyBodyConfig>,
    pub link: Option<LinkConfig>,
    pub collide: Option<CollideConfig>,
    pub center: Option<CenterConfig>,
    pub x: Option<PositionConfig>,
    pub y: Option<PositionConfig>,
    pub radial: Option<RadialConfig>,
}

impl ForcePlan {
    /// Enable one force kind
    pub fn enable(&mut self, name: &str, config: ForceConfig) -> Result<()> {
        let kind = config.kind();
        let occupied = match config {
            ForceConfig::ManyBody(c) => self.many_body.replace(c).is_some(),
            ForceConfig::Link(c) => self.link.replace(c).is_some(),
            ForceConfig::Collide(c) => self.collide.replace(c).is_some(),
            ForceConfig::Center(c) => self.center.replace(c).is_some(),
            ForceConfig::X(c) => self.x.replace(c).is_some(),
            ForceConfig::Y(c) => self.y.replace(c).is_some(),
            ForceConfig::Radial(c) => self.radial.replace(c).is_some(),
        };
        if occupied {
            return Err(SimulationError::CapabilityUnavailable(format!(
                "force '{name}' is a second '{kind}' force"
            )));
        }
        Ok(())
    }

    pub fn link_count(&self) -> usize {
        self.link.as_ref().map_or(0, |link| link.links.len())
    }

    /// Many-body strength for nodes without their own
    pub fn default_strength(&self) -> f32 {
        self.many_body
            .as_ref()
            .map_or(DEFAULT_CHARGE, |c| c.strength)
    }

    /// Collision radius for nodes without their own
    pub fn default_radius(&self) -> f32 {
        self.collide
            .as_ref()
            .map_or(DEFAULT_COLLIDE_RADIUS, |c| c.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forces::{Center, LinkForce, ManyBody};
    use crate::model::Link;

    struct Drift;

    impl Force for Drift {
        fn apply(&mut self, nodes: &mut [Node], _alpha: f32) {
            for node in nodes {
                node.vx += 1.0;
            }
        }
    }

    #[test]
    fn replace_keeps_order() {
        let mut registry = ForceRegistry::new();
        registry.insert("charge", Box::new(ManyBody::new()));
        registry.insert("center", Box::new(Center::new(0.0, 0.0)));
        let replaced = registry.insert("charge", Box::new(ManyBody::new().strength(-5.0)));

        assert!(replaced.is_some());
        assert_eq!(registry.names().collect::<Vec<_>>(), ["charge", "center"]);
        assert!(registry.remove("charge").is_some());
        assert!(registry.remove("charge").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn plan_collects_enabled_kinds() {
        let nodes = vec![Node::at(0.0, 0.0), Node::at(1.0, 0.0)];
        let mut registry = ForceRegistry::new();
        registry.insert("charge", Box::new(ManyBody::new().strength(-10.0)));
        registry.insert("link", Box::new(LinkForce::new(vec![Link::new(0, 1)])));
        registry
            .initialize_all(&nodes, &mut Lcg::default())
            .expect("init");

        let plan = registry.parallel_plan().expect("plan");
        assert_eq!(plan.default_strength(), -10.0);
        assert_eq!(plan.link_count(), 1);
        assert!(plan.collide.is_none());
        assert_eq!(registry.link_count(), Some(1));
    }

    #[test]
    fn custom_force_blocks_plan() {
        let mut registry = ForceRegistry::new();
        registry.insert("drift", Box::new(Drift));
        assert!(matches!(
            registry.parallel_plan(),
            Err(SimulationError::CapabilityUnavailable(_))
        ));
    }

    #[test]
    fn duplicate_kind_blocks_plan() {
        let mut registry = ForceRegistry::new();
        registry.insert("a", Box::new(ManyBody::new()));
        registry.insert("b", Box::new(ManyBody::new()));
        assert!(registry.parallel_plan().is_err());
    }

    #[test]
    fn apply_all_runs_in_order() {
        let mut registry = ForceRegistry::new();
        registry.insert("drift", Box::new(Drift));
        let mut nodes = vec![Node::at(0.0, 0.0)];
        registry.apply_all(&mut nodes, 1.0);
        assert_eq!(nodes[0].vx, 1.0);
    }
}
