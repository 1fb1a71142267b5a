//! Sequential CPU backend
//!
//! Applies the registered forces in registration order against the live node
//! array, then integrates. Always available; the controller falls back to it
//! whenever the GPU backend cannot run.

use crate::backend::{Backend, BackendKind, StepContext, StepOutcome};
use crate::error::Result;
use crate::forces::ForceRegistry;
use crate::model::Node;

/// Damp velocities and advance positions; fixed axes snap and lose their velocity
pub fn integrate(nodes: &mut [Node], velocity_decay: f32) {
    for node in nodes {
        match node.fx {
            Some(fx) => {
                node.x = fx;
                node.vx = 0.0;
            }
            None => {
                node.vx *= velocity_decay;
                node.x += node.vx;
            }
        }
        match node.fy {
            Some(fy) => {
                node.y = fy;
                node.vy = 0.0;
            }
            None => {
                node.vy *= velocity_decay;
                node.y += node.vy;
            }
        }
    }
}

/// Scalar per-node, per-force evaluation loop
#[derive(Debug, Default)]
pub struct CpuBackend {
    steps: u64,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps completed by this backend instance
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl Backend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn configure(&mut self, _nodes: &[Node], _forces: &ForceRegistry) -> Result<()> {
        Ok(())
    }

    async fn step(&mut self, ctx: StepContext<'_>) -> Result<StepOutcome> {
        if ctx.is_cancelled() {
            return Ok(StepOutcome::Cancelled);
        }
        ctx.forces.apply_all(ctx.nodes, ctx.alpha);
        integrate(ctx.nodes, ctx.velocity_decay);
        self.steps += 1;
        Ok(StepOutcome::Completed)
    }

    async fn accumulate(&mut self, ctx: StepContext<'_>) -> Result<StepOutcome> {
        // Forces like centering move positions; keep only the velocity change
        let mut scratch = ctx.nodes.clone();
        ctx.forces.apply_all(&mut scratch, ctx.alpha);
        for (node, updated) in ctx.nodes.iter_mut().zip(&scratch) {
            node.vx = updated.vx;
            node.vy = updated.vy;
        }
        Ok(StepOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forces::{Center, ManyBody};

    #[test]
    fn integrate_damps_then_moves() {
        let mut nodes = vec![Node::at(0.0, 0.0).with_velocity(10.0, -5.0)];
        integrate(&mut nodes, 0.6);
        assert_eq!((nodes[0].vx, nodes[0].vy), (6.0, -3.0));
        assert_eq!((nodes[0].x, nodes[0].y), (6.0, -3.0));
    }

    #[test]
    fn fixed_axes_snap_and_stop() {
        let mut node = Node::at(3.0, 4.0).with_velocity(10.0, 10.0);
        node.fx = Some(-1.0);
        let mut nodes = vec![node];
        integrate(&mut nodes, 0.6);
        assert_eq!((nodes[0].x, nodes[0].vx), (-1.0, 0.0));
        assert_eq!((nodes[0].y, nodes[0].vy), (10.0, 6.0));
    }

    #[tokio::test]
    async fn step_applies_forces_then_integrates() {
        let mut nodes = vec![Node::at(0.0, 0.0), Node::at(10.0, 0.0)];
        let mut forces = ForceRegistry::new();
        forces.insert("charge", Box::new(ManyBody::new()));
        let mut backend = CpuBackend::new();

        let outcome = backend
            .step(StepContext {
                nodes: &mut nodes,
                forces: &mut forces,
                alpha: 1.0,
                velocity_decay: 0.6,
                running: None,
            })
            .await
            .expect("step");

        assert_eq!(outcome, StepOutcome::Completed);
        assert!((nodes[0].x - -1.8).abs() < 1e-5);
        assert_eq!(backend.steps(), 1);
    }

    #[tokio::test]
    async fn accumulate_touches_only_velocities() {
        let mut nodes = vec![Node::at(0.0, 0.0), Node::at(10.0, 0.0)];
        let mut forces = ForceRegistry::new();
        forces.insert("center", Box::new(Center::new(100.0, 100.0)));
        forces.insert("charge", Box::new(ManyBody::new()));

        CpuBackend::new()
            .accumulate(StepContext {
                nodes: &mut nodes,
                forces: &mut forces,
                alpha: 1.0,
                velocity_decay: 0.6,
                running: None,
            })
            .await
            .expect("accumulate");

        assert_eq!((nodes[0].x, nodes[1].x), (0.0, 10.0));
        assert!(nodes[0].vx < 0.0);
    }
}
