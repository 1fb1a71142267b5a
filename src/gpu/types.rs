//! GPU buffer records for the force simulation
//!
//! These types are uploaded directly to GPU buffers. All fields are 32-bit
//! and the structs are repr(C), so the layout matches the WGSL structs in
//! [`super::shaders`] byte for byte.

use bytemuck::{Pod, Zeroable};

use crate::forces::{ForcePlan, ResolvedLink, distance_max_squared};
use crate::model::Node;

/// Sentinel for "not fixed". Any non-finite value means not fixed; the shader
/// tests the exponent bits rather than comparing against NaN.
pub const NOT_FIXED: f32 = f32::NAN;

/// A node as seen by the GPU kernels.
///
/// `[x, y, vx, vy, fx, fy, strength, radius]`, 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct NodeRecord {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// Fixed x, or [`NOT_FIXED`]
    pub fx: f32,
    /// Fixed y, or [`NOT_FIXED`]
    pub fy: f32,
    /// Many-body strength
    pub strength: f32,
    /// Collision radius
    pub radius: f32,
}

impl NodeRecord {
    /// Encode a node, filling unset strength and radius from the plan defaults
    pub fn from_node(node: &Node, default_strength: f32, default_radius: f32) -> Self {
        Self {
            x: node.x,
            y: node.y,
            vx: node.vx,
            vy: node.vy,
            fx: node.fx.unwrap_or(NOT_FIXED),
            fy: node.fy.unwrap_or(NOT_FIXED),
            strength: node.strength.unwrap_or(default_strength),
            radius: node.radius.unwrap_or(default_radius),
        }
    }

    pub fn is_fixed_x(&self) -> bool {
        self.fx.is_finite()
    }

    pub fn is_fixed_y(&self) -> bool {
        self.fy.is_finite()
    }
}

/// A link as seen by the GPU kernels, padded to 8 words (32 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LinkRecord {
    pub source: u32,
    pub target: u32,
    pub distance: f32,
    pub strength: f32,
    /// Share of the displacement applied to the target
    pub bias: f32,
    pub _padding: [f32; 3],
}

impl From<&ResolvedLink> for LinkRecord {
    fn from(link: &ResolvedLink) -> Self {
        Self {
            source: link.source,
            target: link.target,
            distance: link.distance,
            strength: link.strength,
            bias: link.bias,
            _padding: [0.0; 3],
        }
    }
}

/// Global parameters for one step, uploaded as a uniform (96 bytes).
///
/// Disabled forces upload a zero strength (or zero iterations), which turns
/// their kernel into a no-op.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimulationParams {
    pub alpha: f32,
    pub velocity_decay: f32,
    pub node_count: u32,
    pub link_count: u32,
    pub center_x: f32,
    pub center_y: f32,
    pub center_strength: f32,
    /// Squared Barnes-Hut theta (carried for completeness; the kernel is exact)
    pub theta2: f32,
    pub distance_min2: f32,
    /// Squared cutoff, clamped to a large finite value
    pub distance_max2: f32,
    pub link_iterations: u32,
    pub collision_radius: f32,
    pub collision_strength: f32,
    pub collision_iterations: u32,
    pub x_target: f32,
    pub x_strength: f32,
    pub y_target: f32,
    pub y_strength: f32,
    pub radial_x: f32,
    pub radial_y: f32,
    pub radial_radius: f32,
    pub radial_strength: f32,
    pub _padding: [f32; 2],
}

impl SimulationParams {
    /// Translate a force plan into kernel parameters.
    ///
    /// This is the only place force configuration turns into uniform values.
    pub fn from_plan(plan: &ForcePlan, alpha: f32, velocity_decay: f32, node_count: u32) -> Self {
        let mut params = Self::zeroed();
        params.alpha = alpha;
        params.velocity_decay = velocity_decay;
        params.node_count = node_count;
        params.link_count = plan.link_count() as u32;
        params.distance_max2 = distance_max_squared(None);

        if let Some(c) = &plan.many_body {
            params.theta2 = c.theta * c.theta;
            params.distance_min2 = c.distance_min * c.distance_min;
            params.distance_max2 = distance_max_squared(c.distance_max);
        }
        if let Some(c) = &plan.link {
            params.link_iterations = c.iterations;
        }
        if let Some(c) = &plan.collide {
            params.collision_radius = c.radius;
            params.collision_strength = c.strength;
            params.collision_iterations = c.iterations;
        }
        if let Some(c) = &plan.center {
            params.center_x = c.x;
            params.center_y = c.y;
            params.center_strength = c.strength;
        }
        if let Some(c) = &plan.x {
            params.x_target = c.target;
            params.x_strength = c.strength;
        }
        if let Some(c) = &plan.y {
            params.y_target = c.target;
            params.y_strength = c.strength;
        }
        if let Some(c) = &plan.radial {
            params.radial_x = c.x;
            params.radial_y = c.y;
            params.radial_radius = c.radius;
            params.radial_strength = c.strength;
        }
        params
    }
}
