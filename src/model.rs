//! Node and link data model shared by both backends
//!
//! The controller owns the canonical `Vec<Node>`. Backends mutate it in place
//! during their step (CPU) or overwrite it from a readback (GPU).

use serde::{Deserialize, Serialize};

/// Radius of the first node on the phyllotaxis spiral used for unplaced nodes
pub const INITIAL_RADIUS: f32 = 10.0;

/// Golden angle used to place unplaced nodes, `PI * (3 - sqrt(5))`
pub const INITIAL_ANGLE: f32 = std::f32::consts::PI * (3.0 - 2.236_068);

/// A simulated node.
///
/// A non-finite `x`/`y` means "not placed yet"; [`initialize_nodes`] puts such
/// nodes on a spiral around the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Position in the canonical array (reassigned whenever the array is replaced)
    pub index: usize,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// Fixed x coordinate; suppresses velocity integration on x when set
    pub fx: Option<f32>,
    /// Fixed y coordinate; suppresses velocity integration on y when set
    pub fy: Option<f32>,
    /// Per-node many-body strength (falls back to the many-body force's strength)
    pub strength: Option<f32>,
    /// Per-node collision radius (falls back to the collide force's radius)
    pub radius: Option<f32>,
}

impl Node {
    /// Create an unplaced node
    pub fn new() -> Self {
        Self {
            index: 0,
            x: f32::NAN,
            y: f32::NAN,
            vx: 0.0,
            vy: 0.0,
            fx: None,
            fy: None,
            strength: None,
            radius: None,
        }
    }

    /// Create a node at the given position
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Self::new()
        }
    }

    /// Pin the node at the given position on both axes
    pub fn with_fixed(mut self, fx: f32, fy: f32) -> Self {
        self.fx = Some(fx);
        self.fy = Some(fy);
        self
    }

    /// Set the initial velocity
    pub fn with_velocity(mut self, vx: f32, vy: f32) -> Self {
        self.vx = vx;
        self.vy = vy;
        self
    }

    /// Override the many-body strength for this node
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Override the collision radius for this node
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = Some(radius);
        self
    }

    /// Whether the node has a finite position
    pub fn is_placed(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Squared distance from this node to a point
    pub fn distance_squared(&self, x: f32, y: f32) -> f32 {
        let dx = x - self.x;
        let dy = y - self.y;
        dx * dx + dy * dy
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

/// A link between two nodes, by index into the canonical node array.
///
/// Distance and strength left as `None` are derived by the link force
/// (its default distance, and `1 / min(degree(source), degree(target))`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: usize,
    pub target: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
}

impl Link {
    /// Create a link between two node indices
    pub fn new(source: usize, target: usize) -> Self {
        Self {
            source,
            target,
            distance: None,
            strength: None,
        }
    }

    /// Set the rest length
    pub fn with_distance(mut self, distance: f32) -> Self {
        self.distance = Some(distance);
        self
    }

    /// Set the spring strength
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = Some(strength);
        self
    }
}

/// Prepare a freshly assigned node array.
///
/// Reassigns indices, snaps fixed coordinates, places unplaced nodes on a
/// phyllotaxis spiral and zeroes non-finite velocities.
pub fn initialize_nodes(nodes: &mut [Node]) {
    for (i, node) in nodes.iter_mut().enumerate() {
        node.index = i;
        if let Some(fx) = node.fx {
            node.x = fx;
        }
        if let Some(fy) = node.fy {
            node.y = fy;
        }
        if !node.is_placed() {
            let radius = INITIAL_RADIUS * (0.5 + i as f32).sqrt();
            let angle = i as f32 * INITIAL_ANGLE;
            node.x = radius * angle.cos();
            node.y = radius * angle.sin();
        }
        if !node.vx.is_finite() || !node.vy.is_finite() {
            node.vx = 0.0;
            node.vy = 0.0;
        }
    }
}

/// Find the node closest to `(x, y)`, optionally within `max_radius`.
///
/// Linear scan over current positions; ties keep the earliest node.
pub fn find(nodes: &[Node], x: f32, y: f32, max_radius: Option<f32>) -> Option<&Node> {
    let mut best = max_radius.map_or(f32::INFINITY, |r| r * r);
    let mut closest = None;
    for node in nodes {
        let d2 = node.distance_squared(x, y);
        if d2 < best {
            best = d2;
            closest = Some(node);
        }
    }
    closest
}
