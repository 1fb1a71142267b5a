//! Force collaborators
//!
//! Every force implements [`Force`]. Forces that can also run on the GPU
//! describe themselves through [`Force::configuration`], which returns a
//! tagged [`ForceConfig`]; the GPU backend reads only those records and never
//! inspects the force object itself.
//!
//! | kind | CPU type | parameters |
//! |---|---|---|
//! | `many_body` | [`ManyBody`] | strength, theta, distance_min, distance_max |
//! | `link` | [`LinkForce`] | distance, strength, iterations |
//! | `collide` | [`Collide`] | radius, strength, iterations |
//! | `center` | [`Center`] | x, y, strength |
//! | `x` / `y` | [`ForceX`] / [`ForceY`] | target, strength |
//! | `radial` | [`Radial`] | x, y, radius, strength |

mod center;
mod collide;
mod link;
mod many_body;
mod position;
mod radial;
mod registry;

pub use center::Center;
pub use collide::Collide;
pub use link::{LinkForce, ResolvedLink, resolve_links};
pub use many_body::{ManyBody, distance_max_squared};
pub use position::{ForceX, ForceY};
pub use radial::Radial;
pub use registry::{ForcePlan, ForceRegistry};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::model::{Link, Node};
use crate::random::Lcg;

// =============================================================================
// Default Constants
// =============================================================================

/// Default many-body strength (negative = repulsion, matches d3-force)
pub const DEFAULT_CHARGE: f32 = -30.0;

/// Default Barnes-Hut theta
pub const DEFAULT_THETA: f32 = 0.9;

/// Default minimum distance for many-body calculations (avoids singularity)
pub const DEFAULT_DISTANCE_MIN: f32 = 1.0;

/// Default link rest length
pub const DEFAULT_LINK_DISTANCE: f32 = 30.0;

/// Default collision radius
pub const DEFAULT_COLLIDE_RADIUS: f32 = 5.0;

/// Default strength of the x, y and radial positioning forces
pub const DEFAULT_POSITION_STRENGTH: f32 = 0.1;

/// Default radial target radius
pub const DEFAULT_RADIAL_RADIUS: f32 = 100.0;

/// A force acting on the simulated nodes
pub trait Force: Send + Sync {
    /// Bind the force to a node array.
    ///
    /// Called when the force is registered and whenever the node array is
    /// replaced. Errors here reject the registration.
    fn initialize(&mut self, _nodes: &[Node], _random: &mut Lcg) -> Result<()> {
        Ok(())
    }

    /// Apply one step of this force at the given cooling energy
    fn apply(&mut self, nodes: &mut [Node], alpha: f32);

    /// Parameters the GPU backend needs to run this force, if it can
    fn configuration(&self) -> Option<ForceConfig> {
        None
    }
}

/// Tagged configuration record for one force kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForceConfig {
    ManyBody(ManyBodyConfig),
    Link(LinkConfig),
    Collide(CollideConfig),
    Center(CenterConfig),
    X(PositionConfig),
    Y(PositionConfig),
    Radial(RadialConfig),
}

impl ForceConfig {
    /// The serialized kind tag
    pub fn kind(&self) -> &'static str {
        match self {
            ForceConfig::ManyBody(_) => "many_body",
            ForceConfig::Link(_) => "link",
            ForceConfig::Collide(_) => "collide",
            ForceConfig::Center(_) => "center",
            ForceConfig::X(_) => "x",
            ForceConfig::Y(_) => "y",
            ForceConfig::Radial(_) => "radial",
        }
    }

    /// Reject non-finite parameters and empty iteration counts
    pub fn validate(&self, name: &str) -> Result<()> {
        let finite = |field: &str, value: f32| {
            if value.is_finite() {
                Ok(())
            } else {
                Err(SimulationError::invalid_force(
                    name,
                    format!("{field} must be finite, got {value}"),
                ))
            }
        };
        let iterations = |value: u32| {
            if value >= 1 {
                Ok(())
            } else {
                Err(SimulationError::invalid_force(
                    name,
                    "iterations must be at least 1",
                ))
            }
        };

        match self {
            ForceConfig::ManyBody(c) => {
                finite("strength", c.strength)?;
                finite("theta", c.theta)?;
                finite("distance_min", c.distance_min)?;
                if c.theta < 0.0 || c.distance_min < 0.0 {
                    return Err(SimulationError::invalid_force(
                        name,
                        "theta and distance_min must not be negative",
                    ));
                }
                if c.distance_max.is_some_and(|d| d.is_nan() || d < 0.0) {
                    return Err(SimulationError::invalid_force(
                        name,
                        "distance_max must not be negative",
                    ));
                }
                Ok(())
            }
            ForceConfig::Link(c) => {
                finite("distance", c.distance)?;
                if let Some(strength) = c.strength {
                    finite("strength", strength)?;
                }
                iterations(c.iterations)
            }
            ForceConfig::Collide(c) => {
                finite("radius", c.radius)?;
                finite("strength", c.strength)?;
                if c.radius < 0.0 {
                    return Err(SimulationError::invalid_force(
                        name,
                        "radius must not be negative",
                    ));
                }
                iterations(c.iterations)
            }
            ForceConfig::Center(c) => {
                finite("x", c.x)?;
                finite("y", c.y)?;
                finite("strength", c.strength)
            }
            ForceConfig::X(c) | ForceConfig::Y(c) => {
                finite("target", c.target)?;
                finite("strength", c.strength)
            }
            ForceConfig::Radial(c) => {
                finite("x", c.x)?;
                finite("y", c.y)?;
                finite("radius", c.radius)?;
                finite("strength", c.strength)
            }
        }
    }

    /// Build the CPU force for this configuration.
    ///
    /// `links` is only read by the link force.
    pub fn into_force(self, links: &[Link]) -> Box<dyn Force> {
        match self {
            ForceConfig::ManyBody(c) => Box::new(ManyBody::from_config(c)),
            ForceConfig::Link(c) => Box::new(LinkForce::from_config(links.to_vec(), c)),
            ForceConfig::Collide(c) => Box::new(Collide::from_config(c)),
            ForceConfig::Center(c) => Box::new(Center::from_config(c)),
            ForceConfig::X(c) => Box::new(ForceX::from_config(c)),
            ForceConfig::Y(c) => Box::new(ForceY::from_config(c)),
            ForceConfig::Radial(c) => Box::new(Radial::from_config(c)),
        }
    }
}

/// Many-body (charge) parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManyBodyConfig {
    pub strength: f32,
    pub theta: f32,
    pub distance_min: f32,
    /// `None` means unbounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_max: Option<f32>,
}

impl Default for ManyBodyConfig {
    fn default() -> Self {
        Self {
            strength: DEFAULT_CHARGE,
            theta: DEFAULT_THETA,
            distance_min: DEFAULT_DISTANCE_MIN,
            distance_max: None,
        }
    }
}

/// Link (spring) parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Rest length for links that do not set their own
    pub distance: f32,
    /// Spring strength for links that do not set their own; degree-derived when `None`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    pub iterations: u32,
    /// Links resolved against the current node array
    #[serde(skip)]
    pub links: Vec<ResolvedLink>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            distance: DEFAULT_LINK_DISTANCE,
            strength: None,
            iterations: 1,
            links: Vec::new(),
        }
    }
}

/// Collision parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollideConfig {
    pub radius: f32,
    pub strength: f32,
    pub iterations: u32,
}

impl Default for CollideConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_COLLIDE_RADIUS,
            strength: 1.0,
            iterations: 1,
        }
    }
}

/// Centering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenterConfig {
    pub x: f32,
    pub y: f32,
    pub strength: f32,
}

impl Default for CenterConfig {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            strength: 1.0,
        }
    }
}

/// Single-axis positioning parameters (shared by the x and y forces)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub target: f32,
    pub strength: f32,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            target: 0.0,
            strength: DEFAULT_POSITION_STRENGTH,
        }
    }
}

/// Radial positioning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadialConfig {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub strength: f32,
}

impl Default for RadialConfig {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            radius: DEFAULT_RADIAL_RADIUS,
            strength: DEFAULT_POSITION_STRENGTH,
        }
    }
}
