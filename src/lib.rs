//! force-layout - Adaptive force-directed graph layout with CPU and GPU backends.
//!
//! A [`Simulation`] owns a node array and a set of named forces and cools
//! them toward a stable layout. Small graphs step on the CPU; large ones run
//! as wgpu compute kernels. The controller picks a backend from the graph
//! size, watches throughput while running, and moves between backends
//! without losing node state.
//!
//! Nothing steps in the background. [`Simulation::run`] is the stepping loop:
//! it re-arms itself with [`Simulation::restart`] and returns once the layout
//! cools or [`Simulation::stop`] (or a [`StopHandle`]) halts it. To resume a
//! stopped simulation, call `run` again; [`Simulation::tick`] steps manually.
//!
//! ```rust,ignore
//! use force_layout::forces::{Center, LinkForce, ManyBody};
//! use force_layout::{Link, Node, Simulation};
//!
//! let nodes = (0..100).map(|_| Node::new()).collect();
//! let links = (1..100).map(|i| Link::new(i - 1, i)).collect();
//!
//! let mut sim = Simulation::new(nodes);
//! sim.set_force("charge", Some(Box::new(ManyBody::new())))?;
//! sim.set_force("link", Some(Box::new(LinkForce::new(links))))?;
//! sim.set_force("center", Some(Box::new(Center::new(0.0, 0.0))))?;
//! sim.run().await?;
//! ```

pub mod adaptive;
pub mod backend;
pub mod config;
pub mod cpu;
pub mod error;
pub mod events;
pub mod forces;
pub mod gpu;
pub mod graph;
pub mod jiggle;
pub mod model;
pub mod monitor;
pub mod random;
pub mod simulation;

pub use backend::BackendKind;
pub use config::SimulationConfig;
pub use error::{Result, SimulationError};
pub use model::{Link, Node};
pub use simulation::{Simulation, SimulationState, StopHandle};
