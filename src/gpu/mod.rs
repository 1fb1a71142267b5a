//! GPU backend for the force simulation
//!
//! Runs the built-in forces as WGSL compute kernels through wgpu. Node state
//! lives on the host between steps; each step uploads it, dispatches one
//! compute pass per enabled force and reads positions and velocities back.
//!
//! # Kernels
//!
//! - **Many-body**: exact pairwise repulsion, tiled through workgroup memory
//! - **Link**: spring per link, accumulated per node from a snapshot
//! - **Collide**: pairwise overlap resolution on predicted positions
//! - **X / Y / Radial**: per-node pull toward a line or circle
//! - **Center**: one-workgroup mean reduction, then a uniform shift
//! - **Integrate**: velocity decay, position update and fixed-node snapping
//!
//! Every kernel reuses the same jitter and formulas as the CPU forces, so the
//! two backends agree to within single-precision tolerance.

mod backend;
mod buffers;
mod context;
mod shaders;
mod types;

pub use backend::GpuBackend;
pub use context::GpuContext;
pub use shaders::{ForceShaders, WORKGROUP_SIZE};
pub use types::{LinkRecord, NOT_FIXED, NodeRecord, SimulationParams};
