//! The contract both execution backends implement

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::forces::ForceRegistry;
use crate::model::Node;

/// Which backend is driving the node array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Cpu,
    Gpu,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Cpu => write!(f, "cpu"),
            BackendKind::Gpu => write!(f, "gpu"),
        }
    }
}

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Forces, integration and (GPU) readback all completed
    Completed,
    /// The step ran but its readback was skipped; the node array is one step stale
    ReadbackSkipped,
    /// A stop was requested before the step was submitted; nothing changed
    Cancelled,
}

impl StepOutcome {
    /// Whether the step counts toward the cooling schedule
    pub fn advanced(self) -> bool {
        !matches!(self, StepOutcome::Cancelled)
    }
}

/// Everything a backend needs for one step
pub struct StepContext<'a> {
    /// The canonical node array owned by the controller
    pub nodes: &'a mut Vec<Node>,
    pub forces: &'a mut ForceRegistry,
    /// Cooling energy for this step
    pub alpha: f32,
    /// Multiplicative velocity damping applied during integration
    pub velocity_decay: f32,
    /// Stepping-loop flag; the step is cancelled if it reads false before submission
    pub running: Option<&'a AtomicBool>,
}

impl StepContext<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.running
            .is_some_and(|running| !running.load(Ordering::Acquire))
    }
}

/// A substrate that can advance the simulation by one step
pub trait Backend {
    fn kind(&self) -> BackendKind;

    /// Rebuild derived state after the node array or a force changed
    fn configure(&mut self, nodes: &[Node], forces: &ForceRegistry) -> Result<()>;

    /// Apply all forces and integrate once
    fn step(&mut self, ctx: StepContext<'_>) -> impl Future<Output = Result<StepOutcome>>;

    /// Apply all forces without integrating; only velocities reach the node array
    fn accumulate(&mut self, ctx: StepContext<'_>) -> impl Future<Output = Result<StepOutcome>>;
}
