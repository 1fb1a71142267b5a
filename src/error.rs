//! Error types for simulation, backend, and configuration operations

use thiserror::Error;

/// Errors that can occur while building or stepping a simulation
#[derive(Error, Debug)]
pub enum SimulationError {
    /// No GPU adapter/device could be acquired, or the graph cannot run on the GPU
    #[error("parallel backend unavailable: {0}")]
    CapabilityUnavailable(String),

    /// A compute shader or pipeline failed validation
    #[error("kernel compilation failed: {0}")]
    KernelCompilation(String),

    /// The device was lost mid-run; the backend must be rebuilt
    #[error("device lost: {0}")]
    DeviceLost(String),

    /// A readback buffer was mapped while a previous mapping was still live
    #[error("readback buffer is already mapped")]
    BufferReentrancy,

    /// A force was registered with an unusable configuration
    #[error("invalid force '{name}': {reason}")]
    InvalidForce { name: String, reason: String },

    /// A link refers to nodes that do not exist
    #[error("invalid link {index}: {reason}")]
    InvalidLink { index: usize, reason: String },

    /// A configuration file could not be parsed
    #[error("config error: {0}")]
    Config(String),

    /// An event listener was registered for a type other than tick, end or mode
    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimulationError {
    /// Whether the controller should recover by staying on (or moving to) the CPU backend
    pub fn is_recoverable_by_fallback(&self) -> bool {
        matches!(
            self,
            SimulationError::CapabilityUnavailable(_)
                | SimulationError::KernelCompilation(_)
                | SimulationError::DeviceLost(_)
        )
    }

    pub(crate) fn invalid_force(name: &str, reason: impl Into<String>) -> Self {
        SimulationError::InvalidForce {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for simulation operations
pub type Result<T> = std::result::Result<T, SimulationError>;
