//! Backend selection heuristics
//!
//! Small graphs run faster on the CPU because the per-step upload, dispatch
//! and readback cost dominates; large or densely linked graphs amortize it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;

/// Below this node count the CPU is always recommended
pub const SMALL_GRAPH_NODES: usize = 200;

/// Above this node count the GPU is always recommended
pub const LARGE_GRAPH_NODES: usize = 2000;

/// Tunable limits for initial selection and runtime switching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceThresholds {
    /// Minimum node count before the GPU is considered
    pub min_gpu_nodes: usize,
    /// Rolling throughput (steps/s) below which the CPU counts as too slow
    pub min_cpu_fps: f64,
    /// Link count from which a mid-sized graph goes to the GPU
    pub min_gpu_links: usize,
    /// `nodes × links` above which the GPU is chosen
    pub complexity_threshold: u64,
    /// Consecutive slow windows required before switching
    pub min_windows: u32,
    /// Windows kept for the rolling throughput average
    pub window_count: usize,
    /// Length of one monitor window in milliseconds
    pub window_interval_ms: u64,
    /// Step durations kept for the rolling frame-time average
    pub frame_history: usize,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            min_gpu_nodes: 750,
            min_cpu_fps: 30.0,
            min_gpu_links: 1000,
            complexity_threshold: 500_000,
            min_windows: 3,
            window_count: 5,
            window_interval_ms: 1000,
            frame_history: 300,
        }
    }
}

impl PerformanceThresholds {
    pub fn window_interval(&self) -> Duration {
        Duration::from_millis(self.window_interval_ms.max(1))
    }
}

/// Caller preference for which backend to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModePreference {
    /// Pick from graph size and switch on poor throughput
    #[default]
    Auto,
    Cpu,
    Gpu,
}

impl std::fmt::Display for ModePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModePreference::Auto => write!(f, "auto"),
            ModePreference::Cpu => write!(f, "cpu"),
            ModePreference::Gpu => write!(f, "gpu"),
        }
    }
}

impl From<BackendKind> for ModePreference {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Cpu => ModePreference::Cpu,
            BackendKind::Gpu => ModePreference::Gpu,
        }
    }
}

/// Default link estimate when the caller gives none
pub fn estimated_links(node_count: usize) -> usize {
    node_count.saturating_mul(2)
}

pub fn complexity(node_count: usize, link_count: usize) -> u64 {
    (node_count as u64).saturating_mul(link_count as u64)
}

/// Whether a graph of this size should start on the GPU
pub fn should_use_gpu(
    node_count: usize,
    link_count: usize,
    gpu_available: bool,
    thresholds: &PerformanceThresholds,
) -> bool {
    if !gpu_available || node_count < thresholds.min_gpu_nodes {
        return false;
    }
    complexity(node_count, link_count) > thresholds.complexity_threshold
        || link_count >= thresholds.min_gpu_links
}

/// Resolve a preference into the backend to build first
pub fn initial_mode(
    preference: ModePreference,
    node_count: usize,
    link_count: usize,
    gpu_available: bool,
    thresholds: &PerformanceThresholds,
) -> BackendKind {
    match preference {
        ModePreference::Cpu => BackendKind::Cpu,
        ModePreference::Gpu if gpu_available => BackendKind::Gpu,
        ModePreference::Gpu => BackendKind::Cpu,
        ModePreference::Auto => {
            if should_use_gpu(node_count, link_count, gpu_available, thresholds) {
                BackendKind::Gpu
            } else {
                BackendKind::Cpu
            }
        }
    }
}

/// A suggested mode with a human-readable reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub mode: ModePreference,
    pub reason: String,
}

/// Suggest a mode for a graph without building a simulation
pub fn recommend_mode(
    node_count: usize,
    link_count: usize,
    gpu_available: bool,
    thresholds: &PerformanceThresholds,
) -> Recommendation {
    let complexity = complexity(node_count, link_count);
    let (mode, reason) = if !gpu_available {
        (ModePreference::Cpu, "no GPU adapter available".to_string())
    } else if node_count < SMALL_GRAPH_NODES {
        (
            ModePreference::Cpu,
            format!("{node_count} nodes is too small to benefit from the GPU"),
        )
    } else if node_count < thresholds.min_gpu_nodes {
        (
            ModePreference::Cpu,
            format!(
                "{node_count} nodes is below the GPU threshold of {}",
                thresholds.min_gpu_nodes
            ),
        )
    } else if node_count > LARGE_GRAPH_NODES {
        (
            ModePreference::Gpu,
            format!("{node_count} nodes is a large graph"),
        )
    } else if complexity > thresholds.complexity_threshold {
        (
            ModePreference::Gpu,
            format!(
                "complexity {complexity} exceeds {}",
                thresholds.complexity_threshold
            ),
        )
    } else {
        (
            ModePreference::Auto,
            "mid-sized graph; let the monitor decide".to_string(),
        )
    };
    Recommendation { mode, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_graphs_stay_on_cpu() {
        let t = PerformanceThresholds::default();
        assert!(!should_use_gpu(100, 10_000, true, &t));
        assert!(!should_use_gpu(749, 5_000, true, &t));
    }

    #[test]
    fn large_graphs_use_gpu_when_available() {
        let t = PerformanceThresholds::default();
        assert!(should_use_gpu(1000, 1000, true, &t));
        assert!(should_use_gpu(800, 900, true, &t)); // complexity 720 000
        assert!(!should_use_gpu(5000, 10_000, false, &t));
    }

    #[test]
    fn mid_graph_with_few_links_stays_on_cpu() {
        let t = PerformanceThresholds::default();
        assert!(!should_use_gpu(760, 100, true, &t));
    }

    #[test]
    fn explicit_preferences() {
        let t = PerformanceThresholds::default();
        assert_eq!(initial_mode(ModePreference::Gpu, 10, 0, true, &t), BackendKind::Gpu);
        assert_eq!(initial_mode(ModePreference::Gpu, 10, 0, false, &t), BackendKind::Cpu);
        assert_eq!(initial_mode(ModePreference::Cpu, 10_000, 20_000, true, &t), BackendKind::Cpu);
        assert_eq!(initial_mode(ModePreference::Auto, 10, 20, true, &t), BackendKind::Cpu);
    }

    #[test]
    fn recommendations() {
        let t = PerformanceThresholds::default();
        assert_eq!(recommend_mode(5000, 0, false, &t).mode, ModePreference::Cpu);
        assert_eq!(recommend_mode(150, 300, true, &t).mode, ModePreference::Cpu);
        assert_eq!(recommend_mode(500, 1000, true, &t).mode, ModePreference::Cpu);
        assert_eq!(recommend_mode(2500, 10, true, &t).mode, ModePreference::Gpu);
        assert_eq!(recommend_mode(1000, 600, true, &t).mode, ModePreference::Gpu);
        assert_eq!(recommend_mode(1000, 100, true, &t).mode, ModePreference::Auto);
    }

    #[test]
    fn thresholds_deserialize_with_defaults() {
        let t: PerformanceThresholds = serde_yaml::from_str("min_cpu_fps: 45\n").unwrap();
        assert_eq!(t.min_cpu_fps, 45.0);
        assert_eq!(t.min_gpu_nodes, 750);
        assert_eq!(t.window_interval(), Duration::from_secs(1));
    }
}
