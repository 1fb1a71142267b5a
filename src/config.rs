//! Simulation configuration files
//!
//! A configuration holds the cooling schedule, adaptive options and an
//! optional set of named forces. Files are YAML (`.yaml`, `.yml`) or JSON
//! (`.json`); the format follows the extension.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adaptive::{ModePreference, PerformanceThresholds};
use crate::error::{Result, SimulationError};
use crate::forces::{CenterConfig, ForceConfig, LinkConfig, ManyBodyConfig};

/// Default cooling rate: reaches `alpha_min` from 1 in 300 steps
pub fn default_alpha_decay() -> f64 {
    1.0 - 0.001_f64.powf(1.0 / 300.0)
}

/// Backend selection and switching options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveOptions {
    pub mode: ModePreference,
    /// Allow automatic CPU to GPU switches on poor throughput
    pub enable_switching: bool,
    /// Link count used for initial selection; defaults to twice the node count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_link_count: Option<usize>,
    pub thresholds: PerformanceThresholds,
    /// Pacing of the CPU stepping loop in milliseconds; 0 steps as fast as possible
    pub frame_interval_ms: u64,
}

impl Default for AdaptiveOptions {
    fn default() -> Self {
        Self {
            mode: ModePreference::Auto,
            enable_switching: true,
            estimated_link_count: None,
            thresholds: PerformanceThresholds::default(),
            frame_interval_ms: 16,
        }
    }
}

impl AdaptiveOptions {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Everything needed to build a [`crate::Simulation`] apart from the graph itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub alpha: f64,
    pub alpha_min: f64,
    pub alpha_decay: f64,
    pub alpha_target: f64,
    pub velocity_decay: f32,
    pub adaptive: AdaptiveOptions,
    /// Named forces, registered in name order
    pub forces: BTreeMap<String, ForceConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            alpha_min: 0.001,
            alpha_decay: default_alpha_decay(),
            alpha_target: 0.0,
            velocity_decay: 0.6,
            adaptive: AdaptiveOptions::default(),
            forces: BTreeMap::new(),
        }
    }
}

impl SimulationConfig {
    /// Load a configuration, picking the parser from the file extension
    pub fn load(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| {
                SimulationError::Config(format!(
                    "could not determine config format from path: {}",
                    path.display()
                ))
            })?;
        let content = std::fs::read_to_string(path)?;
        let config = match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content)?,
            "json" => Self::from_json(&content)?,
            other => {
                return Err(SimulationError::Config(format!(
                    "unsupported config format: {other}"
                )));
            }
        };
        tracing::debug!(path = %path.display(), forces = config.forces.len(), "loaded config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| SimulationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| SimulationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cooling parameters and every force configuration
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, value: f64| {
            if value.is_finite() && (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(SimulationError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )))
            }
        };
        unit("alpha", self.alpha)?;
        unit("alpha_min", self.alpha_min)?;
        unit("alpha_decay", self.alpha_decay)?;
        unit("alpha_target", self.alpha_target)?;
        unit("velocity_decay", f64::from(self.velocity_decay))?;
        for (name, force) in &self.forces {
            force.validate(name)?;
        }
        Ok(())
    }

    /// The configured forces, or the standard charge/link/center set when none are given
    pub fn forces_or_default(&self) -> BTreeMap<String, ForceConfig> {
        if !self.forces.is_empty() {
            return self.forces.clone();
        }
        BTreeMap::from([
            (
                "center".to_string(),
                ForceConfig::Center(CenterConfig::default()),
            ),
            (
                "charge".to_string(),
                ForceConfig::ManyBody(ManyBodyConfig::default()),
            ),
            ("link".to_string(), ForceConfig::Link(LinkConfig::default())),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_follow_the_cooling_model() {
        let config = SimulationConfig::default();
        assert_eq!(config.alpha, 1.0);
        assert_eq!(config.alpha_min, 0.001);
        assert!((config.alpha_decay - 0.0228).abs() < 1e-4);
        assert_eq!(config.velocity_decay, 0.6);
        assert_eq!(config.adaptive.frame_interval(), Duration::from_millis(16));
        assert!(config.adaptive.enable_switching);
    }

    #[test]
    fn yaml_with_forces() {
        let yaml = r#"
alpha_decay: 0.05
adaptive:
  mode: gpu
  enable_switching: false
forces:
  charge:
    kind: many_body
    strength: -50
  collide:
    kind: collide
    radius: 8
"#;
        let config = SimulationConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.alpha_decay, 0.05);
        assert_eq!(config.adaptive.mode, ModePreference::Gpu);
        assert!(!config.adaptive.enable_switching);
        assert_eq!(config.forces.len(), 2);
        match &config.forces["collide"] {
            ForceConfig::Collide(c) => {
                assert_eq!(c.radius, 8.0);
                assert_eq!(c.iterations, 1);
            }
            other => panic!("expected collide, got {other:?}"),
        }
    }

    #[test]
    fn json_is_accepted() {
        let config =
            SimulationConfig::from_json(r#"{"velocity_decay": 0.4, "adaptive": {"mode": "cpu"}}"#)
                .unwrap();
        assert_eq!(config.velocity_decay, 0.4);
        assert_eq!(config.adaptive.mode, ModePreference::Cpu);
    }

    #[test]
    fn out_of_range_cooling_is_rejected() {
        let err = SimulationConfig::from_yaml("alpha_decay: 1.5\n").unwrap_err();
        assert!(matches!(err, SimulationError::Config(_)));
    }

    #[test]
    fn invalid_force_is_rejected() {
        let yaml = "forces:\n  link:\n    kind: link\n    iterations: 0\n";
        let err = SimulationConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidForce { .. }));
    }

    #[test]
    fn load_picks_format_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "alpha_min: 0.01").unwrap();
        let config = SimulationConfig::load(file.path()).unwrap();
        assert_eq!(config.alpha_min, 0.01);

        let toml = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        assert!(matches!(
            SimulationConfig::load(toml.path()),
            Err(SimulationError::Config(_))
        ));
    }

    #[test]
    fn default_force_set() {
        let forces = SimulationConfig::default().forces_or_default();
        let names: Vec<&str> = forces.keys().map(String::as_str).collect();
        assert_eq!(names, ["center", "charge", "link"]);
    }
}
