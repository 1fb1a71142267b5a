//! The adaptive simulation controller
//!
//! Owns the canonical node array, the force registry and the cooling
//! schedule, and drives exactly one backend at a time. The backend is chosen
//! lazily on first use from the graph size; while running on the CPU a
//! performance monitor can trigger a move to the GPU. Every switch keeps the
//! node array and force registry as they are and only swaps the substrate
//! that steps them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::{Interval, MissedTickBehavior};

use crate::adaptive::{ModePreference, estimated_links, initial_mode};
use crate::backend::{Backend, BackendKind, StepContext, StepOutcome};
use crate::config::{AdaptiveOptions, SimulationConfig};
use crate::cpu::CpuBackend;
use crate::error::{Result, SimulationError};
use crate::events::{Dispatch, Listener, SimulationEvent};
use crate::forces::{Force, ForceRegistry};
use crate::gpu::{GpuBackend, GpuContext};
use crate::model::{self, Link, Node};
use crate::monitor::{PerformanceMonitor, PerformanceStats};
use crate::random::Lcg;

/// Externally visible controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationState {
    /// No backend selected yet
    Idle,
    /// Selecting and building the first backend
    Initializing,
    Cpu,
    Gpu,
    /// The stepping loop was stopped or the simulation cooled down
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Initializing,
    Active,
}

/// GPU device context, acquired on first use
enum GpuSlot {
    Untried,
    Ready(GpuContext),
    Unavailable(String),
}

enum ActiveBackend {
    Cpu(CpuBackend),
    Gpu(GpuBackend),
}

impl ActiveBackend {
    fn kind(&self) -> BackendKind {
        match self {
            ActiveBackend::Cpu(b) => b.kind(),
            ActiveBackend::Gpu(b) => b.kind(),
        }
    }

    fn configure(&mut self, nodes: &[Node], forces: &ForceRegistry) -> Result<()> {
        match self {
            ActiveBackend::Cpu(b) => b.configure(nodes, forces),
            ActiveBackend::Gpu(b) => b.configure(nodes, forces),
        }
    }

    async fn step(&mut self, ctx: StepContext<'_>) -> Result<StepOutcome> {
        match self {
            ActiveBackend::Cpu(b) => b.step(ctx).await,
            ActiveBackend::Gpu(b) => b.step(ctx).await,
        }
    }

    async fn accumulate(&mut self, ctx: StepContext<'_>) -> Result<StepOutcome> {
        match self {
            ActiveBackend::Cpu(b) => b.accumulate(ctx).await,
            ActiveBackend::Gpu(b) => b.accumulate(ctx).await,
        }
    }
}

/// Stops a running [`Simulation::run`] loop from another task
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Halt the loop; a step staged but not yet submitted is dropped
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// A force-directed layout simulation with CPU and GPU backends
pub struct Simulation {
    nodes: Vec<Node>,
    forces: ForceRegistry,
    random: Lcg,
    alpha: f64,
    alpha_min: f64,
    alpha_decay: f64,
    alpha_target: f64,
    velocity_decay: f32,
    options: AdaptiveOptions,
    phase: Phase,
    backend: ActiveBackend,
    gpu: GpuSlot,
    monitor: PerformanceMonitor,
    events: Dispatch,
    running: Arc<AtomicBool>,
    stopped: bool,
    ended: bool,
    auto_switch_failed: bool,
}

impl Simulation {
    /// A simulation with default cooling and adaptive options and no forces
    pub fn new(nodes: Vec<Node>) -> Self {
        Self::with_options(nodes, AdaptiveOptions::default())
    }

    pub fn with_options(mut nodes: Vec<Node>, options: AdaptiveOptions) -> Self {
        model::initialize_nodes(&mut nodes);
        let defaults = SimulationConfig::default();
        Self {
            nodes,
            forces: ForceRegistry::new(),
            random: Lcg::default(),
            alpha: defaults.alpha,
            alpha_min: defaults.alpha_min,
            alpha_decay: defaults.alpha_decay,
            alpha_target: defaults.alpha_target,
            velocity_decay: defaults.velocity_decay,
            monitor: PerformanceMonitor::new(&options.thresholds),
            options,
            phase: Phase::Idle,
            backend: ActiveBackend::Cpu(CpuBackend::new()),
            gpu: GpuSlot::Untried,
            events: Dispatch::new(),
            running: Arc::new(AtomicBool::new(false)),
            stopped: false,
            ended: false,
            auto_switch_failed: false,
        }
    }

    /// Build a simulation from a configuration, registering its forces in name order
    pub fn from_config(nodes: Vec<Node>, links: &[Link], config: &SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut simulation = Self::with_options(nodes, config.adaptive.clone());
        simulation.alpha = config.alpha;
        simulation.alpha_min = config.alpha_min;
        simulation.alpha_decay = config.alpha_decay;
        simulation.alpha_target = config.alpha_target;
        simulation.velocity_decay = config.velocity_decay;
        for (name, force) in &config.forces {
            simulation.set_force(name, Some(force.clone().into_force(links)))?;
        }
        Ok(simulation)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Replace the node array.
    ///
    /// Indices are reassigned, unplaced nodes are laid out and every force is
    /// re-initialized. If a force rejects the new array the old one is kept.
    pub fn set_nodes(&mut self, mut nodes: Vec<Node>) -> Result<()> {
        model::initialize_nodes(&mut nodes);
        let previous = std::mem::replace(&mut self.nodes, nodes);
        if let Err(err) = self.forces.initialize_all(&self.nodes, &mut self.random) {
            self.nodes = previous;
            if let Err(restore) = self.forces.initialize_all(&self.nodes, &mut self.random) {
                tracing::error!(%restore, "could not restore forces after rejected node array");
            }
            return Err(err);
        }
        self.reconfigure_backend();
        Ok(())
    }

    pub fn force(&self, name: &str) -> Option<&dyn Force> {
        self.forces.get(name)
    }

    /// Register, replace or (with `None`) remove a named force.
    ///
    /// The force's parameters are validated and it is initialized against the
    /// current nodes before it is registered; an error leaves the registry
    /// unchanged. Returns the force that was replaced or removed.
    pub fn set_force(
        &mut self,
        name: &str,
        force: Option<Box<dyn Force>>,
    ) -> Result<Option<Box<dyn Force>>> {
        let previous = match force {
            Some(mut force) => {
                if let Some(config) = force.configuration() {
                    config.validate(name)?;
                }
                force.initialize(&self.nodes, &mut self.random)?;
                self.forces.insert(name, force)
            }
            None => self.forces.remove(name),
        };
        self.reconfigure_backend();
        Ok(previous)
    }

    /// Replace the random source and re-initialize every force with it
    pub fn random_source(&mut self, random: Lcg) -> Result<()> {
        self.random = random;
        self.forces.initialize_all(&self.nodes, &mut self.random)
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Set the cooling energy; setting it at or above `alpha_min` re-arms `end`
    pub fn set_alpha(&mut self, alpha: f64) -> &mut Self {
        self.alpha = alpha;
        if alpha >= self.alpha_min {
            self.ended = false;
        }
        self
    }

    pub fn alpha_min(&self) -> f64 {
        self.alpha_min
    }

    pub fn set_alpha_min(&mut self, alpha_min: f64) -> &mut Self {
        self.alpha_min = alpha_min;
        self
    }

    pub fn alpha_decay(&self) -> f64 {
        self.alpha_decay
    }

    pub fn set_alpha_decay(&mut self, alpha_decay: f64) -> &mut Self {
        self.alpha_decay = alpha_decay;
        self
    }

    pub fn alpha_target(&self) -> f64 {
        self.alpha_target
    }

    pub fn set_alpha_target(&mut self, alpha_target: f64) -> &mut Self {
        self.alpha_target = alpha_target;
        self
    }

    pub fn velocity_decay(&self) -> f32 {
        self.velocity_decay
    }

    /// Set the multiplicative damping applied to velocities each step
    pub fn set_velocity_decay(&mut self, velocity_decay: f32) -> &mut Self {
        self.velocity_decay = velocity_decay;
        self
    }

    /// Closest node to `(x, y)`, optionally limited to `max_radius`
    pub fn find(&self, x: f32, y: f32, max_radius: Option<f32>) -> Option<&Node> {
        model::find(&self.nodes, x, y, max_radius)
    }

    /// Register, replace or remove a listener for `tick`, `end` or `mode` (optionally `type.name`)
    pub fn on(&mut self, typename: &str, listener: Option<Listener>) -> Result<&mut Self> {
        self.events.on(typename, listener)?;
        Ok(self)
    }

    /// The backend currently stepping the simulation
    pub fn mode(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn state(&self) -> SimulationState {
        match self.phase {
            Phase::Idle => SimulationState::Idle,
            Phase::Initializing => SimulationState::Initializing,
            Phase::Active if self.stopped => SimulationState::Stopped,
            Phase::Active => match self.mode() {
                BackendKind::Cpu => SimulationState::Cpu,
                BackendKind::Gpu => SimulationState::Gpu,
            },
        }
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        self.monitor.stats(self.mode())
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Halt the stepping loop
    pub fn stop(&mut self) -> &mut Self {
        self.running.store(false, Ordering::Release);
        self.stopped = true;
        self
    }

    /// Re-arm the stepping flag without stepping.
    ///
    /// There is no self-resuming timer: stepping only happens inside
    /// [`Simulation::run`], which calls this itself and then drives the loop in
    /// whichever mode is active. Call `restart` and then `run` to resume after
    /// [`Simulation::stop`].
    pub fn restart(&mut self) -> &mut Self {
        self.running.store(true, Ordering::Release);
        self.stopped = false;
        self
    }

    /// Select and build the first backend, including GPU warm-up.
    ///
    /// Called implicitly by every stepping method; returns the mode in effect.
    pub async fn initialize(&mut self) -> Result<BackendKind> {
        if self.phase == Phase::Active {
            return Ok(self.mode());
        }
        self.phase = Phase::Initializing;

        let node_count = self.nodes.len();
        let link_count = self
            .options
            .estimated_link_count
            .or_else(|| self.forces.link_count())
            .unwrap_or_else(|| estimated_links(node_count));
        let wanted = initial_mode(
            self.options.mode,
            node_count,
            link_count,
            true,
            &self.options.thresholds,
        );

        let mut reason = match self.options.mode {
            ModePreference::Auto => format!("Started with {wanted} mode for {node_count} nodes"),
            _ => format!("Started with {wanted} mode as requested"),
        };
        if wanted == BackendKind::Gpu {
            match self.build_gpu().await {
                Ok(backend) => self.backend = ActiveBackend::Gpu(backend),
                Err(err) => {
                    tracing::warn!(%err, "GPU backend unavailable, starting on CPU");
                    reason = format!("Started with cpu mode: {err}");
                }
            }
        }

        self.phase = Phase::Active;
        self.monitor.reset();
        let mode = self.mode();
        tracing::info!(%mode, node_count, link_count, "simulation initialized");
        self.events
            .emit(&SimulationEvent::ModeChange { mode, reason });
        Ok(mode)
    }

    /// Advance the cooling schedule by `iterations` steps.
    ///
    /// Manual steps fire no events and cannot be cancelled by [`Simulation::stop`].
    pub async fn tick(&mut self, iterations: usize) -> Result<&mut Self> {
        self.initialize().await?;
        for _ in 0..iterations {
            let started = Instant::now();
            self.step_once(false).await?;
            self.monitor.record_frame(started.elapsed());
            self.maybe_switch().await?;
        }
        Ok(self)
    }

    /// Drive the stepping loop until the simulation cools below `alpha_min` or is stopped.
    ///
    /// On the CPU steps are paced by the frame interval; on the GPU each step
    /// starts as soon as the previous readback completes.
    pub async fn run(&mut self) -> Result<()> {
        self.initialize().await?;
        // Together with the loop below this replaces a self-resuming timer
        self.restart();

        let mut pacing = self.pacing();
        loop {
            match pacing.as_mut() {
                Some(interval) => {
                    interval.tick().await;
                }
                None => tokio::task::yield_now().await,
            }
            if !self.running.load(Ordering::Acquire) {
                tracing::debug!("stepping loop stopped");
                self.stopped = true;
                return Ok(());
            }

            let started = Instant::now();
            let outcome = self.step_once(true).await?;
            if !outcome.advanced() {
                self.stopped = true;
                return Ok(());
            }
            self.monitor.record_frame(started.elapsed());
            self.events
                .emit(&SimulationEvent::Tick { alpha: self.alpha });

            if self.alpha < self.alpha_min {
                if !self.ended {
                    self.ended = true;
                    self.events.emit(&SimulationEvent::End { alpha: self.alpha });
                }
                tracing::debug!(alpha = self.alpha, "simulation cooled down");
                self.stop();
                return Ok(());
            }

            if self.maybe_switch().await? {
                pacing = self.pacing();
            }
        }
    }

    /// Run one force pass without integrating or cooling; only velocities change
    pub async fn accumulate_forces(&mut self) -> Result<()> {
        self.initialize().await?;
        let result = self
            .backend
            .accumulate(StepContext {
                nodes: &mut self.nodes,
                forces: &mut self.forces,
                alpha: self.alpha as f32,
                velocity_decay: self.velocity_decay,
                running: None,
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if err.is_recoverable_by_fallback() && self.mode() == BackendKind::Gpu => {
                self.fall_back_to_cpu(&err);
                self.backend
                    .accumulate(StepContext {
                        nodes: &mut self.nodes,
                        forces: &mut self.forces,
                        alpha: self.alpha as f32,
                        velocity_decay: self.velocity_decay,
                        running: None,
                    })
                    .await
                    .map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    /// Switch to `mode` now, bypassing the monitor.
    ///
    /// A GPU request that cannot be honored leaves the simulation on the CPU;
    /// the returned mode is the one actually in effect.
    pub async fn force_mode(&mut self, mode: BackendKind) -> Result<BackendKind> {
        self.initialize().await?;
        let reason = format!("Manually switched to {}", mode.to_string().to_uppercase());
        self.switch_to(mode, reason).await
    }

    /// Stop, drop the GPU backend and tear down the device
    pub fn destroy(&mut self) {
        self.stop();
        self.backend = ActiveBackend::Cpu(CpuBackend::new());
        if let GpuSlot::Ready(context) = std::mem::replace(&mut self.gpu, GpuSlot::Untried) {
            context.destroy();
        }
        self.phase = Phase::Idle;
        tracing::debug!("simulation destroyed");
    }

    fn pacing(&self) -> Option<Interval> {
        let frame = self.options.frame_interval();
        if self.mode() != BackendKind::Cpu || frame == Duration::ZERO {
            return None;
        }
        let mut interval = tokio::time::interval(frame);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(interval)
    }

    /// One cooling step on the active backend; alpha only advances if the step ran
    async fn step_once(&mut self, cancellable: bool) -> Result<StepOutcome> {
        let alpha = self.alpha + (self.alpha_target - self.alpha) * self.alpha_decay;
        let running = cancellable.then_some(&*self.running);
        let result = self
            .backend
            .step(StepContext {
                nodes: &mut self.nodes,
                forces: &mut self.forces,
                alpha: alpha as f32,
                velocity_decay: self.velocity_decay,
                running,
            })
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) if err.is_recoverable_by_fallback() && self.mode() == BackendKind::Gpu => {
                // Device state never reached the node array; replay the step on the CPU
                self.fall_back_to_cpu(&err);
                let running = cancellable.then_some(&*self.running);
                self.backend
                    .step(StepContext {
                        nodes: &mut self.nodes,
                        forces: &mut self.forces,
                        alpha: alpha as f32,
                        velocity_decay: self.velocity_decay,
                        running,
                    })
                    .await?
            }
            Err(err) => return Err(err),
        };

        if outcome == StepOutcome::ReadbackSkipped {
            tracing::warn!("readback skipped; node positions are one step stale");
        }
        if outcome.advanced() {
            self.alpha = alpha;
        }
        Ok(outcome)
    }

    /// Move to the GPU when the monitor reports sustained low throughput
    async fn maybe_switch(&mut self) -> Result<bool> {
        if !self.options.enable_switching
            || self.auto_switch_failed
            || self.mode() != BackendKind::Cpu
            || !self
                .monitor
                .should_switch_to_gpu(self.options.thresholds.min_windows)
        {
            return Ok(false);
        }

        tracing::info!(
            avg_fps = self.monitor.avg_fps(),
            "CPU throughput below threshold, switching to GPU"
        );
        let mode = self
            .switch_to(
                BackendKind::Gpu,
                "Switched to GPU for better performance".to_string(),
            )
            .await?;
        if mode != BackendKind::Gpu {
            self.auto_switch_failed = true;
        }
        Ok(mode == BackendKind::Gpu)
    }

    /// Swap the active backend, keeping nodes and forces as they are
    async fn switch_to(&mut self, target: BackendKind, reason: String) -> Result<BackendKind> {
        if self.mode() == target {
            return Ok(target);
        }

        let next = match target {
            BackendKind::Cpu => ActiveBackend::Cpu(CpuBackend::new()),
            BackendKind::Gpu => match self.build_gpu().await {
                Ok(backend) => ActiveBackend::Gpu(backend),
                Err(err) if err.is_recoverable_by_fallback() => {
                    tracing::warn!(%err, "cannot switch to GPU, staying on CPU");
                    self.monitor.reset();
                    self.events.emit(&SimulationEvent::ModeChange {
                        mode: BackendKind::Cpu,
                        reason: format!("GPU unavailable, staying on CPU: {err}"),
                    });
                    return Ok(BackendKind::Cpu);
                }
                Err(err) => return Err(err),
            },
        };

        let from = self.mode();
        self.backend = next;
        self.monitor.reset();
        tracing::info!(%from, to = %target, "{reason}");
        self.events.emit(&SimulationEvent::ModeChange {
            mode: target,
            reason,
        });
        Ok(target)
    }

    async fn build_gpu(&mut self) -> Result<GpuBackend> {
        // Custom forces have no kernel; fail before touching the device
        self.forces.parallel_plan()?;

        let cached = match &self.gpu {
            GpuSlot::Ready(context) if !context.is_lost() => Some(context.clone()),
            GpuSlot::Unavailable(reason) => {
                return Err(SimulationError::CapabilityUnavailable(reason.clone()));
            }
            _ => None,
        };
        let context = match cached {
            Some(context) => context,
            None => match GpuContext::request().await {
                Ok(context) => {
                    self.gpu = GpuSlot::Ready(context.clone());
                    context
                }
                Err(err) => {
                    let reason = match &err {
                        SimulationError::CapabilityUnavailable(reason) => reason.clone(),
                        other => other.to_string(),
                    };
                    self.gpu = GpuSlot::Unavailable(reason);
                    return Err(err);
                }
            },
        };
        GpuBackend::new(context, &self.nodes, &self.forces).await
    }

    /// Push node or force changes into the active backend, leaving the GPU if it cannot follow
    fn reconfigure_backend(&mut self) {
        if let Err(err) = self.backend.configure(&self.nodes, &self.forces) {
            self.fall_back_to_cpu(&err);
        }
    }

    fn fall_back_to_cpu(&mut self, err: &SimulationError) {
        tracing::warn!(%err, "GPU backend failed, continuing on CPU");
        if matches!(err, SimulationError::DeviceLost(_)) {
            self.gpu = GpuSlot::Untried;
        }
        self.backend = ActiveBackend::Cpu(CpuBackend::new());
        self.monitor.reset();
        self.events.emit(&SimulationEvent::ModeChange {
            mode: BackendKind::Cpu,
            reason: format!("Fell back to CPU: {err}"),
        });
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("nodes", &self.nodes.len())
            .field("forces", &self.forces)
            .field("alpha", &self.alpha)
            .field("state", &self.state())
            .finish()
    }
}
