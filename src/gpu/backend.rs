//! GPU backend: pipelines, per-step command sequence and readback

use super::buffers::{GpuResources, bind_group_layout};
use super::context::GpuContext;
use super::shaders::{ForceShaders, WORKGROUP_SIZE};
use super::types::{LinkRecord, SimulationParams};
use crate::backend::{Backend, BackendKind, StepContext, StepOutcome};
use crate::error::{Result, SimulationError};
use crate::forces::{ForcePlan, ForceRegistry};
use crate::model::Node;

/// Compiled compute pipelines, one per kernel entry point
struct ForcePipelines {
    many_body: wgpu::ComputePipeline,
    link: wgpu::ComputePipeline,
    collide: wgpu::ComputePipeline,
    force_x: wgpu::ComputePipeline,
    force_y: wgpu::ComputePipeline,
    radial: wgpu::ComputePipeline,
    center_reduce: wgpu::ComputePipeline,
    center_apply: wgpu::ComputePipeline,
    integrate: wgpu::ComputePipeline,
}

impl ForcePipelines {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> Self {
        let shaders = ForceShaders::new();

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Force Simulation Pipeline Layout"),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });

        let module = |label: &str, source: &str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        };
        let pipeline = |label: &str, module: &wgpu::ShaderModule, entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let many_body = module("Many-Body Force Shader", &shaders.many_body);
        let link = module("Link Force Shader", &shaders.link);
        let collide = module("Collide Force Shader", &shaders.collide);
        let position = module("Position Force Shader", &shaders.position);
        let radial = module("Radial Force Shader", &shaders.radial);
        let center = module("Center Force Shader", &shaders.center);
        let integrate = module("Integrate Shader", &shaders.integrate);

        Self {
            many_body: pipeline("Many-Body Force Pipeline", &many_body, "many_body"),
            link: pipeline("Link Force Pipeline", &link, "link_force"),
            collide: pipeline("Collide Force Pipeline", &collide, "collide"),
            force_x: pipeline("Force X Pipeline", &position, "force_x"),
            force_y: pipeline("Force Y Pipeline", &position, "force_y"),
            radial: pipeline("Radial Force Pipeline", &radial, "radial"),
            center_reduce: pipeline("Center Reduce Pipeline", &center, "center_reduce"),
            center_apply: pipeline("Center Apply Pipeline", &center, "center_apply"),
            integrate: pipeline("Integrate Pipeline", &integrate, "integrate"),
        }
    }
}

fn dispatch(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    workgroups: u32,
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.dispatch_workgroups(workgroups, 1, 1);
}

/// Runs the enabled forces as compute kernels.
///
/// Owns its buffers exclusively. Each step uploads the canonical nodes,
/// encodes the kernels in fixed order (many-body, link, collide, x, y, radial,
/// center, integrate), submits once and reads the result back.
pub struct GpuBackend {
    context: GpuContext,
    layout: wgpu::BindGroupLayout,
    pipelines: ForcePipelines,
    resources: Option<GpuResources>,
    plan: ForcePlan,
}

impl GpuBackend {
    /// Compile the kernels, allocate buffers for `nodes` and run a warm-up dispatch.
    ///
    /// Fails with `CapabilityUnavailable` if a registered force has no GPU
    /// kernel, or `KernelCompilation` if a shader or pipeline does not validate.
    pub async fn new(context: GpuContext, nodes: &[Node], forces: &ForceRegistry) -> Result<Self> {
        context.check_live()?;
        let plan = forces.parallel_plan()?;

        let device = context.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = bind_group_layout(device);
        let pipelines = ForcePipelines::new(device, &layout);
        if let Some(error) = device.pop_error_scope().await {
            return Err(SimulationError::KernelCompilation(error.to_string()));
        }
        tracing::debug!(adapter = context.adapter_name(), "GPU pipelines compiled");

        let mut backend = Self {
            context,
            layout,
            pipelines,
            resources: None,
            plan,
        };
        backend.configure(nodes, forces)?;
        backend.warm_up().await?;
        Ok(backend)
    }

    fn node_count(&self) -> usize {
        self.resources
            .as_ref()
            .map_or(0, |r| r.nodes.node_count() as usize)
    }

    /// Dispatch every pipeline once so drivers finish lazy compilation up front
    async fn warm_up(&mut self) -> Result<()> {
        let Some(resources) = &self.resources else {
            return Ok(());
        };
        let node_count = resources.nodes.node_count();
        if node_count == 0 {
            return Ok(());
        }

        let params = SimulationParams::from_plan(&self.plan, 0.0, 1.0, node_count);
        resources.upload_params(self.context.queue(), &params);

        let groups = node_count.div_ceil(WORKGROUP_SIZE);
        let bind_group = resources.bind_group();
        let p = &self.pipelines;
        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Warm-up Encoder"),
                });
        for (label, pipeline, workgroups) in [
            ("Warm-up Many-Body", &p.many_body, groups),
            ("Warm-up Link", &p.link, groups),
            ("Warm-up Collide", &p.collide, groups),
            ("Warm-up Force X", &p.force_x, groups),
            ("Warm-up Force Y", &p.force_y, groups),
            ("Warm-up Radial", &p.radial, groups),
            ("Warm-up Center Reduce", &p.center_reduce, 1),
            ("Warm-up Center Apply", &p.center_apply, groups),
            ("Warm-up Integrate", &p.integrate, groups),
        ] {
            dispatch(&mut encoder, label, pipeline, bind_group, workgroups);
        }
        self.context
            .queue()
            .submit(std::iter::once(encoder.finish()));
        self.context.submitted_work_done().await?;
        tracing::debug!(node_count, "GPU warm-up complete");
        Ok(())
    }

    fn encode_forces(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        resources: &GpuResources,
        node_count: u32,
    ) {
        let groups = node_count.div_ceil(WORKGROUP_SIZE);
        let bind_group = resources.bind_group();
        let p = &self.pipelines;

        if self.plan.many_body.is_some() {
            dispatch(encoder, "Many-Body Force Pass", &p.many_body, bind_group, groups);
        }
        if let Some(link) = &self.plan.link {
            if !link.links.is_empty() {
                for _ in 0..link.iterations {
                    resources.nodes.encode_snapshot(encoder);
                    dispatch(encoder, "Link Force Pass", &p.link, bind_group, groups);
                }
            }
        }
        if let Some(collide) = &self.plan.collide {
            for _ in 0..collide.iterations {
                resources.nodes.encode_snapshot(encoder);
                dispatch(encoder, "Collide Force Pass", &p.collide, bind_group, groups);
            }
        }
        if self.plan.x.is_some() {
            dispatch(encoder, "Force X Pass", &p.force_x, bind_group, groups);
        }
        if self.plan.y.is_some() {
            dispatch(encoder, "Force Y Pass", &p.force_y, bind_group, groups);
        }
        if self.plan.radial.is_some() {
            dispatch(encoder, "Radial Force Pass", &p.radial, bind_group, groups);
        }
        if self.plan.center.is_some() {
            dispatch(encoder, "Center Reduce Pass", &p.center_reduce, bind_group, 1);
            dispatch(encoder, "Center Apply Pass", &p.center_apply, bind_group, groups);
        }
    }

    /// Upload state, encode the force passes (and integration) and submit.
    ///
    /// Returns `false` without submitting if the step was cancelled.
    async fn submit_step(&mut self, ctx: &StepContext<'_>, integrate: bool) -> Result<bool> {
        self.context.check_live()?;
        if self.node_count() != ctx.nodes.len() || self.resources.is_none() {
            self.configure(ctx.nodes, ctx.forces)?;
        }
        let Some(resources) = self.resources.as_ref() else {
            return Err(SimulationError::DeviceLost(
                "GPU resources were released".to_string(),
            ));
        };

        let node_count = resources.nodes.node_count();
        let queue = self.context.queue();
        resources.nodes.upload(queue, ctx.nodes, &self.plan);
        resources.upload_params(
            queue,
            &SimulationParams::from_plan(&self.plan, ctx.alpha, ctx.velocity_decay, node_count),
        );

        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Force Simulation Encoder"),
                });
        self.encode_forces(&mut encoder, resources, node_count);
        if integrate {
            let groups = node_count.div_ceil(WORKGROUP_SIZE);
            dispatch(
                &mut encoder,
                "Integration Pass",
                &self.pipelines.integrate,
                resources.bind_group(),
                groups,
            );
        }
        resources.nodes.encode_readback(&mut encoder);

        if ctx.is_cancelled() {
            tracing::debug!("stop requested before submit, dropping staged step");
            return Ok(false);
        }
        queue.submit(std::iter::once(encoder.finish()));
        self.context.submitted_work_done().await?;
        Ok(true)
    }
}

impl Backend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn configure(&mut self, nodes: &[Node], forces: &ForceRegistry) -> Result<()> {
        self.context.check_live()?;
        let plan = forces.parallel_plan()?;
        let links: Vec<LinkRecord> = plan
            .link
            .as_ref()
            .map(|link| link.links.iter().map(LinkRecord::from).collect())
            .unwrap_or_default();
        let node_count = u32::try_from(nodes.len()).map_err(|_| {
            SimulationError::CapabilityUnavailable(format!(
                "{} nodes exceed the GPU index range",
                nodes.len()
            ))
        })?;

        let reusable = self.resources.as_ref().is_some_and(|r| {
            r.nodes.node_count() == node_count && r.links.capacity() >= links.len()
        });
        if !reusable {
            if let Some(old) = self.resources.take() {
                old.destroy();
            }
            tracing::debug!(node_count, link_count = links.len(), "allocating GPU buffers");
            self.resources = Some(GpuResources::new(
                self.context.device(),
                &self.layout,
                node_count,
                links.len(),
            ));
        }
        if let Some(resources) = &self.resources {
            resources.links.upload(self.context.queue(), &links);
        }
        self.plan = plan;
        Ok(())
    }

    async fn step(&mut self, ctx: StepContext<'_>) -> Result<StepOutcome> {
        if !self.submit_step(&ctx, true).await? {
            return Ok(StepOutcome::Cancelled);
        }
        let Some(resources) = self.resources.as_mut() else {
            return Err(SimulationError::DeviceLost(
                "GPU resources were released".to_string(),
            ));
        };
        if resources.nodes.download_nodes(&self.context, ctx.nodes).await? {
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::ReadbackSkipped)
        }
    }

    async fn accumulate(&mut self, ctx: StepContext<'_>) -> Result<StepOutcome> {
        if !self.submit_step(&ctx, false).await? {
            return Ok(StepOutcome::Cancelled);
        }
        let Some(resources) = self.resources.as_mut() else {
            return Err(SimulationError::DeviceLost(
                "GPU resources were released".to_string(),
            ));
        };
        if resources
            .nodes
            .download_velocities(&self.context, ctx.nodes)
            .await?
        {
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::ReadbackSkipped)
        }
    }
}

impl Drop for GpuBackend {
    fn drop(&mut self) {
        if let Some(resources) = self.resources.take() {
            resources.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;
    use crate::forces::{Collide, ManyBody};
    use crate::model::initialize_nodes;

    async fn context_or_skip() -> Option<GpuContext> {
        match GpuContext::request().await {
            Ok(context) => Some(context),
            Err(err) => {
                eprintln!("skipping GPU test: {err}");
                None
            }
        }
    }

    #[tokio::test]
    async fn test_kernels_compile() {
        let Some(context) = context_or_skip().await else {
            return;
        };
        let nodes = vec![Node::at(0.0, 0.0), Node::at(1.0, 1.0)];
        let backend = GpuBackend::new(context, &nodes, &ForceRegistry::new())
            .await
            .expect("kernels should compile");
        assert_eq!(backend.kind(), BackendKind::Gpu);
    }

    #[tokio::test]
    async fn test_gpu_step_matches_cpu_step() {
        let Some(context) = context_or_skip().await else {
            return;
        };
        let mut nodes: Vec<Node> = (0..40).map(|_| Node::new()).collect();
        initialize_nodes(&mut nodes);
        let mut cpu_nodes = nodes.clone();

        let mut forces = ForceRegistry::new();
        forces.insert("charge", Box::new(ManyBody::new()));
        forces.insert("collide", Box::new(Collide::new().radius(8.0)));

        let mut gpu = GpuBackend::new(context, &nodes, &forces)
            .await
            .expect("gpu backend");
        let mut cpu = CpuBackend::new();
        for _ in 0..5 {
            let outcome = gpu
                .step(StepContext {
                    nodes: &mut nodes,
                    forces: &mut forces,
                    alpha: 0.5,
                    velocity_decay: 0.6,
                    running: None,
                })
                .await
                .expect("gpu step");
            assert_eq!(outcome, StepOutcome::Completed);
            cpu.step(StepContext {
                nodes: &mut cpu_nodes,
                forces: &mut forces,
                alpha: 0.5,
                velocity_decay: 0.6,
                running: None,
            })
            .await
            .expect("cpu step");
        }

        for (g, c) in nodes.iter().zip(&cpu_nodes) {
            let scale = c.x.abs().max(c.y.abs()).max(1.0);
            assert!((g.x - c.x).abs() / scale < 1e-3, "{} vs {}", g.x, c.x);
            assert!((g.y - c.y).abs() / scale < 1e-3, "{} vs {}", g.y, c.y);
        }
    }

    #[tokio::test]
    async fn test_cancelled_step_is_not_submitted() {
        let Some(context) = context_or_skip().await else {
            return;
        };
        let mut nodes = vec![Node::at(0.0, 0.0), Node::at(10.0, 0.0)];
        let before = nodes.clone();
        let mut forces = ForceRegistry::new();
        forces.insert("charge", Box::new(ManyBody::new()));
        let mut gpu = GpuBackend::new(context, &nodes, &forces)
            .await
            .expect("gpu backend");

        let running = std::sync::atomic::AtomicBool::new(false);
        let outcome = gpu
            .step(StepContext {
                nodes: &mut nodes,
                forces: &mut forces,
                alpha: 1.0,
                velocity_decay: 0.6,
                running: Some(&running),
            })
            .await
            .expect("step");
        assert_eq!(outcome, StepOutcome::Cancelled);
        assert_eq!(nodes, before);
    }
}
