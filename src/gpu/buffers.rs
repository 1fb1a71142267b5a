//! GPU buffer bundle for one simulation
//!
//! Sized to the current node and link counts. Uploads are full overwrites;
//! readbacks copy out only what the caller asks for.

use super::context::GpuContext;
use super::types::{LinkRecord, NodeRecord, SimulationParams};
use crate::error::{Result, SimulationError};
use crate::forces::ForcePlan;
use crate::model::Node;

const NODE_RECORD_SIZE: u64 = std::mem::size_of::<NodeRecord>() as u64;
const LINK_RECORD_SIZE: u64 = std::mem::size_of::<LinkRecord>() as u64;
const PARAMS_SIZE: u64 = std::mem::size_of::<SimulationParams>() as u64;

/// Node storage, per-iteration snapshot and the staging buffer for readback
pub struct NodeBuffers {
    storage: wgpu::Buffer,
    snapshot: wgpu::Buffer,
    staging: wgpu::Buffer,
    node_count: u32,
    mapped: bool,
}

impl NodeBuffers {
    pub fn new(device: &wgpu::Device, node_count: u32) -> Self {
        // Bindings can't be empty; keep room for one record
        let size = u64::from(node_count.max(1)) * NODE_RECORD_SIZE;

        let storage = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Node Storage Buffer"),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let snapshot = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Node Snapshot Buffer"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Node Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            storage,
            snapshot,
            staging,
            node_count,
            mapped: false,
        }
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    fn byte_len(&self) -> u64 {
        u64::from(self.node_count) * NODE_RECORD_SIZE
    }

    pub fn storage(&self) -> &wgpu::Buffer {
        &self.storage
    }

    pub fn snapshot(&self) -> &wgpu::Buffer {
        &self.snapshot
    }

    /// Overwrite every node record
    pub fn upload(&self, queue: &wgpu::Queue, nodes: &[Node], plan: &ForcePlan) {
        if nodes.is_empty() {
            return;
        }
        let strength = plan.default_strength();
        let radius = plan.default_radius();
        let records: Vec<NodeRecord> = nodes
            .iter()
            .map(|node| NodeRecord::from_node(node, strength, radius))
            .collect();
        queue.write_buffer(&self.storage, 0, bytemuck::cast_slice(&records));
    }

    /// Copy current node state into the snapshot read by link and collide
    pub fn encode_snapshot(&self, encoder: &mut wgpu::CommandEncoder) {
        if self.node_count > 0 {
            encoder.copy_buffer_to_buffer(&self.storage, 0, &self.snapshot, 0, self.byte_len());
        }
    }

    /// Copy node state into the staging buffer for a later readback
    pub fn encode_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        if self.node_count > 0 {
            encoder.copy_buffer_to_buffer(&self.storage, 0, &self.staging, 0, self.byte_len());
        }
    }

    /// Read positions and velocities back into `nodes`.
    ///
    /// Returns `false` when the readback was skipped because the staging
    /// buffer is still mapped.
    pub async fn download_nodes(&mut self, context: &GpuContext, nodes: &mut [Node]) -> Result<bool> {
        let Some(records) = skip_reentrant(self.read_staging(context).await)? else {
            return Ok(false);
        };
        for (node, record) in nodes.iter_mut().zip(&records) {
            node.x = record.x;
            node.y = record.y;
            node.vx = record.vx;
            node.vy = record.vy;
        }
        Ok(true)
    }

    /// Read velocities only, after a force-only pass
    pub async fn download_velocities(
        &mut self,
        context: &GpuContext,
        nodes: &mut [Node],
    ) -> Result<bool> {
        let Some(records) = skip_reentrant(self.read_staging(context).await)? else {
            return Ok(false);
        };
        for (node, record) in nodes.iter_mut().zip(&records) {
            node.vx = record.vx;
            node.vy = record.vy;
        }
        Ok(true)
    }

    async fn read_staging(&mut self, context: &GpuContext) -> Result<Vec<NodeRecord>> {
        if self.node_count == 0 {
            return Ok(Vec::new());
        }
        if self.mapped {
            // A previous readback was abandoned mid-map; drop it so the next step can read
            self.staging.unmap();
            self.mapped = false;
            return Err(SimulationError::BufferReentrancy);
        }

        self.mapped = true;
        let records = context.read_buffer(&self.staging, self.byte_len()).await;
        self.mapped = false;
        records
    }

    fn destroy(&self) {
        self.storage.destroy();
        self.snapshot.destroy();
        self.staging.destroy();
    }
}

/// A re-entrant readback costs one step of staleness, not the run
fn skip_reentrant(records: Result<Vec<NodeRecord>>) -> Result<Option<Vec<NodeRecord>>> {
    match records {
        Ok(records) => Ok(Some(records)),
        Err(SimulationError::BufferReentrancy) => {
            tracing::warn!("node staging buffer already mapped, skipping readback");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Link records, grown on demand
pub struct LinkBuffer {
    storage: wgpu::Buffer,
    capacity: usize,
}

impl LinkBuffer {
    pub fn new(device: &wgpu::Device, capacity: usize) -> Self {
        let size = (capacity.max(1) as u64) * LINK_RECORD_SIZE;
        let storage = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Link Storage Buffer"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { storage, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn upload(&self, queue: &wgpu::Queue, links: &[LinkRecord]) {
        if !links.is_empty() {
            queue.write_buffer(&self.storage, 0, bytemuck::cast_slice(links));
        }
    }
}

/// All device-resident resources for one node/link count, plus their bind group
pub struct GpuResources {
    pub nodes: NodeBuffers,
    pub links: LinkBuffer,
    params: wgpu::Buffer,
    reduction: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl GpuResources {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        node_count: u32,
        link_capacity: usize,
    ) -> Self {
        let nodes = NodeBuffers::new(device, node_count);
        let links = LinkBuffer::new(device, link_capacity);
        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Simulation Params Buffer"),
            size: PARAMS_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let reduction = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Center Reduction Buffer"),
            size: 16,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Force Simulation Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: nodes.storage().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: nodes.snapshot().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: links.storage.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: reduction.as_entire_binding(),
                },
            ],
        });

        Self {
            nodes,
            links,
            params,
            reduction,
            bind_group,
        }
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn upload_params(&self, queue: &wgpu::Queue, params: &SimulationParams) {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(params));
    }

    /// Release device memory now instead of waiting for drop
    pub fn destroy(&self) {
        self.nodes.destroy();
        self.links.storage.destroy();
        self.params.destroy();
        self.reduction.destroy();
    }
}

/// Bind group layout shared by every kernel
pub fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Force Simulation Bind Group Layout"),
        entries: &[
            storage(0, false),
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            storage(2, true),
            storage(3, true),
            storage(4, false),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reentrant_readback_is_skipped() {
        let skipped = skip_reentrant(Err(SimulationError::BufferReentrancy)).unwrap();
        assert!(skipped.is_none());
    }

    #[test]
    fn test_device_loss_still_propagates() {
        let lost = skip_reentrant(Err(SimulationError::DeviceLost("reset".into())));
        assert!(matches!(lost, Err(SimulationError::DeviceLost(_))));
    }
}
