//! Owned GPU device context
//!
//! Acquired once by the controller on first use and handed to every GPU
//! backend it builds. Cloning is cheap; device and queue are shared.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;

use crate::error::{Result, SimulationError};

/// Device, queue and liveness flag for one GPU
#[derive(Clone)]
pub struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_name: String,
    lost: Arc<AtomicBool>,
}

impl GpuContext {
    /// Request a high-performance adapter and a device with compute support.
    ///
    /// Returns `CapabilityUnavailable` when no usable adapter exists.
    pub async fn request() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                SimulationError::CapabilityUnavailable("no suitable GPU adapter".to_string())
            })?;

        let info = adapter.get_info();
        if !adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(SimulationError::CapabilityUnavailable(format!(
                "adapter '{}' does not support compute shaders",
                info.name
            )));
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Force Layout Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None, // trace path
            )
            .await
            .map_err(|e| SimulationError::CapabilityUnavailable(e.to_string()))?;

        tracing::debug!(adapter = %info.name, backend = ?info.backend, "GPU device created");
        Ok(Self::from_device(Arc::new(device), Arc::new(queue), info.name))
    }

    /// Blocking variant of [`GpuContext::request`] for synchronous callers
    pub fn request_blocking() -> Result<Self> {
        pollster::block_on(Self::request())
    }

    /// Wrap an existing device and queue
    pub fn from_device(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        adapter_name: impl Into<String>,
    ) -> Self {
        let lost = Arc::new(AtomicBool::new(false));

        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!("uncaptured GPU error: {error}");
        }));

        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            flag.store(true, Ordering::Release);
            tracing::error!(?reason, "GPU device lost: {message}");
        });

        Self {
            device,
            queue,
            adapter_name: adapter_name.into(),
            lost,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Fail with `DeviceLost` once the device is gone
    pub fn check_live(&self) -> Result<()> {
        if self.is_lost() {
            return Err(SimulationError::DeviceLost(format!(
                "device on '{}' is no longer available",
                self.adapter_name
            )));
        }
        Ok(())
    }

    /// Block until queued work and map callbacks have been processed
    pub fn poll_wait(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    /// Wait for everything submitted so far to finish executing
    pub async fn submitted_work_done(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.queue.on_submitted_work_done(move || {
            let _ = tx.send(());
        });
        self.poll_wait();
        rx.await.map_err(|_| {
            SimulationError::DeviceLost("queue completion callback dropped".to_string())
        })?;
        self.check_live()
    }

    /// Map `len` bytes of a `MAP_READ` buffer and copy them out
    pub async fn read_buffer<T: bytemuck::Pod>(
        &self,
        buffer: &wgpu::Buffer,
        len: u64,
    ) -> Result<Vec<T>> {
        let slice = buffer.slice(..len);
        let (tx, rx) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.poll_wait();

        rx.await
            .map_err(|_| SimulationError::DeviceLost("map callback dropped".to_string()))?
            .map_err(|e| SimulationError::DeviceLost(e.to_string()))?;

        let data = slice.get_mapped_range();
        let values = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        buffer.unmap();
        Ok(values)
    }

    /// Tear the device down; every backend built on it fails from here on
    pub fn destroy(&self) {
        self.lost.store(true, Ordering::Release);
        self.device.destroy();
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter_name)
            .field("lost", &self.is_lost())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_or_unavailable() {
        match GpuContext::request().await {
            Ok(context) => {
                assert!(!context.is_lost());
                assert!(context.check_live().is_ok());
            }
            Err(err) => {
                eprintln!("skipping: {err}");
                assert!(err.is_recoverable_by_fallback());
            }
        }
    }

    #[tokio::test]
    async fn test_destroy_marks_lost() {
        let Ok(context) = GpuContext::request().await else {
            eprintln!("skipping: no GPU adapter");
            return;
        };
        context.destroy();
        assert!(matches!(
            context.check_live(),
            Err(SimulationError::DeviceLost(_))
        ));
    }
}
