use std::sync::mpsc;

use crate::error::EngineError;

use super::context::GpuContext;

const TIMESTAMP_BYTES: u64 = 2 * wgpu::QUERY_SIZE as u64;

/// GPU timestamps written around the terminal pass.
///
/// Only built when the device was created with `TIMESTAMP_QUERY`.
pub(crate) struct PassTimer {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    readback_buffer: wgpu::Buffer,
    period_ns: f32,
}

impl PassTimer {
    pub(crate) fn new(gpu: &GpuContext) -> Option<Self> {
        if !gpu.timestamps {
            return None;
        }
        let query_set = gpu.device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("terminal pass timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: 2,
        });
        let resolve_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timestamp resolve buffer"),
            size: TIMESTAMP_BYTES,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timestamp readback buffer"),
            size: TIMESTAMP_BYTES,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Some(Self {
            query_set,
            resolve_buffer,
            readback_buffer,
            period_ns: gpu.queue.get_timestamp_period(),
        })
    }

    pub(crate) fn writes(&self) -> wgpu::RenderPassTimestampWrites<'_> {
        wgpu::RenderPassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: Some(0),
            end_of_pass_write_index: Some(1),
        }
    }

    /// Records the copy of both timestamps into the mappable buffer.
    pub(crate) fn resolve(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.resolve_query_set(&self.query_set, 0..2, &self.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(
            &self.resolve_buffer,
            0,
            &self.readback_buffer,
            0,
            TIMESTAMP_BYTES,
        );
    }

    /// Waits for the submitted pass and returns its GPU duration.
    pub(crate) fn read_elapsed_ns(&self, gpu: &GpuContext) -> Result<u64, EngineError> {
        let slice = self.readback_buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.wait_idle()?;
        receiver
            .recv()
            .map_err(|_| EngineError::Readback("timestamp map callback was dropped".to_string()))?
            .map_err(|err| EngineError::Readback(err.to_string()))?;

        let (start, end) = {
            let bytes = slice.get_mapped_range();
            let start: u64 = bytemuck::pod_read_unaligned(&bytes[..8]);
            let end: u64 = bytemuck::pod_read_unaligned(&bytes[8..16]);
            (start, end)
        };
        self.readback_buffer.unmap();
        Ok(ticks_to_ns(start, end, self.period_ns))
    }
}

/// Converts a pair of raw timestamps to nanoseconds. A reversed pair, which
/// some drivers report for very short passes, counts as zero.
pub(crate) fn ticks_to_ns(start: u64, end: u64, period_ns: f32) -> u64 {
    (end.saturating_sub(start) as f64 * f64::from(period_ns)).round() as u64
}
