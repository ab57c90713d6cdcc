use std::sync::mpsc;

use crate::error::EngineError;
use crate::types::PixelFormat;

use super::context::GpuContext;

/// Bytes per texel of the `Rgba16Float` render targets.
const BYTES_PER_TEXEL: u32 = 8;

/// Copies a render target into host memory, one padded row after another,
/// starting from texture row 0.
pub(crate) fn read_target(
    gpu: &GpuContext,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
) -> Result<(Vec<u8>, u32), EngineError> {
    let padded_bytes_per_row = padded_row_bytes(width);
    let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback buffer"),
        size: u64::from(padded_bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    gpu.wait_idle()?;
    receiver
        .recv()
        .map_err(|_| EngineError::Readback("map callback was dropped".to_string()))?
        .map_err(|err| EngineError::Readback(err.to_string()))?;

    let bytes = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok((bytes, padded_bytes_per_row))
}

pub(crate) fn padded_row_bytes(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_TEXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Converts padded `Rgba16Float` rows into tightly packed floats of the
/// requested format. Row order is preserved; Luminance is `R + G + B`.
pub(crate) fn convert_rows(
    raw: &[u8],
    padded_bytes_per_row: u32,
    width: u32,
    height: u32,
    format: PixelFormat,
    out: &mut [f32],
) -> Result<(), EngineError> {
    let depth = format.depth();
    let expected = width as usize * height as usize * depth;
    if out.len() != expected {
        return Err(EngineError::Readback(format!(
            "output holds {} values, {expected} required for {width}x{height}x{depth}",
            out.len()
        )));
    }
    let row_bytes = (width * BYTES_PER_TEXEL) as usize;
    let stride = padded_bytes_per_row as usize;
    if raw.len() < stride * (height as usize).saturating_sub(1) + row_bytes {
        return Err(EngineError::Readback("readback buffer is too small".to_string()));
    }

    let mut written = 0;
    for row in 0..height as usize {
        let start = row * stride;
        for texel in raw[start..start + row_bytes].chunks_exact(BYTES_PER_TEXEL as usize) {
            let mut rgba = [0.0f32; 4];
            for (component, bytes) in rgba.iter_mut().zip(texel.chunks_exact(2)) {
                *component = half::f16::from_bits(u16::from_le_bytes([bytes[0], bytes[1]])).to_f32();
            }
            match format {
                PixelFormat::Rgba => out[written..written + 4].copy_from_slice(&rgba),
                PixelFormat::Rgb => out[written..written + 3].copy_from_slice(&rgba[..3]),
                PixelFormat::Luminance => out[written] = rgba[0] + rgba[1] + rgba[2],
            }
            written += depth;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(rows: &[Vec<[f32; 4]>], padded: u32) -> Vec<u8> {
        let mut raw = Vec::new();
        for row in rows {
            let start = raw.len();
            for texel in row {
                for value in texel {
                    raw.extend_from_slice(&half::f16::from_f32(*value).to_bits().to_le_bytes());
                }
            }
            raw.resize(start + padded as usize, 0);
        }
        raw
    }

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_row_bytes(1), 256);
        assert_eq!(padded_row_bytes(32), 256);
        assert_eq!(padded_row_bytes(33), 512);
    }

    #[test]
    fn converts_each_format() {
        let padded = padded_row_bytes(2);
        let raw = encode(
            &[
                vec![[0.5, 0.25, 0.125, 1.0], [1.0, 0.0, 0.0, 0.5]],
                vec![[0.0, 1.0, 0.0, 1.0], [0.0, 0.0, 1.0, 0.0]],
            ],
            padded,
        );

        let mut rgba = vec![0.0; 16];
        convert_rows(&raw, padded, 2, 2, PixelFormat::Rgba, &mut rgba).unwrap();
        assert_eq!(&rgba[..4], &[0.5, 0.25, 0.125, 1.0]);
        assert_eq!(&rgba[12..], &[0.0, 0.0, 1.0, 0.0]);

        let mut rgb = vec![0.0; 12];
        convert_rows(&raw, padded, 2, 2, PixelFormat::Rgb, &mut rgb).unwrap();
        assert_eq!(&rgb[3..6], &[1.0, 0.0, 0.0]);

        let mut luminance = vec![0.0; 4];
        convert_rows(&raw, padded, 2, 2, PixelFormat::Luminance, &mut luminance).unwrap();
        assert_eq!(luminance, vec![0.875, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn rejects_mismatched_output() {
        let padded = padded_row_bytes(1);
        let raw = encode(&[vec![[0.0; 4]]], padded);
        let mut out = vec![0.0; 3];
        assert!(matches!(
            convert_rows(&raw, padded, 1, 1, PixelFormat::Rgba, &mut out),
            Err(EngineError::Readback(_))
        ));
    }
}
