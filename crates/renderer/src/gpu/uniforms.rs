use bytemuck::{Pod, Zeroable};

use crate::types::{FrameUniforms, CHANNEL_COUNT};

/// std140 mirror of the `ShadertoyInputs` block declared by the template.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ShadertoyUniforms {
    pub i_resolution: [f32; 4],
    pub i_mouse: [f32; 4],
    pub i_date: [f32; 4],
    pub i_time: f32,
    pub i_time_delta: f32,
    pub i_frame_rate: f32,
    pub i_frame: i32,
    pub i_sample_rate: f32,
    pub i_padding: [f32; 3],
    pub i_channel_time: [f32; 4],
    pub i_channel_resolution: [[f32; 4]; CHANNEL_COUNT],
}

impl ShadertoyUniforms {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            i_resolution: [width as f32, height as f32, 1.0, 0.0],
            i_mouse: [0.0; 4],
            i_date: [0.0; 4],
            i_time: 0.0,
            i_time_delta: 0.0,
            i_frame_rate: 0.0,
            i_frame: 0,
            i_sample_rate: 44100.0,
            i_padding: [0.0; 3],
            i_channel_time: [0.0; 4],
            i_channel_resolution: [[0.0; 4]; CHANNEL_COUNT],
        }
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.i_resolution[0] = width as f32;
        self.i_resolution[1] = height as f32;
    }

    pub fn apply_frame(&mut self, frame: &FrameUniforms) {
        self.i_time = frame.time;
        self.i_time_delta = frame.time_delta;
        self.i_frame_rate = frame.frame_rate;
        self.i_frame = frame.frame;
        self.i_mouse = frame.mouse;
        self.i_date = frame.date;
        self.i_channel_time = [frame.time; 4];
    }

    pub fn set_channel_resolution(&mut self, index: usize, resolution: [f32; 4]) {
        if let Some(slot) = self.i_channel_resolution.get_mut(index) {
            *slot = resolution;
        }
    }
}
