use std::sync::Arc;

use renderer::TextureData;

use crate::error::{Error, Result};

/// Row-major float image, `dims = [height, width, depth]`, row 0 at the top.
///
/// Clones share the pixel buffer; writers go through [`Image::data_mut`],
/// which detaches the buffer when it is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: Arc<Vec<f32>>,
    dims: [u32; 3],
    changed: bool,
    frame_timing: u64,
}

fn element_count(dims: [u32; 3]) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |count, dim| count.checked_mul(*dim as usize))
        .ok_or_else(|| {
            Error::InvalidFormat(format!(
                "Image of dimensions {}x{}x{} is too large",
                dims[0], dims[1], dims[2]
            ))
        })
}

impl Image {
    pub fn new(dims: [u32; 3]) -> Result<Self> {
        Ok(Self {
            data: Arc::new(vec![0.0; element_count(dims)?]),
            dims,
            changed: false,
            frame_timing: 0,
        })
    }

    /// Wraps existing texels; `data` must hold exactly `height * width * depth` values.
    pub fn from_data(dims: [u32; 3], data: Vec<f32>) -> Result<Self> {
        let expected = element_count(dims)?;
        if data.len() != expected {
            return Err(Error::InvalidFormat(format!(
                "Image of dimensions {}x{}x{} needs {expected} values, got {}",
                dims[0],
                dims[1],
                dims[2],
                data.len()
            )));
        }
        Ok(Self {
            data: Arc::new(data),
            dims,
            changed: false,
            frame_timing: 0,
        })
    }

    /// Records `dims` and reallocates the buffer only when the element count changes.
    pub fn alloc(&mut self, dims: [u32; 3]) -> Result<()> {
        let count = element_count(dims)?;
        self.dims = dims;
        if self.data.len() != count {
            self.data = Arc::new(vec![0.0; count]);
        }
        Ok(())
    }

    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    pub fn height(&self) -> u32 {
        self.dims[0]
    }

    pub fn width(&self) -> u32 {
        self.dims[1]
    }

    pub fn depth(&self) -> u32 {
        self.dims[2]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Components of the pixel at `(row, col)`.
    pub fn pixel(&self, row: u32, col: u32) -> Option<&[f32]> {
        if row >= self.height() || col >= self.width() {
            return None;
        }
        let depth = self.depth() as usize;
        let start = (row as usize * self.width() as usize + col as usize) * depth;
        self.data.get(start..start + depth)
    }

    /// Whether the pixels changed since the image was last handed out.
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    /// Execution time of the terminal buffer, in nanoseconds.
    pub fn frame_timing(&self) -> u64 {
        self.frame_timing
    }

    pub fn set_frame_timing(&mut self, nanos: u64) {
        self.frame_timing = nanos;
    }

    /// Swaps rows around the horizontal midpoint. Flipping twice is the identity.
    pub fn flip_vertical(&mut self) {
        let height = self.height() as usize;
        let stride = self.width() as usize * self.depth() as usize;
        if height < 2 || stride == 0 {
            return;
        }
        let data = self.data_mut();
        for row in 0..height / 2 {
            let (top, bottom) = data.split_at_mut((height - row - 1) * stride);
            top[row * stride..(row + 1) * stride].swap_with_slice(&mut bottom[..stride]);
        }
    }

    /// Converts to a bottom-up texture the engine can sample.
    pub fn to_texture_data(&self) -> Result<TextureData> {
        let depth = self.depth();
        if !(1..=4).contains(&depth) {
            return Err(Error::InvalidFormat(format!(
                "Unsupported image depth {depth}, expected 1 to 4"
            )));
        }
        let mut flipped = self.clone();
        flipped.flip_vertical();
        TextureData::new(
            self.width(),
            self.height(),
            depth,
            flipped.data().to_vec(),
        )
        .ok_or_else(|| {
            Error::InvalidFormat(format!(
                "Image of dimensions {}x{}x{depth} cannot be used as a texture",
                self.height(),
                self.width()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(dims: [u32; 3]) -> Image {
        let count = element_count(dims).unwrap();
        Image::from_data(dims, (0..count).map(|value| value as f32).collect()).unwrap()
    }

    #[test]
    fn alloc_keeps_buffer_when_size_matches() {
        let mut image = numbered([2, 3, 1]);
        image.alloc([3, 2, 1]).unwrap();
        assert_eq!(image.dims(), [3, 2, 1]);
        assert_eq!(image.data()[5], 5.0);

        image.alloc([3, 2, 4]).unwrap();
        assert_eq!(image.len(), 24);
        assert!(image.data().iter().all(|value| *value == 0.0));
    }

    #[test]
    fn flip_swaps_rows_and_is_self_inverse() {
        let original = numbered([3, 2, 2]);
        let mut image = original.clone();
        image.flip_vertical();
        assert_eq!(image.pixel(0, 0), Some(&[8.0, 9.0][..]));
        assert_eq!(image.pixel(1, 1), Some(&[6.0, 7.0][..]));
        assert_eq!(image.pixel(2, 1), Some(&[2.0, 3.0][..]));
        image.flip_vertical();
        assert_eq!(image, original);
    }

    #[test]
    fn writes_detach_shared_buffers() {
        let mut image = numbered([1, 2, 1]);
        let handed_out = image.clone();
        image.data_mut()[0] = 42.0;
        assert_eq!(handed_out.data()[0], 0.0);
        assert_eq!(image.data()[0], 42.0);
    }

    #[test]
    fn rejects_mismatched_data() {
        assert!(matches!(
            Image::from_data([2, 2, 3], vec![0.0; 11]),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn oversized_dims_are_rejected_without_allocating() {
        assert!(matches!(
            Image::from_data([u32::MAX; 3], Vec::new()),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(Image::new([u32::MAX; 3]), Err(Error::InvalidFormat(_))));

        let mut image = numbered([1, 2, 1]);
        assert!(image.alloc([u32::MAX; 3]).is_err());
        assert_eq!(image.dims(), [1, 2, 1]);
    }

    #[test]
    fn texture_data_is_bottom_up() {
        let image = numbered([2, 1, 1]);
        let texture = image.to_texture_data().unwrap();
        assert_eq!(texture.texels(), &[1.0, 0.0]);
        assert_eq!((texture.width(), texture.height(), texture.channels()), (1, 2, 1));

        assert!(matches!(
            Image::new([1, 1, 5]).unwrap().to_texture_data(),
            Err(Error::InvalidFormat(_))
        ));
    }
}
