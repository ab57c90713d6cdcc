use std::path::Path;

use anyhow::{bail, Context, Result};
use connector::Image;
use image::ColorType;

/// Loads a picture as a top-down RGBA float image for a channel input.
pub fn load_input_image(path: &Path) -> Result<Image> {
    let decoded = image::open(path)
        .with_context(|| format!("failed to open input image {}", path.display()))?
        .to_rgba32f();
    let dims = [decoded.height(), decoded.width(), 4];
    Image::from_data(dims, decoded.into_raw())
        .with_context(|| format!("unusable input image {}", path.display()))
}

/// Writes `image` as an 8-bit PNG, clamping components to `[0, 1]`.
pub fn write_png(image: &Image, path: &Path) -> Result<()> {
    let color = match image.depth() {
        1 => ColorType::L8,
        3 => ColorType::Rgb8,
        4 => ColorType::Rgba8,
        depth => bail!("cannot write an image of depth {depth} as PNG"),
    };
    let bytes: Vec<u8> = image
        .data()
        .iter()
        .map(|value| (value.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    image::save_buffer(path, &bytes, image.width(), image.height(), color)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Human-readable report printed after a render.
pub fn summary(id: &str, image: &Image) -> String {
    let [height, width, depth] = image.dims();
    let first = image
        .pixel(0, 0)
        .map(|pixel| {
            pixel
                .iter()
                .map(|value| format!("{value:.4}"))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    format!(
        "id: {id}\ndims: {height}x{width}x{depth}\nframe_timing_ns: {}\nfirst_pixel: [{first}]",
        image.frame_timing()
    )
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn png_round_trips_through_input_loader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        let image = Image::from_data(
            [2, 1, 3],
            vec![1.0, 0.0, 0.0, 0.0, 0.0, 2.0],
        )
        .unwrap();
        write_png(&image, &path).unwrap();

        let loaded = load_input_image(&path).unwrap();
        assert_eq!(loaded.dims(), [2, 1, 4]);
        assert_eq!(loaded.pixel(0, 0), Some(&[1.0, 0.0, 0.0, 1.0][..]));
        assert_eq!(loaded.pixel(1, 0), Some(&[0.0, 0.0, 1.0, 1.0][..]));
    }

    #[test]
    fn rejects_two_channel_images() {
        let dir = TempDir::new().unwrap();
        let image = Image::new([1, 1, 2]).unwrap();
        assert!(write_png(&image, &dir.path().join("x.png")).is_err());
    }

    #[test]
    fn summary_lists_dims_and_first_pixel() {
        let mut image = Image::from_data([1, 1, 1], vec![0.5]).unwrap();
        image.set_frame_timing(42);
        assert_eq!(
            summary("abc", &image),
            "id: abc\ndims: 1x1x1\nframe_timing_ns: 42\nfirst_pixel: [0.5000]"
        );
    }
}
