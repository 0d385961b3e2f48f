use crate::config::DEFAULT_INPUT_SIZE;
use crate::{Preprocess, PreprocessResult};
use common::span;
use fast_image_resize::{
    PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{CroppedImageMut, Image, ImageRef},
};
use ndarray::{Array, IxDyn};

/// Pads images to a square on the bottom/right, then resizes to the model input.
///
/// Padding never shifts the origin, so a normalized box coordinate times
/// `padded_size` is directly a pixel position in the source image.
///
/// The padded square is never materialized. The source is resized straight
/// into the top-left region of the model input that the image would cover,
/// and the rest of the zero-filled input is the padding.
pub struct CpuPreProcessor {
    pub input_size: (u32, u32),
    resizer: Resizer,
}

impl CpuPreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            resizer: Resizer::new(),
        }
    }

    fn pad_and_resize(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        padded_size: u32,
    ) -> anyhow::Result<Image<'static>> {
        let _s = span!("pad_and_resize");

        let (input_width, input_height) = self.input_size;
        let content_width = scaled_extent(width, padded_size, input_width);
        let content_height = scaled_extent(height, padded_size, input_height);

        // Zero-filled, so everything outside the content region is padding
        let mut resized = Image::new(input_width, input_height, PixelType::U8x3);

        if content_width == 0 || content_height == 0 {
            tracing::debug!(width, height, "Image collapses to padding at model resolution");
            return Ok(resized);
        }

        let src = ImageRef::new(width, height, pixels, PixelType::U8x3)?;
        {
            let mut content =
                CroppedImageMut::new(&mut resized, 0, 0, content_width, content_height)?;
            self.resizer.resize(
                &src,
                &mut content,
                &ResizeOptions::new().resize_alg(ResizeAlg::Nearest),
            )?;
        }

        Ok(resized)
    }

    fn normalize(image: &Image) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span!("normalize");

        let width = image.width() as usize;
        let height = image.height() as usize;

        let output: Vec<f32> = image
            .buffer()
            .iter()
            .map(|&value| value as f32 / 255.0)
            .collect();

        Ok(Array::from_shape_vec(
            IxDyn(&[1, height, width, 3]),
            output,
        )?)
    }
}

/// Pixels `extent` covers along one axis once the `padded_size` square is
/// scaled to `target`, rounded to the nearest pixel.
fn scaled_extent(extent: u32, padded_size: u32, target: u32) -> u32 {
    let scaled = (extent as u64 * target as u64 + padded_size as u64 / 2) / padded_size as u64;
    scaled.min(target as u64) as u32
}

impl Preprocess for CpuPreProcessor {
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        let _s = span!("preprocess");

        tracing::trace!(
            width,
            height,
            pixel_bytes = pixels.len(),
            "Preprocessing image dimensions"
        );

        if width == 0 || height == 0 {
            anyhow::bail!("Image must be at least 1x1, got {}x{}", width, height);
        }

        let expected_size = width as usize * height as usize * 3;
        if pixels.len() != expected_size {
            anyhow::bail!(
                "Buffer size mismatch: expected {}, got {} bytes",
                expected_size,
                pixels.len()
            );
        }

        let padded_size = width.max(height);
        let resized = self.pad_and_resize(pixels, width, height, padded_size)?;
        let tensor = Self::normalize(&resized)?;

        Ok(PreprocessResult {
            tensor,
            orig_width: width,
            orig_height: height,
            x_ratio: padded_size as f32 / width as f32,
            y_ratio: padded_size as f32 / height as f32,
        })
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }
}

impl Default for CpuPreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}
