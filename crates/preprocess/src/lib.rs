pub mod config;
pub mod cpu;

use ndarray::{Array, IxDyn};

pub use config::DEFAULT_INPUT_SIZE;
pub use cpu::CpuPreProcessor;

/// Model-ready tensor plus what is needed to map boxes back to the source image.
#[derive(Debug)]
pub struct PreprocessResult {
    /// NHWC tensor `[1, input_height, input_width, 3]` with values in `[0, 1]`
    pub tensor: Array<f32, IxDyn>,
    /// Width of the source image in pixels
    pub orig_width: u32,
    /// Height of the source image in pixels
    pub orig_height: u32,
    /// `padded_size / orig_width`, always >= 1.0
    pub x_ratio: f32,
    /// `padded_size / orig_height`, always >= 1.0
    pub y_ratio: f32,
}

impl PreprocessResult {
    /// Side of the square the source image was padded to.
    pub fn padded_size(&self) -> u32 {
        self.orig_width.max(self.orig_height)
    }
}

/// Trait for image preprocessing implementations
pub trait Preprocess {
    /// Preprocess an image for inference
    ///
    /// # Arguments
    /// * `pixels` - RGB pixel data in HWC format
    /// * `width` - Image width
    /// * `height` - Image height
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult>;

    /// Get the input size `(width, height)` this preprocessor targets
    fn input_size(&self) -> (u32, u32);
}
