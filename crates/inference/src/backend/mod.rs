use ndarray::{Array, IxDyn};

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Where a backend runs tensor work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    pub fn is_accelerated(&self) -> bool {
        matches!(self, Device::Cuda)
    }
}

impl std::str::FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(format!(
                "{} is not a supported execution provider. Use either `cpu` or `cuda`.",
                other
            )),
        }
    }
}

pub trait InferenceBackend {
    /// Declared model input shape, `[1, height, width, 3]`.
    ///
    /// `None` when the model does not declare a rank-4 input. Dimensions that
    /// are dynamic are reported as non-positive values.
    fn input_shape(&self) -> Option<[i64; 4]>;

    /// Run inference on an NHWC `[1, H, W, 3]` input
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;

    /// Device currently selected for tensor work issued through this backend
    fn device(&self) -> Device;

    fn set_device(&mut self, device: Device);
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn input_shape(&self) -> Option<[i64; 4]> {
        (**self).input_shape()
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        (**self).infer(images)
    }

    fn device(&self) -> Device {
        (**self).device()
    }

    fn set_device(&mut self, device: Device) {
        (**self).set_device(device)
    }
}

pub struct InferenceOutput {
    pub boxes: ndarray::ArrayD<f32>,  // [1, N, 4] minY, minX, maxY, maxX (normalized 0-1)
    pub scores: ndarray::ArrayD<f32>, // [1, N, num_classes] per-class scores
}

/// Switches a backend to a device for the lifetime of the scope.
///
/// The previous device is restored on drop, including when the scoped work
/// returns early or panics.
pub struct DeviceScope<'a, B: InferenceBackend + ?Sized> {
    backend: &'a mut B,
    previous: Device,
}

impl<'a, B: InferenceBackend + ?Sized> DeviceScope<'a, B> {
    pub fn enter(backend: &'a mut B, device: Device) -> Self {
        let previous = backend.device();
        if previous != device {
            tracing::debug!(from = ?previous, to = ?device, "Switching backend device");
            backend.set_device(device);
        }
        Self { backend, previous }
    }

    pub fn previous(&self) -> Device {
        self.previous
    }
}

impl<B: InferenceBackend + ?Sized> Drop for DeviceScope<'_, B> {
    fn drop(&mut self) {
        if self.backend.device() != self.previous {
            tracing::debug!(to = ?self.previous, "Restoring backend device");
            self.backend.set_device(self.previous);
        }
    }
}
