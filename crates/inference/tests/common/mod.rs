#![allow(dead_code)]

use inference::{Device, InferenceBackend, InferenceOutput};
use ndarray::{Array, IxDyn};
use std::time::Duration;

/// In-memory backend that replays one fixed model output.
///
/// Every call is recorded so tests can inspect what the detector asked for
/// after handing ownership of the backend over.
pub struct ScriptedBackend {
    pub input_shape: Option<[i64; 4]>,
    pub boxes: Vec<f32>,
    pub scores: Vec<f32>,
    pub num_classes: usize,
    /// Replaces the `[1, N, 4]` boxes shape when set
    pub boxes_shape: Option<Vec<usize>>,
    pub device: Device,
    pub switches: Vec<Device>,
    pub calls: usize,
    /// Zero-based call that fails; call 0 is the warm-up
    pub fail_on_call: Option<usize>,
    pub latency: Duration,
    pub seen_shapes: Vec<Vec<usize>>,
}

impl ScriptedBackend {
    pub fn new(boxes: Vec<f32>, scores: Vec<f32>, num_classes: usize) -> Self {
        Self {
            input_shape: Some([1, 320, 320, 3]),
            boxes,
            scores,
            num_classes,
            boxes_shape: None,
            device: Device::Cpu,
            switches: Vec::new(),
            calls: 0,
            fail_on_call: None,
            latency: Duration::ZERO,
            seen_shapes: Vec::new(),
        }
    }

    pub fn num_boxes(&self) -> usize {
        self.boxes.len() / 4
    }
}

impl InferenceBackend for ScriptedBackend {
    fn input_shape(&self) -> Option<[i64; 4]> {
        self.input_shape
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let call = self.calls;
        self.calls += 1;
        self.seen_shapes.push(images.shape().to_vec());

        if self.fail_on_call == Some(call) {
            anyhow::bail!("scripted failure on call {}", call);
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let n = self.num_boxes();
        let boxes_shape = self.boxes_shape.clone().unwrap_or_else(|| vec![1, n, 4]);
        Ok(InferenceOutput {
            boxes: Array::from_shape_vec(IxDyn(&boxes_shape), self.boxes.clone())?,
            scores: Array::from_shape_vec(IxDyn(&[1, n, self.num_classes]), self.scores.clone())?,
        })
    }

    fn device(&self) -> Device {
        self.device
    }

    fn set_device(&mut self, device: Device) {
        self.switches.push(device);
        self.device = device;
    }
}

pub fn class_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("class_{}", i)).collect()
}

/// Solid RGB image of the given size
pub fn rgb_image(width: u32, height: u32) -> Vec<u8> {
    vec![128u8; (width * height * 3) as usize]
}
