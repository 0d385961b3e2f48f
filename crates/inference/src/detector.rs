use crate::{
    backend::{Device, DeviceScope, InferenceBackend, InferenceOutput},
    config::InferenceConfig,
    error::DetectError,
    processing::{
        DetectedObject, NmsParams, TransformParams, decode_scores, map_detections, suppress,
    },
};
use ndarray::{Array, IxDyn};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use preprocess::{CpuPreProcessor, DEFAULT_INPUT_SIZE, Preprocess};
use std::time::{Duration, Instant};

/// Load-time settings for a [`Detector`].
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// One name per model class, indexed by class id
    pub class_names: Vec<String>,
    pub iou_threshold: f32,
    pub max_outputs: usize,
}

impl DetectorConfig {
    pub fn new(class_names: Vec<String>) -> Self {
        let defaults = NmsParams::default();
        Self {
            class_names,
            iou_threshold: defaults.iou_threshold,
            max_outputs: defaults.max_outputs,
        }
    }
}

impl From<&InferenceConfig> for DetectorConfig {
    fn from(config: &InferenceConfig) -> Self {
        Self {
            class_names: config.class_names.clone(),
            iou_threshold: config.iou_threshold,
            max_outputs: config.max_outputs,
        }
    }
}

/// Result of one detection call.
#[derive(Debug, Clone)]
pub struct Detections {
    /// Detections ordered by descending score
    pub objects: Vec<DetectedObject>,
    /// Wall-clock time spent inside the model backend
    pub inference_time: Duration,
}

struct Metrics {
    execution_duration: Histogram<f64>,
    detections: Counter<u64>,
    failures: Counter<u64>,
}

fn init_metrics(meter_name: &'static str) -> Metrics {
    let meter = global::meter(meter_name);
    let latency_buckets = [
        0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0,
    ];
    let execution_duration: Histogram<f64> = meter
        .f64_histogram("model_execution_duration_seconds")
        .with_description("Time spent executing the model for a single image")
        .with_unit("s")
        .with_boundaries(latency_buckets.to_vec())
        .build();
    let detections: Counter<u64> = meter
        .u64_counter("detections_total")
        .with_description("Total detections produced")
        .build();
    let failures: Counter<u64> = meter
        .u64_counter("detect_failures_total")
        .with_description("Total detection calls that returned an error")
        .build();

    Metrics {
        execution_duration,
        detections,
        failures,
    }
}

/// Single-image detector: preprocess, run the model, decode, suppress, map back.
///
/// `detect` takes `&mut self`, so calls against one detector never overlap.
/// Share a detector across threads behind a mutex.
pub struct Detector<B: InferenceBackend> {
    backend: B,
    preprocessor: CpuPreProcessor,
    class_names: Vec<String>,
    nms: NmsParams,
    metrics: Metrics,
}

impl<B: InferenceBackend> Detector<B> {
    /// Validate the backend against the class table and warm it up.
    pub fn load(mut backend: B, config: DetectorConfig) -> Result<Self, DetectError> {
        let shape = backend
            .input_shape()
            .ok_or(DetectError::InputShapeUndefined)?;
        let input_size = input_size_from_shape(shape)?;

        tracing::info!(
            input_shape = ?shape,
            input_width = input_size.0,
            input_height = input_size.1,
            num_classes = config.class_names.len(),
            "Warming up model"
        );

        let warmup = Array::<f32, IxDyn>::zeros(IxDyn(&[
            1,
            input_size.1 as usize,
            input_size.0 as usize,
            3,
        ]));
        let output = backend
            .infer(&warmup)
            .map_err(|e| DetectError::Backend(e.into()))?;

        let (num_boxes, num_classes) = output_dims(&output)?;
        if num_classes != config.class_names.len() {
            return Err(DetectError::ClassCountMismatch {
                configured: config.class_names.len(),
                model: num_classes,
            });
        }

        tracing::info!(num_boxes, num_classes, "Model ready");

        Ok(Self {
            backend,
            preprocessor: CpuPreProcessor::new(input_size),
            class_names: config.class_names,
            nms: NmsParams {
                max_outputs: config.max_outputs,
                iou_threshold: config.iou_threshold,
                ..NmsParams::default()
            },
            metrics: init_metrics("inference"),
        })
    }

    /// Model input resolution `(width, height)`
    pub fn input_size(&self) -> (u32, u32) {
        self.preprocessor.input_size()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Detect objects in an RGB image.
    pub fn detect_image(
        &mut self,
        image: &image::RgbImage,
        min_score: f32,
    ) -> Result<Detections, DetectError> {
        self.detect(image.as_raw(), image.width(), image.height(), min_score)
    }

    /// Detect objects in an RGB HWC pixel buffer.
    ///
    /// Candidates scoring below `min_score` are discarded before suppression.
    pub fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        min_score: f32,
    ) -> Result<Detections, DetectError> {
        let _span = tracing::info_span!("detect", width, height, min_score).entered();

        let result = self.run_pipeline(pixels, width, height, min_score);
        match &result {
            Ok(detections) => {
                self.metrics
                    .detections
                    .add(detections.objects.len() as u64, &[]);
                tracing::debug!(
                    detections = detections.objects.len(),
                    inference_ms = detections.inference_time.as_secs_f64() * 1000.0,
                    "Image processed"
                );
            }
            Err(e) => {
                self.metrics.failures.add(1, &[]);
                tracing::error!(error = %e, "Detection failed");
            }
        }
        result
    }

    fn run_pipeline(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        min_score: f32,
    ) -> Result<Detections, DetectError> {
        let preprocessed = self
            .preprocessor
            .preprocess(pixels, width, height)
            .map_err(|e| DetectError::Preprocess(e.into()))?;

        let start = Instant::now();
        let output = {
            let _infer_span = tracing::info_span!("model_inference").entered();
            self.backend
                .infer(&preprocessed.tensor)
                .map_err(|e| DetectError::Backend(e.into()))?
        };
        let inference_time = start.elapsed();
        self.metrics
            .execution_duration
            .record(inference_time.as_secs_f64(), &[]);

        let (num_boxes, num_classes) = output_dims(&output)?;
        if num_classes != self.class_names.len() {
            return Err(DetectError::ClassCountMismatch {
                configured: self.class_names.len(),
                model: num_classes,
            });
        }

        let boxes = contiguous(&output.boxes, "boxes")?;
        let scores = contiguous(&output.scores, "scores")?;

        let decoded = decode_scores(scores, num_boxes, num_classes);

        let params = NmsParams {
            score_threshold: min_score,
            ..self.nms
        };
        let indices = {
            let _cpu = DeviceScope::enter(&mut self.backend, Device::Cpu);
            suppress(boxes, &decoded.max_scores, &params)
        };

        let objects = map_detections(
            &indices,
            boxes,
            &decoded,
            &self.class_names,
            &TransformParams::from(&preprocessed),
        )?;

        Ok(Detections {
            objects,
            inference_time,
        })
    }
}

/// `[1, H, W, 3]` to `(width, height)`, substituting the default for dynamic dims.
///
/// A dynamic channel dim is taken as 3. Any other channel count, such as the
/// 3 in the height slot of an NCHW model, is rejected.
fn input_size_from_shape(shape: [i64; 4]) -> Result<(u32, u32), DetectError> {
    if shape[3] > 0 && shape[3] != 3 {
        return Err(DetectError::UnsupportedInputLayout { shape });
    }

    let dim = |value: i64, default: u32| {
        if value > 0 {
            u32::try_from(value).unwrap_or(default)
        } else {
            default
        }
    };
    Ok((
        dim(shape[2], DEFAULT_INPUT_SIZE.0),
        dim(shape[1], DEFAULT_INPUT_SIZE.1),
    ))
}

/// Check `boxes: [1, N, 4]` and `scores: [1, N, C]`, returning `(N, C)`.
fn output_dims(output: &InferenceOutput) -> Result<(usize, usize), DetectError> {
    let boxes = output.boxes.shape();
    if boxes.len() != 3 || boxes[0] != 1 || boxes[2] != 4 {
        return Err(DetectError::OutputShape {
            tensor: "boxes",
            shape: boxes.to_vec(),
            expected: "[1, N, 4]".to_string(),
        });
    }

    let scores = output.scores.shape();
    if scores.len() != 3 || scores[0] != 1 || scores[1] != boxes[1] {
        return Err(DetectError::OutputShape {
            tensor: "scores",
            shape: scores.to_vec(),
            expected: format!("[1, {}, C]", boxes[1]),
        });
    }

    Ok((boxes[1], scores[2]))
}

fn contiguous<'a>(
    array: &'a ndarray::ArrayD<f32>,
    tensor: &'static str,
) -> Result<&'a [f32], DetectError> {
    array.as_slice().ok_or_else(|| DetectError::OutputShape {
        tensor,
        shape: array.shape().to_vec(),
        expected: "standard layout".to_string(),
    })
}
