use super::{Device, InferenceBackend, InferenceOutput};
use ndarray::{Array, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::{TensorRef, ValueType},
};

pub struct OrtBackend {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
    input_shape: Option<[i64; 4]>,
    /// Provider the session was committed with
    provider: Device,
    /// Device selected for work the pipeline issues outside `session.run`
    active: Device,
}

impl OrtBackend {
    /// Load model with specified execution provider
    pub fn load_model_with_provider(path: &str, provider: Device) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        match provider {
            Device::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = with_cuda(builder)?;
            }
            Device::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(path)?;

        let input = session
            .inputs()
            .first()
            .ok_or_else(|| anyhow::anyhow!("Model {} declares no inputs", path))?;
        let input_name = input.name().to_string();
        let input_shape = match input.dtype() {
            ValueType::Tensor { shape, .. } if shape.len() == 4 => {
                Some([shape[0], shape[1], shape[2], shape[3]])
            }
            _ => None,
        };

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if output_names.len() < 2 {
            anyhow::bail!(
                "Model {} must produce boxes and scores outputs, found {}",
                path,
                output_names.len()
            );
        }

        tracing::info!(
            input = %input_name,
            input_shape = ?input_shape,
            outputs = ?output_names,
            "Model loaded from {}",
            path
        );

        Ok(Self {
            session,
            input_name,
            output_names,
            input_shape,
            provider,
            active: provider,
        })
    }

    pub fn load_model(path: &str) -> anyhow::Result<Self> {
        Self::load_model_with_provider(path, Device::Cpu)
    }

    pub fn provider(&self) -> Device {
        self.provider
    }
}

#[cfg(feature = "cuda")]
fn with_cuda(
    builder: ort::session::builder::SessionBuilder,
) -> anyhow::Result<ort::session::builder::SessionBuilder> {
    Ok(builder.with_execution_providers([
        ort::execution_providers::CUDAExecutionProvider::default()
            .with_device_id(0)
            .build()
            .error_on_failure(),
    ])?)
}

#[cfg(not(feature = "cuda"))]
fn with_cuda(
    _builder: ort::session::builder::SessionBuilder,
) -> anyhow::Result<ort::session::builder::SessionBuilder> {
    anyhow::bail!("CUDA execution provider requested but the `cuda` feature is not enabled")
}

impl InferenceBackend for OrtBackend {
    fn input_shape(&self) -> Option<[i64; 4]> {
        self.input_shape
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let outputs = self.session.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(images.view())?
        ])?;

        let boxes = outputs[self.output_names[0].as_str()].try_extract_array::<f32>()?;
        let scores = outputs[self.output_names[1].as_str()].try_extract_array::<f32>()?;

        Ok(InferenceOutput {
            boxes: boxes.into_owned(),
            scores: scores.into_owned(),
        })
    }

    fn device(&self) -> Device {
        self.active
    }

    fn set_device(&mut self, device: Device) {
        self.active = device;
    }
}
