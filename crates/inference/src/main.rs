use anyhow::Context;
use clap::Parser;
use inference::{
    Detections, Detector, DetectorConfig, InferenceConfig, logging::setup_logging,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::Instrument;

#[cfg(feature = "ort-backend")]
use inference::backend::ort::OrtBackend as Backend;

#[cfg(not(feature = "ort-backend"))]
compile_error!("The 'ort-backend' feature must be enabled to build the inference binary");

/// Detect objects in images with an ONNX model
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Minimum class score, overrides MIN_SCORE
    #[arg(long)]
    min_score: Option<f32>,

    /// Per-image timeout in milliseconds, overrides DETECT_TIMEOUT_MS
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Images to process
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(Serialize)]
struct ImageReport<'a> {
    image: String,
    inference_ms: f64,
    detections: &'a [inference::DetectedObject],
}

type SharedDetector = Arc<Mutex<Detector<Backend>>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = InferenceConfig::from_env()?;

    setup_logging(&config);

    tracing::info!(
        config = ?config,
        "Loaded configuration"
    );

    let min_score = args.min_score.unwrap_or(config.min_score);
    if !(0.0..=1.0).contains(&min_score) {
        anyhow::bail!("--min-score must lie in [0, 1], got {}", min_score);
    }
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(config.detect_timeout);

    tracing::info!("Loading inference model");
    let backend = Backend::load_model_with_provider(&config.model_path, config.execution_provider)?;
    let detector = Detector::load(backend, DetectorConfig::from(&config))?;
    tracing::info!("Model loaded successfully");

    let detector: SharedDetector = Arc::new(Mutex::new(detector));

    let mut failures = 0usize;
    for path in &args.images {
        let span = tracing::info_span!("image", path = %path.display());

        match detect_file(&detector, path.clone(), min_score, timeout)
            .instrument(span)
            .await
        {
            Ok(detections) => {
                let report = ImageReport {
                    image: path.display().to_string(),
                    inference_ms: detections.inference_time.as_secs_f64() * 1000.0,
                    detections: &detections.objects,
                };
                println!("{}", serde_json::to_string(&report)?);
            }
            Err(e) => {
                failures += 1;
                tracing::error!(path = %path.display(), error = ?e, "Failed to process image");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} images failed", failures, args.images.len());
    }

    Ok(())
}

/// Decode and detect one image on the blocking pool.
///
/// The detector lock is held by the blocking task, so a timed-out call keeps
/// the detector busy until it finishes and the next image waits for it.
async fn detect_file(
    detector: &SharedDetector,
    path: PathBuf,
    min_score: f32,
    timeout: Duration,
) -> anyhow::Result<Detections> {
    let detector = Arc::clone(detector);
    let span = tracing::Span::current();
    let task = tokio::task::spawn_blocking(move || -> anyhow::Result<Detections> {
        let _entered = span.enter();
        let image = image::open(&path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .to_rgb8();

        let mut detector = detector
            .lock()
            .map_err(|_| anyhow::anyhow!("Detector lock poisoned"))?;
        Ok(detector.detect_image(&image, min_score)?)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined.context("Detection task panicked")?,
        Err(_) => anyhow::bail!("Detection timed out after {:?}", timeout),
    }
}
