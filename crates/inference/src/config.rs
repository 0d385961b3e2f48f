use crate::backend::Device;
use crate::processing::nms::{DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_OUTPUTS};
use anyhow::Context;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub use common::{Environment, LogLevel};

/// Production minimum confidence
pub const DEFAULT_MIN_SCORE: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub environment: Environment,
    pub log_level: LogLevel,
    pub model_path: String,
    pub class_names: Vec<String>,
    pub min_score: f32,
    pub iou_threshold: f32,
    pub max_outputs: usize,
    pub execution_provider: Device,
    pub detect_timeout: Duration,
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();
        let log_level = LogLevel::from_env();

        let model_path =
            env::var("MODEL_PATH").unwrap_or_else(|_| "models/model.onnx".to_string());

        let class_names = match env::var("CLASS_NAMES_PATH") {
            Ok(path) => load_class_names(Path::new(&path))?,
            Err(_) => env::var("CLASS_NAMES")
                .map(|list| parse_class_list(&list))
                .unwrap_or_default(),
        };
        if class_names.is_empty() {
            anyhow::bail!("No class names configured: set CLASS_NAMES_PATH or CLASS_NAMES");
        }

        let min_score = parse_var("MIN_SCORE", DEFAULT_MIN_SCORE)?;
        let iou_threshold = parse_var("IOU_THRESHOLD", DEFAULT_IOU_THRESHOLD)?;
        let max_outputs = parse_var("MAX_OUTPUTS", DEFAULT_MAX_OUTPUTS)?;
        let execution_provider = parse_var("EXECUTION_PROVIDER", Device::Cpu)?;
        let detect_timeout_ms: u64 = parse_var("DETECT_TIMEOUT_MS", 30_000)?;

        validate_unit_interval("MIN_SCORE", min_score)?;
        validate_unit_interval("IOU_THRESHOLD", iou_threshold)?;

        Ok(Self {
            environment,
            log_level,
            model_path,
            class_names,
            min_score,
            iou_threshold,
            max_outputs,
            execution_provider,
            detect_timeout: Duration::from_millis(detect_timeout_ms),
        })
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            log_level: LogLevel::Info,
            model_path: "/models/model.onnx".to_string(),
            class_names: vec!["car".to_string(), "tyre".to_string()],
            min_score: DEFAULT_MIN_SCORE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_outputs: DEFAULT_MAX_OUTPUTS,
            execution_provider: Device::Cpu,
            detect_timeout: Duration::from_secs(30),
        }
    }
}

/// Read one class name per line. Blank lines and `#` comments are skipped.
pub fn load_class_names(path: &Path) -> anyhow::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read class names from {}", path.display()))?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn parse_class_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}

fn validate_unit_interval(name: &str, value: f32) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        anyhow::bail!("{} must lie in [0, 1], got {}", name, value);
    }
    Ok(())
}
