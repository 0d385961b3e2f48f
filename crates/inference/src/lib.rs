pub mod backend;
pub mod config;
pub mod detector;
pub mod error;
pub mod logging;
pub mod processing;

// Re-export commonly used types for convenience
pub use backend::{Device, DeviceScope, InferenceBackend, InferenceOutput};
pub use config::InferenceConfig;
pub use detector::{Detections, Detector, DetectorConfig};
pub use error::DetectError;
pub use processing::DetectedObject;
