use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Model input shape is undefined")]
    InputShapeUndefined,

    #[error("Model input shape {shape:?} is not [1, H, W, 3] (NHWC RGB)")]
    UnsupportedInputLayout { shape: [i64; 4] },

    #[error("Class table has {configured} names but the model scores {model} classes")]
    ClassCountMismatch { configured: usize, model: usize },

    #[error("Class id {class_id:?} is outside the class table of {num_classes} names")]
    ClassIdOutOfRange {
        class_id: Option<usize>,
        num_classes: usize,
    },

    #[error("Unexpected {tensor} tensor shape {shape:?}, expected {expected}")]
    OutputShape {
        tensor: &'static str,
        shape: Vec<usize>,
        expected: String,
    },

    #[error("Preprocessing failed: {0}")]
    Preprocess(#[source] BoxError),

    #[error("Model execution failed: {0}")]
    Backend(#[source] BoxError),
}
