pub mod decode;
pub mod nms;
pub mod post;

pub use decode::{DecodedScores, decode_scores};
pub use nms::{NmsParams, suppress};
pub use post::{DetectedObject, TransformParams, map_detections};
