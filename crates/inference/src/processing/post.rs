use crate::error::DetectError;
use crate::processing::decode::DecodedScores;
use common::span;
use preprocess::PreprocessResult;
use serde::Serialize;

/// Parameters that undo the pad-to-square transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub orig_width: f32,
    pub orig_height: f32,
    pub x_ratio: f32,
    pub y_ratio: f32,
}

impl From<&PreprocessResult> for TransformParams {
    fn from(result: &PreprocessResult) -> Self {
        Self {
            orig_width: result.orig_width as f32,
            orig_height: result.orig_height as f32,
            x_ratio: result.x_ratio,
            y_ratio: result.y_ratio,
        }
    }
}

/// A detection in original-image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
    pub class_id: usize,
    #[serde(rename = "class")]
    pub class_name: String,
}

/// Map surviving boxes back to the source image and attach class names.
///
/// `boxes` is the flat `[N, 4]` model output in `[min_y, min_x, max_y, max_x]`
/// order, normalized to the padded square. Output order follows `indices`.
pub fn map_detections(
    indices: &[usize],
    boxes: &[f32],
    decoded: &DecodedScores,
    class_names: &[String],
    transform: &TransformParams,
) -> Result<Vec<DetectedObject>, DetectError> {
    let _s = span!("map_detections");

    let TransformParams {
        orig_width: width,
        orig_height: height,
        x_ratio,
        y_ratio,
    } = *transform;

    indices
        .iter()
        .map(|&i| {
            let (class_id, class_name) = decoded.class_ids[i]
                .and_then(|id| class_names.get(id).map(|name| (id, name)))
                .ok_or(DetectError::ClassIdOutOfRange {
                    class_id: decoded.class_ids[i],
                    num_classes: class_names.len(),
                })?;

            let b = &boxes[i * 4..i * 4 + 4];
            let min_y = to_pixels(b[0], height, y_ratio);
            let min_x = to_pixels(b[1], width, x_ratio);
            let max_y = to_pixels(b[2], height, y_ratio);
            let max_x = to_pixels(b[3], width, x_ratio);

            Ok(DetectedObject {
                x: min_x,
                y: min_y,
                width: (max_x - min_x).max(0.0),
                height: (max_y - min_y).max(0.0),
                score: decoded.max_scores[i],
                class_id,
                class_name: class_name.clone(),
            })
        })
        .collect()
}

/// Scale a normalized coordinate to pixels inside `[0, extent]`. NaN maps to 0.
#[inline]
fn to_pixels(value: f32, extent: f32, ratio: f32) -> f32 {
    let pixels = value * extent * ratio;
    if pixels.is_nan() {
        0.0
    } else {
        pixels.clamp(0.0, extent)
    }
}
