use common::span;

/// Per-box arg-max over the class axis.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedScores {
    /// Best class score per box, `-inf` when the box has no class
    pub max_scores: Vec<f32>,
    /// Index of the best class per box, `None` when there are no classes
    pub class_ids: Vec<Option<usize>>,
}

impl DecodedScores {
    pub fn len(&self) -> usize {
        self.max_scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.max_scores.is_empty()
    }
}

/// Find the highest-scoring class for every box of a flat `[N, C]` score buffer.
///
/// Scans classes left to right with a strict comparison, so the first of
/// several equal maxima wins. NaN scores never win.
pub fn decode_scores(scores: &[f32], num_boxes: usize, num_classes: usize) -> DecodedScores {
    let _s = span!("decode_scores");

    debug_assert!(scores.len() >= num_boxes * num_classes);

    let mut max_scores = Vec::with_capacity(num_boxes);
    let mut class_ids = Vec::with_capacity(num_boxes);

    if num_classes == 0 {
        max_scores.resize(num_boxes, f32::NEG_INFINITY);
        class_ids.resize(num_boxes, None);
        return DecodedScores {
            max_scores,
            class_ids,
        };
    }

    for row in scores.chunks_exact(num_classes).take(num_boxes) {
        let mut max = f32::NEG_INFINITY;
        let mut index = None;
        for (class, &score) in row.iter().enumerate() {
            if score > max {
                max = score;
                index = Some(class);
            }
        }
        max_scores.push(max);
        class_ids.push(index);
    }

    DecodedScores {
        max_scores,
        class_ids,
    }
}
