use common::span;

pub const DEFAULT_MAX_OUTPUTS: usize = 100;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsParams {
    /// Upper bound on surviving boxes
    pub max_outputs: usize,
    /// Boxes overlapping an accepted box by more than this are dropped
    pub iou_threshold: f32,
    /// Boxes scoring below this are never considered
    pub score_threshold: f32,
}

impl Default for NmsParams {
    fn default() -> Self {
        Self {
            max_outputs: DEFAULT_MAX_OUTPUTS,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            score_threshold: 0.0,
        }
    }
}

/// Intersection over union of two `[min_y, min_x, max_y, max_x]` boxes.
///
/// Corners may come in either order. Degenerate boxes never overlap anything.
#[inline]
pub fn iou(a: &[f32], b: &[f32]) -> f32 {
    let (a_y1, a_y2) = (a[0].min(a[2]), a[0].max(a[2]));
    let (a_x1, a_x2) = (a[1].min(a[3]), a[1].max(a[3]));
    let (b_y1, b_y2) = (b[0].min(b[2]), b[0].max(b[2]));
    let (b_x1, b_x2) = (b[1].min(b[3]), b[1].max(b[3]));

    let area_a = (a_y2 - a_y1) * (a_x2 - a_x1);
    let area_b = (b_y2 - b_y1) * (b_x2 - b_x1);
    if area_a <= 0.0 || area_b <= 0.0 {
        return 0.0;
    }

    let inter_h = (a_y2.min(b_y2) - a_y1.max(b_y1)).max(0.0);
    let inter_w = (a_x2.min(b_x2) - a_x1.max(b_x1)).max(0.0);
    let intersection = inter_h * inter_w;

    intersection / (area_a + area_b - intersection)
}

/// Greedy non-max suppression.
///
/// `boxes` is a flat `[N, 4]` buffer and `scores` holds one score per box.
/// Returns the indices of surviving boxes, best score first. Equal scores
/// are ordered by ascending box index.
pub fn suppress(boxes: &[f32], scores: &[f32], params: &NmsParams) -> Vec<usize> {
    let _s = span!("suppress");

    debug_assert!(boxes.len() >= scores.len() * 4);

    let mut candidates: Vec<usize> = (0..scores.len())
        .filter(|&i| scores[i] >= params.score_threshold)
        .collect();

    candidates.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

    let mut selected = Vec::with_capacity(params.max_outputs.min(candidates.len()));
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if selected.len() >= params.max_outputs {
            break;
        }
        if suppressed[i] {
            continue;
        }

        let current = candidates[i];
        selected.push(current);
        let current_box = &boxes[current * 4..current * 4 + 4];

        for j in (i + 1)..candidates.len() {
            if suppressed[j] {
                continue;
            }
            let other = candidates[j];
            if iou(current_box, &boxes[other * 4..other * 4 + 4]) > params.iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    tracing::trace!(
        candidates = candidates.len(),
        selected = selected.len(),
        "Suppression finished"
    );

    selected
}
