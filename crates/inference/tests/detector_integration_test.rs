mod common;

use common::{ScriptedBackend, class_names, rgb_image};
use inference::{DetectError, Detector, DetectorConfig, Device};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn load(backend: ScriptedBackend, classes: usize) -> Detector<ScriptedBackend> {
    match Detector::load(backend, DetectorConfig::new(class_names(classes))) {
        Ok(detector) => detector,
        Err(e) => panic!("Detector failed to load: {}", e),
    }
}

fn load_err(backend: ScriptedBackend, classes: usize) -> DetectError {
    match Detector::load(backend, DetectorConfig::new(class_names(classes))) {
        Ok(_) => panic!("Detector loaded but an error was expected"),
        Err(e) => e,
    }
}

/// Full pipeline on a wide 400x200 image
///
/// Tests:
/// - Padding to 400x400 and resize to the model input
/// - Arg-max class selection
/// - Inverse mapping back to original pixels with clamping
#[test]
fn test_wide_image_end_to_end() {
    let backend = ScriptedBackend::new(vec![0.25, 0.5, 0.75, 1.0], vec![0.1, 0.8, 0.05], 3);
    let mut detector = load(backend, 3);

    let detections = detector.detect(&rgb_image(400, 200), 400, 200, 0.3).unwrap();

    assert_eq!(detections.objects.len(), 1);
    let det = &detections.objects[0];
    assert_eq!(det.x, 200.0);
    assert_eq!(det.y, 100.0);
    assert_eq!(det.width, 200.0);
    assert_eq!(det.height, 100.0);
    assert_eq!(det.score, 0.8);
    assert_eq!(det.class_id, 1);
    assert_eq!(det.class_name, "class_1");

    // Warm-up plus one detection, both at the model resolution
    assert_eq!(detector.backend().calls, 2);
    assert!(
        detector
            .backend()
            .seen_shapes
            .iter()
            .all(|s| s == &vec![1, 320, 320, 3])
    );
}

#[test]
fn test_detect_image_matches_raw_pixels() {
    let backend = ScriptedBackend::new(vec![0.25, 0.5, 0.75, 1.0], vec![0.1, 0.8, 0.05], 3);
    let mut detector = load(backend, 3);

    let image = image::RgbImage::from_pixel(400, 200, image::Rgb([10, 20, 30]));
    let from_image = detector.detect_image(&image, 0.3).unwrap();
    let from_raw = detector.detect(image.as_raw(), 400, 200, 0.3).unwrap();

    assert_eq!(from_image.objects, from_raw.objects);
}

/// Two boxes at 95% IoU collapse to the better one
#[test]
fn test_overlapping_boxes_are_suppressed() {
    let boxes = vec![
        0.0, 0.0, 1.0, 1.0, //
        0.0, 0.0, 1.0, 0.95,
    ];
    let scores = vec![
        0.7, 0.0, //
        0.0, 0.9,
    ];
    let mut detector = load(ScriptedBackend::new(boxes, scores, 2), 2);

    let detections = detector.detect(&rgb_image(64, 64), 64, 64, 0.3).unwrap();

    assert_eq!(detections.objects.len(), 1);
    assert_eq!(detections.objects[0].score, 0.9);
    assert_eq!(detections.objects[0].class_name, "class_1");
}

#[test]
fn test_results_ordered_by_descending_score() {
    let boxes = vec![
        0.0, 0.0, 0.1, 0.1, //
        0.3, 0.3, 0.4, 0.4, //
        0.6, 0.6, 0.7, 0.7,
    ];
    let scores = vec![0.4, 0.95, 0.6];
    let mut detector = load(ScriptedBackend::new(boxes, scores, 1), 1);

    let detections = detector.detect(&rgb_image(100, 100), 100, 100, 0.3).unwrap();

    let scores: Vec<f32> = detections.objects.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.95, 0.6, 0.4]);
}

#[test]
fn test_min_score_filters_everything() {
    let backend = ScriptedBackend::new(vec![0.1, 0.1, 0.5, 0.5], vec![0.2, 0.1], 2);
    let mut detector = load(backend, 2);

    let detections = detector.detect(&rgb_image(50, 80), 50, 80, 0.3).unwrap();
    assert!(detections.objects.is_empty());

    let detections = detector.detect(&rgb_image(50, 80), 50, 80, 0.2).unwrap();
    assert_eq!(detections.objects.len(), 1, "Threshold is inclusive");
}

#[test]
fn test_no_boxes_is_empty_result() {
    let mut detector = load(ScriptedBackend::new(vec![], vec![], 4), 4);

    let detections = detector.detect(&rgb_image(32, 32), 32, 32, 0.0).unwrap();

    assert!(detections.objects.is_empty());
}

#[test]
fn test_undefined_input_shape() {
    let mut backend = ScriptedBackend::new(vec![], vec![], 1);
    backend.input_shape = None;

    let err = load_err(backend, 1);
    assert!(matches!(err, DetectError::InputShapeUndefined));
}

/// Channels-first models are refused before any inference runs
#[test]
fn test_channels_first_model_rejected() {
    let mut backend = ScriptedBackend::new(vec![], vec![], 1);
    backend.input_shape = Some([1, 3, 320, 320]);

    let err = load_err(backend, 1);
    assert!(
        matches!(err, DetectError::UnsupportedInputLayout { shape: [1, 3, 320, 320] }),
        "{}",
        err
    );
}

#[test]
fn test_dynamic_input_dims_fall_back_to_default() {
    let mut backend = ScriptedBackend::new(vec![], vec![], 1);
    backend.input_shape = Some([-1, -1, -1, 3]);

    let mut detector = load(backend, 1);
    assert_eq!(detector.input_size(), (320, 320));

    detector.detect(&rgb_image(10, 20), 10, 20, 0.3).unwrap();
    assert_eq!(detector.backend().seen_shapes[1], vec![1, 320, 320, 3]);
}

#[test]
fn test_non_square_model_input() {
    let mut backend = ScriptedBackend::new(vec![], vec![], 1);
    backend.input_shape = Some([1, 256, 512, 3]);

    let mut detector = load(backend, 1);
    assert_eq!(detector.input_size(), (512, 256));

    detector.detect(&rgb_image(30, 40), 30, 40, 0.3).unwrap();
    assert_eq!(detector.backend().seen_shapes[1], vec![1, 256, 512, 3]);
}

#[test]
fn test_class_count_mismatch_at_load() {
    let backend = ScriptedBackend::new(vec![0.0, 0.0, 0.5, 0.5], vec![0.1, 0.2, 0.3], 3);

    let err = load_err(backend, 2);
    assert!(matches!(
        err,
        DetectError::ClassCountMismatch {
            configured: 2,
            model: 3
        }
    ));
}

#[test]
fn test_warm_up_failure_fails_load() {
    let mut backend = ScriptedBackend::new(vec![], vec![], 1);
    backend.fail_on_call = Some(0);

    let err = load_err(backend, 1);
    assert!(matches!(err, DetectError::Backend(_)));
    assert!(err.to_string().contains("scripted failure"), "{}", err);
}

#[test]
fn test_malformed_boxes_output() {
    let mut backend = ScriptedBackend::new(vec![0.0, 0.0, 0.5, 0.5], vec![0.9], 1);
    backend.boxes_shape = Some(vec![1, 4]);

    let err = load_err(backend, 1);
    assert!(matches!(err, DetectError::OutputShape { tensor: "boxes", .. }));
}

#[test]
fn test_preprocess_error_is_reported() {
    let mut detector = load(ScriptedBackend::new(vec![], vec![], 1), 1);

    let result = detector.detect(&[0u8; 10], 4, 4, 0.3);

    assert!(matches!(result, Err(DetectError::Preprocess(_))));
    assert_eq!(detector.backend().calls, 1, "Backend must not run on bad input");
}

/// Suppression runs with the backend switched to CPU and the previous
/// device is restored afterwards.
#[test]
fn test_device_restored_after_detection() {
    let mut backend = ScriptedBackend::new(vec![0.1, 0.1, 0.4, 0.4], vec![0.9], 1);
    backend.device = Device::Cuda;
    let mut detector = load(backend, 1);

    detector.detect(&rgb_image(20, 20), 20, 20, 0.3).unwrap();

    assert_eq!(detector.backend().switches, vec![Device::Cpu, Device::Cuda]);
    assert_eq!(detector.backend().device, Device::Cuda);
}

#[test]
fn test_backend_failure_leaves_device_untouched() {
    let mut backend = ScriptedBackend::new(vec![0.1, 0.1, 0.4, 0.4], vec![0.9], 1);
    backend.device = Device::Cuda;
    backend.fail_on_call = Some(1);
    let mut detector = load(backend, 1);

    let result = detector.detect(&rgb_image(20, 20), 20, 20, 0.3);

    assert!(matches!(result, Err(DetectError::Backend(_))));
    assert!(detector.backend().switches.is_empty());
    assert_eq!(detector.backend().device, Device::Cuda);

    // The detector stays usable after a failed call
    let detections = detector.detect(&rgb_image(20, 20), 20, 20, 0.3).unwrap();
    assert_eq!(detections.objects.len(), 1);
}

#[test]
fn test_cpu_backend_is_never_switched() {
    let mut detector = load(
        ScriptedBackend::new(vec![0.1, 0.1, 0.4, 0.4], vec![0.9], 1),
        1,
    );

    detector.detect(&rgb_image(20, 20), 20, 20, 0.3).unwrap();

    assert!(detector.backend().switches.is_empty());
}

#[test]
fn test_inference_time_is_measured() {
    let mut backend = ScriptedBackend::new(vec![0.1, 0.1, 0.4, 0.4], vec![0.9], 1);
    backend.latency = Duration::from_millis(5);
    let mut detector = load(backend, 1);

    let detections = detector.detect(&rgb_image(20, 20), 20, 20, 0.3).unwrap();

    assert!(
        detections.inference_time >= Duration::from_millis(5),
        "inference_time = {:?}",
        detections.inference_time
    );
}

/// Calls from several threads serialize on a shared detector
#[test]
fn test_shared_detector_across_threads() {
    let backend = ScriptedBackend::new(vec![0.25, 0.5, 0.75, 1.0], vec![0.1, 0.8, 0.05], 3);
    let detector = Arc::new(Mutex::new(load(backend, 3)));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let detector = Arc::clone(&detector);
            thread::spawn(move || {
                let mut detector = detector.lock().unwrap();
                detector.detect(&rgb_image(400, 200), 400, 200, 0.3).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let detections = handle.join().unwrap();
        assert_eq!(detections.objects[0].x, 200.0);
    }

    assert_eq!(detector.lock().unwrap().backend().calls, 5);
}
