// tests/pipeline_flow.rs
//
// End-to-end run over synthetic frames: calibrate, add ROIs, feed a few
// seconds of drifting froth texture, and read the per-second aggregates
// back out the way a GUI or exporter would.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use froth_motion::{CalibrationParams, FramePipeline, GrayFrame, RoiRect, SecondBucket};

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("froth_motion=debug")
        .with_test_writer()
        .try_init();
}

fn at(secs: u64, millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_millis(millis)
}

fn texel(x: usize, y: usize) -> u8 {
    let h = (x as u32)
        .wrapping_mul(2_654_435_761)
        .wrapping_add((y as u32).wrapping_mul(97_003));
    (h ^ (h >> 13)) as u8
}

/// 128x64 speckle frame whose content has drifted `shift_x` pixels to the
/// right since the zero frame.
fn drifting_frame(shift_x: isize) -> GrayFrame {
    let (width, height) = (128usize, 64usize);
    let mut data = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let sx = (x as isize - shift_x).rem_euclid(width as isize) as usize;
            data[y * width + x] = texel(sx, y);
        }
    }
    GrayFrame::new(data, width, height)
}

#[test]
fn full_session_produces_per_second_velocity_series() {
    init_logs();

    let mut pipeline = FramePipeline::new();
    // 20 px per 20 mm: 1 mm per pixel, monitoring along +x.
    pipeline.set_calibration(20.0, 0.0).unwrap();

    let roi = pipeline.add_roi(RoiRect::new(8, 8, 48, 48));
    // This one never fits the 128x64 frames and must be skipped each call.
    pipeline.add_roi(RoiRect::new(100, 40, 64, 64));

    // 1 px of rightward drift per frame, three frames per second for three
    // seconds. The first frame only seeds the estimator.
    let mut shift = 0isize;
    for sec in 10..13u64 {
        for tick in 0..3u64 {
            let summary = pipeline
                .process_frame_at(&drifting_frame(shift), at(sec, tick * 330))
                .expect("well-formed frame");
            assert_eq!(summary.rois_processed, 1);
            assert_eq!(summary.rois_skipped, 1);
            shift += 1;
        }
    }

    assert_eq!(pipeline.frame_count(), 9);

    let tracker = &pipeline.trackers()[roi];
    // 8 samples: the seed frame yields none.
    assert_eq!(tracker.samples().len(), 8);

    // Seconds 10 and 11 are finalized; 12 is still open.
    let aggregates = tracker.aggregates();
    assert_eq!(aggregates.len(), 2);
    assert_eq!(aggregates[0].bucket, SecondBucket::from_secs(10));
    assert_eq!(aggregates[1].bucket, SecondBucket::from_secs(11));
    // Second 10 saw two samples of ~1 mm, second 11 three.
    assert!((aggregates[0].velocity_mm - 2.0).abs() < 0.3, "{}", aggregates[0].velocity_mm);
    assert!((aggregates[1].velocity_mm - 3.0).abs() < 0.3, "{}", aggregates[1].velocity_mm);

    let running = tracker.running_velocity().expect("second 12 open");
    assert!((running - 3.0).abs() < 0.3, "{}", running);

    // Session end: the open bucket closes exactly once.
    let finals = pipeline.flush();
    assert_eq!(finals.len(), 2);
    let last = finals[0].expect("tracked ROI had an open bucket");
    assert_eq!(last.bucket, SecondBucket::from_secs(12));
    assert!((last.velocity_mm - running).abs() < 1e-6);
    assert!(finals[1].is_none());

    let tracker = &pipeline.trackers()[roi];
    assert_eq!(tracker.aggregates().len(), 3);
    assert!(tracker.running_velocity().is_none());

    let metrics = pipeline.metrics().summary();
    assert_eq!(metrics.total_frames, 9);
    assert_eq!(metrics.rois_skipped, 9);
    assert_eq!(metrics.samples_produced, 8);
    assert_eq!(metrics.buckets_finalized, 2);
    assert_eq!(metrics.frames_rejected, 0);
}

#[test]
fn recalibration_applies_to_new_trackers_only() {
    init_logs();

    let mut pipeline = FramePipeline::new();
    pipeline.set_calibration(20.0, 0.0).unwrap();
    pipeline.add_roi(RoiRect::new(0, 0, 48, 48));

    // Doubled scale for trackers added after this point.
    pipeline.set_calibration(10.0, 0.0).unwrap();
    pipeline.add_roi(RoiRect::new(64, 0, 48, 48));

    pipeline.process_frame_at(&drifting_frame(0), at(1, 0));
    pipeline.process_frame_at(&drifting_frame(1), at(1, 330));

    let old_delta = pipeline.trackers()[0].last_calibrated_delta().unwrap();
    let new_delta = pipeline.trackers()[1].last_calibrated_delta().unwrap();
    assert!((old_delta - 1.0).abs() < 0.3, "{}", old_delta);
    assert!((new_delta - 2.0).abs() < 0.6, "{}", new_delta);
}

#[test]
fn upward_calibration_signs_match_screen_coordinates() {
    // Monitoring direction -90° points "up" on screen; a displacement of
    // (3, -4) px at 1 mm/px projects to -4 mm.
    let cal = CalibrationParams::new(20.0, -90.0);
    let mm = cal.project((3.0, -4.0));
    assert!((mm + 4.0).abs() < 1e-5, "{}", mm);
}
