mod common;

use common::{config, faces, frame_color, video_info, ScriptedSource};
use image::Rgb;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use vidscan::compose::PLACEHOLDER_FILL;
use vidscan::{GlobalConfig, ProgressPhase, ScanConfig, ScanCreator};

fn fixed_now() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_709_642_096)
}

fn close(a: &Rgb<u8>, b: &Rgb<u8>) -> bool {
    a.0.iter().zip(b.0.iter()).all(|(x, y)| x.abs_diff(*y) <= 2)
}

#[test]
fn test_scan_survives_one_failed_frame() {
    let out = tempfile::tempdir().unwrap();
    let creator = ScanCreator::with_faces(config(2, 2), faces(), None).unwrap();
    let source = ScriptedSource { fail_at: vec![45.0] };

    let path = creator
        .create_scan_with_progress(&source, &video_info(120.0), 0, out.path(), fixed_now(), |_| {})
        .unwrap();
    assert_eq!(path, out.path().join("clip.mp4.png"));

    let scan = image::open(&path).unwrap().to_rgb8();
    assert_eq!(scan.width(), 1200);
    let header = scan.height() - 2 * 337;

    // Snapshot 2 (45s) is the top-right cell
    assert_eq!(*scan.get_pixel(620, header + 20), PLACEHOLDER_FILL);
    assert!(close(scan.get_pixel(20, header + 20), &frame_color(15.0)));
    assert!(close(scan.get_pixel(20, header + 337 + 20), &frame_color(75.0)));
    assert!(close(scan.get_pixel(620, header + 337 + 20), &frame_color(105.0)));
}

#[test]
fn test_every_frame_failing_still_writes_a_scan() {
    let out = tempfile::tempdir().unwrap();
    let creator = ScanCreator::with_faces(config(1, 3), faces(), None).unwrap();
    let source = ScriptedSource {
        fail_at: vec![10.0, 30.0, 50.0],
    };

    let path = creator
        .create_scan_with_progress(&source, &video_info(60.0), 0, out.path(), fixed_now(), |_| {})
        .unwrap();
    let scan = image::open(&path).unwrap().to_rgb8();

    // No decoded frame to size from, so cells fall back to 16:9
    let cell_height = (9.0 / 16.0 * 400.0_f64).floor() as u32;
    let header = scan.height() - cell_height;
    for col in 0..3 {
        assert_eq!(*scan.get_pixel(col * 400 + 10, header + 10), PLACEHOLDER_FILL);
    }
}

#[test]
fn test_resize_scale_divides_dimensions() {
    let out = tempfile::tempdir().unwrap();
    let full = ScanCreator::with_faces(config(2, 2), faces(), None).unwrap();
    let full_path = full
        .create_scan(&ScriptedSource { fail_at: vec![] }, &video_info(120.0), 0, out.path())
        .unwrap();
    let (w, h) = image::image_dimensions(&full_path).unwrap();

    let halved_config = {
        let base = config(2, 2);
        let global = GlobalConfig {
            resize_scale: 2,
            output_filename_format: "half.{file_name}.png".to_string(),
            ..base.global().clone()
        };
        ScanConfig::new(global, base.layout().clone()).unwrap()
    };
    let half = ScanCreator::with_faces(halved_config, faces(), None).unwrap();
    let half_path = half
        .create_scan(&ScriptedSource { fail_at: vec![] }, &video_info(120.0), 0, out.path())
        .unwrap();

    assert_eq!(image::image_dimensions(&half_path).unwrap(), (w / 2, h / 2));
}

#[test]
fn test_same_inputs_give_identical_scans() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let creator = ScanCreator::with_faces(config(3, 3), faces(), None).unwrap();
    let source = ScriptedSource { fail_at: vec![] };

    let a = creator
        .create_scan_with_progress(&source, &video_info(90.0), 0, first.path(), fixed_now(), |_| {})
        .unwrap();
    let b = creator
        .create_scan_with_progress(&source, &video_info(90.0), 0, second.path(), fixed_now(), |_| {})
        .unwrap();

    let a = image::open(a).unwrap().to_rgb8();
    let b = image::open(b).unwrap().to_rgb8();
    assert_eq!(a.dimensions(), b.dimensions());
    assert!(a.as_raw() == b.as_raw());
}

#[test]
fn test_progress_phases_arrive_in_order() {
    let out = tempfile::tempdir().unwrap();
    let creator = ScanCreator::with_faces(config(2, 3), faces(), None).unwrap();
    let seen = Mutex::new(Vec::new());

    creator
        .create_scan_with_progress(
            &ScriptedSource { fail_at: vec![] },
            &video_info(300.0),
            0,
            out.path(),
            fixed_now(),
            |p| seen.lock().unwrap().push(p),
        )
        .unwrap();

    let seen = seen.into_inner().unwrap();
    let phases: Vec<ProgressPhase> = seen.iter().map(|p| p.phase.clone()).collect();
    let extracting = phases.iter().filter(|p| **p == ProgressPhase::ExtractingFrames).count();
    assert_eq!(extracting, 7);
    assert_eq!(
        &phases[extracting..],
        &[ProgressPhase::Composing, ProgressPhase::Saving, ProgressPhase::Complete]
    );
    assert!(seen[..extracting].iter().all(|p| p.total == 6));
    assert_eq!(seen.last().unwrap().percentage, 100.0);
}

#[test]
fn test_timestamp_in_file_name() {
    let out = tempfile::tempdir().unwrap();
    let base = config(1, 2);
    let global = GlobalConfig {
        output_filename_format: "{timestamp:%Y%m%d-%H%M%S}.scan.{file_name}.png".to_string(),
        ..base.global().clone()
    };
    let creator =
        ScanCreator::with_faces(ScanConfig::new(global, base.layout().clone()).unwrap(), faces(), None).unwrap();

    let path = creator
        .create_scan_with_progress(
            &ScriptedSource { fail_at: vec![] },
            &video_info(20.0),
            0,
            out.path(),
            fixed_now(),
            |_| {},
        )
        .unwrap();
    assert_eq!(path.file_name().unwrap(), "20240305-123456.scan.clip.mp4.png");
}

#[test]
fn test_unknown_stream_fails_before_extraction() {
    let out = tempfile::tempdir().unwrap();
    let creator = ScanCreator::with_faces(config(2, 2), faces(), None).unwrap();
    let seen = Mutex::new(0usize);

    let err = creator
        .create_scan_with_progress(
            &ScriptedSource { fail_at: vec![] },
            &video_info(120.0),
            3,
            out.path(),
            fixed_now(),
            |_| *seen.lock().unwrap() += 1,
        )
        .unwrap_err();

    assert!(format!("{:#}", err).contains("3"));
    assert_eq!(*seen.lock().unwrap(), 0);
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn test_too_short_video_is_rejected() {
    let out = tempfile::tempdir().unwrap();
    let creator = ScanCreator::with_faces(config(2, 2), faces(), None).unwrap();
    let err = creator
        .create_scan(&ScriptedSource { fail_at: vec![] }, &video_info(0.0), 0, out.path())
        .unwrap_err();
    assert!(!format!("{:#}", err).is_empty());
}

#[test]
fn test_scan_from_probe_report_with_two_video_streams() {
    let json = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "hevc", "profile": "Main 10", "pix_fmt": "yuv420p10le",
             "width": 3840, "height": 2160, "avg_frame_rate": "24000/1001"},
            {"codec_type": "video", "codec_name": "h264", "profile": "High", "pix_fmt": "yuv420p",
             "width": 1280, "height": 720, "avg_frame_rate": "30/1"},
            {"codec_type": "video", "codec_name": "mjpeg", "width": 600, "height": 600},
            {"codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2,
             "channel_layout": "stereo", "tags": {"language": "eng"}}
        ],
        "format": {"duration": "240.5", "bit_rate": "8000000"}
    }"#;
    let info = vidscan::probe::parse_probe_output(json, std::path::Path::new("/media/show s01e01.mkv"), 1 << 30)
        .unwrap();
    assert_eq!(info.video_streams.len(), 2);
    assert_eq!(info.file_name, "show s01e01.mkv");

    let out = tempfile::tempdir().unwrap();
    let creator = ScanCreator::with_faces(config(2, 2), faces(), None).unwrap();
    let path = creator
        .create_scan_with_progress(&ScriptedSource { fail_at: vec![] }, &info, 0, out.path(), fixed_now(), |_| {})
        .unwrap();
    assert_eq!(path, out.path().join("show s01e01.mkv.png"));
    assert!(creator
        .create_scan(&ScriptedSource { fail_at: vec![] }, &info, 2, out.path())
        .is_err());
}

/// Accepts any stream and records which ones were asked for.
struct RecordingSource {
    streams: Mutex<Vec<usize>>,
}

impl vidscan::FrameSource for RecordingSource {
    fn extract(&self, timestamp: f64, stream_index: usize) -> anyhow::Result<image::RgbImage> {
        self.streams.lock().unwrap().push(stream_index);
        Ok(image::RgbImage::from_pixel(160, 90, frame_color(timestamp)))
    }
}

#[test]
fn test_leading_cover_art_is_not_sampled() {
    let json = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "mjpeg", "width": 600, "height": 600},
            {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080}
        ],
        "format": {"duration": "40"}
    }"#;
    let info = vidscan::probe::parse_probe_output(json, std::path::Path::new("x.mp4"), 1).unwrap();
    assert_eq!(info.video_streams.len(), 1);

    let out = tempfile::tempdir().unwrap();
    let creator = ScanCreator::with_faces(config(2, 2), faces(), None).unwrap();
    let source = RecordingSource {
        streams: Mutex::new(Vec::new()),
    };
    creator
        .create_scan_with_progress(&source, &info, 0, out.path(), fixed_now(), |_| {})
        .unwrap();

    assert_eq!(source.streams.into_inner().unwrap(), vec![1, 1, 1, 1]);
}
