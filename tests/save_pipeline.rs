// Staged save and replay of a saved timeline

mod common;

use std::path::Path;
use std::sync::atomic::AtomicBool;

use annocap_lib::recording::StrokePolicy;
use annocap_lib::session::{
    persist, AnnotationTimeline, OutputPaths, SessionMetadata, StageOutcome,
    DEFAULT_GAP_THRESHOLD_SECS,
};
use annocap_lib::timeline::{
    AnnotationPatch, FinishedTimeline, FrameEntry, Point, StrokeState, TimelineStore,
};
use annocap_lib::video::overlay::{format_elapsed, StrokeStyle};
use annocap_lib::video::{MemoryDecoder, PlaybackReconstructor, Raster};

use common::recording_targets;

const RED: [u8; 3] = [255, 0, 0];
const GREY: [u8; 3] = [40, 40, 40];

fn metadata(frame_count: u64) -> SessionMetadata {
    SessionMetadata {
        video_name: "lecture.mp4".into(),
        frame_rate: 25.0,
        frame_count,
        frame_width: 64,
        frame_height: 48,
        sample_rate: 8000,
        channels: 1,
    }
}

/// Captures `count` grey frames 40ms apart, marking a horizontal stroke
/// across frames 1..=3, and one audio chunk per frame
fn recorded_session(count: u64) -> FinishedTimeline {
    let store = TimelineStore::new(count);
    for i in 0..count {
        let ts = i as f64 * 0.04;
        let logical = store.append_frame(FrameEntry {
            capture_timestamp: ts,
            frame_index: i,
            pixels: Raster::filled(64, 48, GREY),
        });
        store.upsert_annotation(
            logical,
            AnnotationPatch {
                frame_index: i,
                source_frame_index: i + 1,
                time_label: format_elapsed(i as f64 * 40.0),
                capture_timestamp: ts,
            },
        );
        match i {
            1 => store.mark_latest(StrokeState::Start, Point::new(4, 20)),
            2 => store.mark_latest(StrokeState::Move, Point::new(20, 20)),
            3 => store.mark_latest(StrokeState::End, Point::new(40, 20)),
            _ => None,
        };
        store.append_audio(ts, vec![i as f32; 4]);
    }
    store.finish()
}

fn paths(dir: &Path) -> OutputPaths {
    OutputPaths::for_input(Path::new("/videos/lecture.mp4"), None, dir)
}

#[test]
fn replay_redraws_the_saved_strokes() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths(dir.path());
    let (mut targets, recorded) = recording_targets(false, false);

    let report = persist(
        recorded_session(6),
        metadata(6),
        &paths,
        &mut targets,
        DEFAULT_GAP_THRESHOLD_SECS,
    );
    assert!(report.all_ok(), "{:?}", report);

    let mut playback = PlaybackReconstructor::load(
        &paths.timeline,
        StrokePolicy::Short,
        StrokeStyle {
            color: RED,
            thickness: 1,
        },
        [255, 255, 255],
    )
    .unwrap();
    assert_eq!(playback.timeline().frames.len(), 6);

    let saved: Vec<Raster> = recorded.frames.lock().clone();
    let mut decoder = MemoryDecoder::new(saved, 25.0);
    let mut frames = Vec::new();
    playback
        .run(&mut decoder, &AtomicBool::new(false), |_, raster| {
            frames.push(raster);
            true
        })
        .unwrap();

    assert_eq!(frames.len(), 6);
    // Start alone draws nothing, the move draws 4..20, the end 20..40
    assert_eq!(frames[1].pixel(10, 20), Some(GREY));
    assert_eq!(frames[2].pixel(10, 20), Some(RED));
    assert_eq!(frames[2].pixel(30, 20), Some(GREY));
    assert_eq!(frames[3].pixel(30, 20), Some(RED));
    assert_eq!(frames[4].pixel(30, 20), Some(GREY));
}

#[test]
fn saved_json_keeps_indices_labels_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths(dir.path());
    let (mut targets, _) = recording_targets(false, false);
    persist(recorded_session(4), metadata(4), &paths, &mut targets, DEFAULT_GAP_THRESHOLD_SECS);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.timeline).unwrap()).unwrap();
    assert_eq!(json["1"]["idx"], 1);
    assert_eq!(json["1"]["org_idx"], 2);
    assert_eq!(json["1"]["anno"], serde_json::json!(["start", [4, 20]]));
    assert_eq!(json["0"]["anno"], serde_json::json!([]));
    assert_eq!(json["3"]["time_str"], "0:00:00");
    assert_eq!(json["metadata"]["frame_count"], 4);

    let timeline = AnnotationTimeline::load(&paths.timeline).unwrap();
    assert_eq!(timeline.get(3).unwrap().stroke.unwrap().state, StrokeState::End);
}

#[test]
fn audio_inside_a_stall_is_cut() {
    let store = TimelineStore::new(3);
    for (i, ts) in [0.0, 0.04, 0.5].into_iter().enumerate() {
        let logical = store.append_frame(FrameEntry {
            capture_timestamp: ts,
            frame_index: i as u64,
            pixels: Raster::new(64, 48),
        });
        store.upsert_annotation(
            logical,
            AnnotationPatch {
                frame_index: i as u64,
                source_frame_index: i as u64 + 1,
                time_label: String::new(),
                capture_timestamp: ts,
            },
        );
    }
    for ts in [0.0, 0.04, 0.2, 0.3, 0.5] {
        store.append_audio(ts, vec![ts as f32]);
    }

    let dir = tempfile::tempdir().unwrap();
    let (mut targets, recorded) = recording_targets(false, false);
    persist(store.finish(), metadata(3), &paths(dir.path()), &mut targets, 0.1);

    assert_eq!(*recorded.samples.lock(), vec![0.0, 0.5]);
}

#[test]
fn failed_mux_keeps_the_intermediates_and_still_writes_json() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths(dir.path());
    let (mut targets, recorded) = recording_targets(false, true);

    let report = persist(recorded_session(3), metadata(3), &paths, &mut targets, DEFAULT_GAP_THRESHOLD_SECS);

    assert!(!report.all_ok());
    assert!(report.mux.is_failed());
    assert_eq!(*recorded.log.lock(), vec!["video", "audio", "mux"]);
    assert!(paths.video_intermediate.exists());
    assert!(paths.audio_intermediate.exists());
    assert!(!paths.final_video.exists());
    assert_eq!(report.annotations, StageOutcome::Written(paths.timeline.clone()));
}

#[test]
fn failed_video_skips_the_mux() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths(dir.path());
    let (mut targets, recorded) = recording_targets(true, false);

    let report = persist(recorded_session(3), metadata(3), &paths, &mut targets, DEFAULT_GAP_THRESHOLD_SECS);

    assert!(report.video.is_failed());
    assert!(report.audio.is_written());
    assert!(matches!(report.mux, StageOutcome::Skipped(_)));
    assert_eq!(*recorded.log.lock(), vec!["video", "audio"]);
    assert!(paths.timeline.exists());
}

#[test]
fn frames_past_the_high_water_mark_are_not_encoded() {
    let mut finished = recorded_session(5);
    finished.max_frames = 3;

    let dir = tempfile::tempdir().unwrap();
    let (mut targets, recorded) = recording_targets(false, false);
    let report = persist(finished, metadata(5), &paths(dir.path()), &mut targets, DEFAULT_GAP_THRESHOLD_SECS);

    assert!(report.video.is_written());
    assert_eq!(recorded.frames.lock().len(), 3);
}

#[test]
fn empty_session_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths(dir.path().join("nested").as_path());
    let (mut targets, recorded) = recording_targets(false, false);

    let report = persist(FinishedTimeline::default(), metadata(0), &paths, &mut targets, DEFAULT_GAP_THRESHOLD_SECS);

    assert!(report.all_ok());
    assert!(matches!(report.video, StageOutcome::Skipped(_)));
    assert!(matches!(report.audio, StageOutcome::Skipped(_)));
    assert!(matches!(report.mux, StageOutcome::Skipped(_)));
    assert!(matches!(report.annotations, StageOutcome::Skipped(_)));
    assert!(!paths.timeline.exists());
    assert!(recorded.log.lock().is_empty());
}
