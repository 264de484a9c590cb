//! End-to-end lifecycle tests for file-backed sinks.

use chrono::{Duration, Utc};
use core_events::{Level, ProviderDescriptor, TraceEvent};
use core_sinks::{FileSinkSettings, RetentionPolicy, Sink, SinkSettings};
use std::sync::Arc;

fn provider() -> ProviderDescriptor {
    ProviderDescriptor::from_name("LifecycleTests").unwrap()
}

fn event(name: &str) -> Arc<TraceEvent> {
    Arc::new(
        TraceEvent::builder(&provider(), 1, name)
            .level(Level::Informational)
            .param("detail", name)
            .build()
            .unwrap(),
    )
}

fn settings(dir: &std::path::Path, name: &str) -> FileSinkSettings {
    FileSinkSettings {
        log_name: name.to_string(),
        directory: dir.to_path_buf(),
        filename_template: None,
        timestamp_local: false,
        rotation_interval: Some(Duration::seconds(3600)),
        retention: RetentionPolicy::default(),
    }
}

#[test]
fn test_text_sink_writes_formatted_lines() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Sink::text(settings(dir.path(), "svc"), SinkSettings::default()).unwrap();

    sink.write_event(&event("Alpha"));
    sink.write_event(&event("Beta"));
    sink.flush().unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(entries.len(), 1);
    let content = std::fs::read_to_string(entries[0].path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("i:LifecycleTests Alpha"));
    assert!(lines[0].contains("detail=\"Alpha\""));
    assert_eq!(sink.stats().written, 2);
}

#[test]
fn test_demand_rotation_switches_files() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Sink::text(settings(dir.path(), "svc"), SinkSettings::default()).unwrap();

    sink.write_event(&event("BeforeRotate"));
    sink.flush().unwrap();
    assert!(sink.rotate_now(Utc::now() + Duration::seconds(1)).unwrap());
    sink.write_event(&event("AfterRotate"));
    sink.flush().unwrap();

    let count = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(count, 2);
    assert_eq!(sink.stats().rotations, 1);
}

#[test]
fn test_checked_rotation_respects_clock() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Sink::text(settings(dir.path(), "svc"), SinkSettings::default()).unwrap();

    // Within the hour-long interval nothing rotates.
    assert!(!sink.checked_rotate(Utc::now() + Duration::seconds(10)).unwrap());
    // Past the interval exactly one rotation happens, then the clock
    // re-arms.
    let later = Utc::now() + Duration::seconds(3601);
    assert!(sink.checked_rotate(later).unwrap());
    assert!(!sink.checked_rotate(later).unwrap());
}

#[test]
fn test_empty_current_file_removed_on_close() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Sink::text(settings(dir.path(), "svc"), SinkSettings::default()).unwrap();
    sink.flush().unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    drop(sink);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_trace_sink_writes_readable_records() {
    use core_events::record::{Frame, RecordReader};

    let dir = tempfile::tempdir().unwrap();
    let sink = Sink::trace(settings(dir.path(), "bin"), SinkSettings::default()).unwrap();

    sink.write_event(&event("RecordedOne"));
    sink.write_event(&event("RecordedTwo"));
    sink.flush().unwrap();

    let path = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.path().extension().is_some_and(|ext| ext == "etl"))
        .unwrap()
        .path();
    let file = std::fs::File::open(path).unwrap();
    let mut reader = RecordReader::new(std::io::BufReader::new(file)).unwrap();

    let mut names = Vec::new();
    while let Some(frame) = reader.next_frame().unwrap() {
        if let Frame::Event(_, event) = frame {
            names.push(event.event_name().to_string());
        }
    }
    assert_eq!(names, vec!["RecordedOne", "RecordedTwo"]);
}

#[test]
fn test_rotation_applies_retention() {
    let dir = tempfile::tempdir().unwrap();
    let mut file_settings = settings(dir.path(), "svc");
    file_settings.retention = RetentionPolicy {
        max_age: Some(Duration::days(7)),
        max_total_bytes: None,
    };
    // Pre-existing rotation files, one fresh and one long expired.
    let fresh = dir.path().join("svc_20240101000001.log");
    let stale = dir.path().join("svc_20240101000002.log");
    std::fs::write(&fresh, "fresh\n").unwrap();
    std::fs::write(&stale, "stale\n").unwrap();
    let old_stamp = std::time::SystemTime::now() - std::time::Duration::from_secs(30 * 86_400);
    std::fs::File::options()
        .write(true)
        .open(&stale)
        .unwrap()
        .set_modified(old_stamp)
        .unwrap();

    let sink = Sink::text(file_settings, SinkSettings::default()).unwrap();
    sink.write_event(&event("Keep"));
    sink.rotate_now(Utc::now()).unwrap();
    sink.flush().unwrap();

    assert!(fresh.exists());
    assert!(!stale.exists());
}
