//! End-to-end replay: events persisted by a trace sink come back out of
//! the readers with the same shape.

use chrono::Duration;
use core_events::{EventValue, Level, ProviderDescriptor, TraceEvent};
use core_reader::{EventProcessor, FileProcessor, RealtimeProcessor};
use core_sinks::{FileSinkSettings, RetentionPolicy, Sink, SinkSettings};
use std::sync::{Arc, Mutex};

fn provider() -> ProviderDescriptor {
    ProviderDescriptor::from_name("ReplayTests").unwrap()
}

fn event(name: &str, count: u32) -> Arc<TraceEvent> {
    Arc::new(
        TraceEvent::builder(&provider(), 7, name)
            .level(Level::Warning)
            .keywords(0x2)
            .param("count", count)
            .param("label", name)
            .build()
            .unwrap(),
    )
}

fn trace_sink(dir: &std::path::Path, name: &str) -> Sink {
    Sink::trace(
        FileSinkSettings {
            log_name: name.to_string(),
            directory: dir.to_path_buf(),
            filename_template: None,
            timestamp_local: false,
            rotation_interval: Some(Duration::seconds(3600)),
            retention: RetentionPolicy::default(),
        },
        SinkSettings::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_persisted_events_replay_with_full_shape() {
    let dir = tempfile::tempdir().unwrap();
    {
        let sink = trace_sink(dir.path(), "replay");
        sink.write_event(&event("One", 1));
        sink.write_event(&event("Two", 2));
        sink.flush().unwrap();
    }

    let path = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.path().extension().is_some_and(|ext| ext == "etl"))
        .unwrap()
        .path();

    let mut processor = FileProcessor::new(vec![path]);
    let replayed: Arc<Mutex<Vec<TraceEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let replayed_cb = Arc::clone(&replayed);
    processor.on_event(Arc::new(move |event| {
        replayed_cb.lock().unwrap().push(event.clone());
    }));

    let summary = processor.process().await.unwrap();
    assert_eq!(summary.events, 2);
    assert_eq!(summary.unreadable, 0);

    let replayed = replayed.lock().unwrap();
    let first = &replayed[0];
    assert_eq!(first.provider_id(), provider().id());
    assert_eq!(first.provider_name(), "ReplayTests");
    assert_eq!(first.id(), 7);
    assert_eq!(first.event_name(), "One");
    assert_eq!(first.level(), Level::Warning);
    assert_eq!(first.keywords(), 0x2);
    assert_eq!(first.process_id(), std::process::id());
    assert_eq!(first.parameter("count"), Some(&EventValue::Unsigned(1)));
    assert_eq!(
        first.parameter("label"),
        Some(&EventValue::Str("One".to_string()))
    );
}

#[tokio::test]
async fn test_live_session_reaches_realtime_processor() {
    let dir = tempfile::tempdir().unwrap();
    let sink = trace_sink(dir.path(), "replay-live");

    let mut processor = RealtimeProcessor::new("replay-live", false);
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = Arc::clone(&seen);
    processor.on_event(Arc::new(move |event| {
        seen_cb.lock().unwrap().push(event.event_name().to_string());
    }));

    let task = processor.create_processing_task();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    sink.write_event(&event("LiveOne", 1));
    sink.write_event(&event("LiveTwo", 2));
    sink.flush().unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    processor.stop_processing();
    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.events, 2);
    assert_eq!(*seen.lock().unwrap(), vec!["LiveOne", "LiveTwo"]);
}
