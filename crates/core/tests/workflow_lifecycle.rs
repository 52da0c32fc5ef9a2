//! Workflow lifecycle tests.
//!
//! Drive the Separate and Align workflows end to end against mock models and
//! check the event sequences, caching, serialization and cleanup.

use std::sync::Arc;
use std::time::Duration;

use jellysing_core::testing::{fixtures, ConcurrencyProbe, MockAligner, MockSeparator};
use jellysing_core::{
    progress_channel, AlignmentTask, ContentDigest, EventPayload, JobOutcome, LyricLine,
    ModelError, Orchestrator, ProgressEvent,
};
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    orchestrator: Arc<Orchestrator>,
    separator: Arc<MockSeparator>,
    aligner: Arc<MockAligner>,
}

async fn harness_with(
    dir: TempDir,
    separator: MockSeparator,
    aligner: MockAligner,
    chunk_bytes: Option<usize>,
) -> Harness {
    let mut config = fixtures::config(dir.path());
    if let Some(chunk) = chunk_bytes {
        config.jobs.upload_chunk_bytes = chunk;
    }
    let separator = Arc::new(separator);
    let aligner = Arc::new(aligner);
    let orchestrator = Orchestrator::new(&config, separator.clone(), aligner.clone());
    orchestrator.prepare().await.unwrap();
    Harness {
        _dir: dir,
        orchestrator: Arc::new(orchestrator),
        separator,
        aligner,
    }
}

async fn harness() -> Harness {
    harness_with(
        TempDir::new().unwrap(),
        MockSeparator::new(),
        MockAligner::new(),
        None,
    )
    .await
}

async fn separate(orchestrator: &Orchestrator, bytes: &[u8]) -> (JobOutcome, Vec<ProgressEvent>) {
    let (sink, mut rx) = progress_channel();
    let mut reader = bytes;
    let outcome = orchestrator.separate(&mut reader, "wav", &sink).await;
    drop(sink);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (outcome, events)
}

async fn align(orchestrator: &Orchestrator, task: AlignmentTask) -> (JobOutcome, Vec<ProgressEvent>) {
    let prepared = orchestrator.prepare_alignment(&task).await.unwrap();
    let (sink, mut rx) = progress_channel();
    let outcome = orchestrator.align(prepared, &sink).await;
    drop(sink);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (outcome, events)
}

/// Event types with heartbeats removed.
fn milestones(events: &[ProgressEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(ProgressEvent::event_type)
        .filter(|t| *t != "infer_progress")
        .collect()
}

fn lyrics_task(hash: &ContentDigest, reference: &str) -> AlignmentTask {
    AlignmentTask {
        lyrics: vec![
            LyricLine {
                start_time_ms: 0.0,
                end_time_ms: 2000.0,
                text: "hello world".to_string(),
            },
            LyricLine {
                start_time_ms: 2000.0,
                end_time_ms: 4000.0,
                text: "don't stop".to_string(),
            },
        ],
        reference: reference.to_string(),
        input_hash: hash.to_string(),
    }
}

fn upload_dir_entries(orchestrator: &Orchestrator) -> usize {
    std::fs::read_dir(orchestrator.upload_dir()).unwrap().count()
}

fn timestamps_ordered(events: &[ProgressEvent]) -> bool {
    events.windows(2).all(|w| w[0].time <= w[1].time)
}

// =============================================================================
// Separate
// =============================================================================

#[tokio::test]
async fn test_separate_then_cache_hit() {
    let h = harness().await;
    let digest = ContentDigest::of(fixtures::CLIP_BYTES);
    let expected_files = vec![format!("{}.0.wav", digest), format!("{}.1.wav", digest)];

    // First upload computes.
    let (outcome, events) = separate(&h.orchestrator, fixtures::CLIP_BYTES).await;
    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(
        milestones(&events),
        vec![
            "init",
            "load_progress",
            "load_complete",
            "infer_queued",
            "infer_start",
            "infer_complete",
            "results",
        ]
    );
    assert_eq!(events[1].payload, EventPayload::LoadProgress { read: 17 });
    assert_eq!(
        events[2].payload,
        EventPayload::LoadComplete {
            read: 17,
            sha256: digest.to_string(),
        }
    );
    assert_eq!(
        events.last().unwrap().payload,
        EventPayload::Results {
            filenames: expected_files.clone(),
            hash: digest.to_string(),
            cache: false,
        }
    );
    assert!(timestamps_ordered(&events));

    // Second upload of the same bytes is served from the cache.
    let (outcome, events) = separate(&h.orchestrator, fixtures::CLIP_BYTES).await;
    assert_eq!(outcome, JobOutcome::Cached);
    assert_eq!(
        milestones(&events),
        vec!["init", "load_progress", "load_complete", "results"]
    );
    assert_eq!(
        events.last().unwrap().payload,
        EventPayload::Results {
            filenames: expected_files,
            hash: digest.to_string(),
            cache: true,
        }
    );

    assert_eq!(h.separator.call_count(), 1);
    let cache = h.orchestrator.cache();
    assert_eq!(
        std::fs::read(cache.stem_path(&digest)).unwrap(),
        fixtures::CLIP_BYTES
    );
    assert!(cache.part_path(&digest, 0).exists());
    assert!(cache.part_path(&digest, 1).exists());
    // Vocals first: the mock writes "<label>:<input>".
    assert!(std::fs::read(cache.part_path(&digest, 0))
        .unwrap()
        .starts_with(b"Vocals:"));
}

#[tokio::test]
async fn test_digest_independent_of_chunking() {
    let h = harness_with(
        TempDir::new().unwrap(),
        MockSeparator::new(),
        MockAligner::new(),
        Some(4),
    )
    .await;

    let (_, events) = separate(&h.orchestrator, fixtures::CLIP_BYTES).await;

    let progress: Vec<u64> = events
        .iter()
        .filter_map(|e| match e.payload {
            EventPayload::LoadProgress { read } => Some(read),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![4, 8, 12, 16, 17]);

    let sha = events.iter().find_map(|e| match &e.payload {
        EventPayload::LoadComplete { sha256, .. } => Some(sha256.clone()),
        _ => None,
    });
    assert_eq!(sha, Some(ContentDigest::of(fixtures::CLIP_BYTES).to_string()));
}

#[tokio::test]
async fn test_empty_upload_still_completes() {
    let h = harness().await;
    let (outcome, events) = separate(&h.orchestrator, b"").await;

    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(milestones(&events)[..2], ["init", "load_complete"]);
}

#[tokio::test]
async fn test_heartbeats_between_start_and_complete() {
    let h = harness().await;
    h.separator.set_delay(Duration::from_millis(150));

    let (_, events) = separate(&h.orchestrator, fixtures::CLIP_BYTES).await;
    let types: Vec<_> = events.iter().map(ProgressEvent::event_type).collect();

    let start = types.iter().position(|t| *t == "infer_start").unwrap();
    let complete = types.iter().position(|t| *t == "infer_complete").unwrap();
    let beats: Vec<usize> = types
        .iter()
        .enumerate()
        .filter(|(_, t)| **t == "infer_progress")
        .map(|(i, _)| i)
        .collect();

    assert!(beats.len() >= 2, "expected heartbeats, got {:?}", types);
    assert!(beats.iter().all(|i| *i > start && *i < complete));
}

#[tokio::test]
async fn test_separation_failure_is_terminal_error() {
    let h = harness().await;
    let digest = ContentDigest::of(fixtures::CLIP_BYTES);
    h.separator
        .fail_next(ModelError::command_failed("model rejected input", None));

    let (outcome, events) = separate(&h.orchestrator, fixtures::CLIP_BYTES).await;

    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(
        milestones(&events),
        vec![
            "init",
            "load_progress",
            "load_complete",
            "infer_queued",
            "infer_start",
            "infer_complete",
            "error",
        ]
    );
    match &events.last().unwrap().payload {
        EventPayload::Error { hash, error } => {
            assert_eq!(hash.as_deref(), Some(digest.as_str()));
            assert!(error.contains("model rejected input"));
        }
        other => panic!("unexpected terminal event: {:?}", other),
    }
    assert!(h.orchestrator.cache().lookup(&digest).await.is_none());
    assert_eq!(upload_dir_entries(&h.orchestrator), 0);

    // The next request is unaffected.
    let (outcome, _) = separate(&h.orchestrator, fixtures::CLIP_BYTES).await;
    assert_eq!(outcome, JobOutcome::Completed);
}

#[tokio::test]
async fn test_separator_panic_is_contained() {
    let h = harness().await;
    h.separator.panic_next();

    let (outcome, events) = separate(&h.orchestrator, fixtures::CLIP_BYTES).await;
    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(events.last().unwrap().event_type(), "error");

    assert_eq!(h.orchestrator.gate().status().running, 0);
    let (outcome, _) = separate(&h.orchestrator, fixtures::CLIP_BYTES).await;
    assert_eq!(outcome, JobOutcome::Completed);
}

#[tokio::test]
async fn test_too_few_parts_is_an_error() {
    let h = harness_with(
        TempDir::new().unwrap(),
        MockSeparator::new().with_labels(&["Vocals"]),
        MockAligner::new(),
        None,
    )
    .await;

    let (outcome, events) = separate(&h.orchestrator, fixtures::CLIP_BYTES).await;
    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(events.last().unwrap().event_type(), "error");
    assert_eq!(upload_dir_entries(&h.orchestrator), 0);
}

#[tokio::test]
async fn test_upload_and_scratch_removed_after_success() {
    let h = harness().await;
    separate(&h.orchestrator, fixtures::CLIP_BYTES).await;
    separate(&h.orchestrator, b"another track").await;

    assert_eq!(upload_dir_entries(&h.orchestrator), 0);
    let calls = h.separator.recorded_calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| !c.input.exists() && !c.output_dir.exists()));
}

#[tokio::test]
async fn test_workflow_finishes_after_client_disconnect() {
    let h = harness().await;
    let digest = ContentDigest::of(fixtures::CLIP_BYTES);
    let (sink, rx) = progress_channel();
    drop(rx);

    let mut reader = fixtures::CLIP_BYTES;
    let outcome = h.orchestrator.separate(&mut reader, "wav", &sink).await;

    assert_eq!(outcome, JobOutcome::Completed);
    assert!(h.orchestrator.cache().lookup(&digest).await.is_some());
    assert_eq!(upload_dir_entries(&h.orchestrator), 0);
}

// =============================================================================
// Align
// =============================================================================

#[tokio::test]
async fn test_align_against_cached_vocals() {
    let h = harness().await;
    let digest = ContentDigest::of(fixtures::CLIP_BYTES);
    separate(&h.orchestrator, fixtures::CLIP_BYTES).await;

    let (outcome, events) = align(&h.orchestrator, lyrics_task(&digest, "vocals")).await;

    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(
        milestones(&events),
        vec![
            "init",
            "infer_queued",
            "infer_start",
            "infer_complete",
            "alignment",
        ]
    );
    match &events.last().unwrap().payload {
        EventPayload::Alignment { hash, alignment } => {
            assert_eq!(hash, digest.as_str());
            assert_eq!(alignment["segments"][1]["words"][0]["word"], "don't");
        }
        other => panic!("unexpected terminal event: {:?}", other),
    }

    let requests = h.aligner.recorded_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].audio_path,
        h.orchestrator.cache().part_path(&digest, 0)
    );
    assert_eq!(requests[0].segments[1].start, 2.0);
    assert_eq!(requests[0].words.len(), 4);
    assert_eq!(requests[0].words[2].mask, vec![true, true, true, true, true]);
}

#[tokio::test]
async fn test_align_failure_is_terminal_error() {
    let h = harness().await;
    let digest = ContentDigest::of(fixtures::CLIP_BYTES);
    separate(&h.orchestrator, fixtures::CLIP_BYTES).await;
    h.aligner.panic_next();

    let (outcome, events) = align(&h.orchestrator, lyrics_task(&digest, "combined")).await;

    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(events.last().unwrap().event_type(), "error");
    assert_eq!(
        h.aligner.recorded_requests()[0].audio_path,
        h.orchestrator.cache().stem_path(&digest)
    );
}

// =============================================================================
// Admission
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_running_phases_never_overlap() {
    let probe = ConcurrencyProbe::new();
    let h = harness_with(
        TempDir::new().unwrap(),
        MockSeparator::new().with_probe(probe.clone()),
        MockAligner::new().with_probe(probe.clone()),
        None,
    )
    .await;

    // Seed one cached separation for the aligners to reference.
    let digest = ContentDigest::of(fixtures::CLIP_BYTES);
    separate(&h.orchestrator, fixtures::CLIP_BYTES).await;
    h.separator.set_delay(Duration::from_millis(40));
    h.aligner.set_delay(Duration::from_millis(40));

    let mut handles = Vec::new();
    for i in 0..4 {
        let orchestrator = Arc::clone(&h.orchestrator);
        handles.push(tokio::spawn(async move {
            let bytes = format!("track number {}", i).into_bytes();
            separate(&orchestrator, &bytes).await.0
        }));
    }
    for _ in 0..2 {
        let orchestrator = Arc::clone(&h.orchestrator);
        let task = lyrics_task(&digest, "instrumental");
        handles.push(tokio::spawn(async move { align(&orchestrator, task).await.0 }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), JobOutcome::Completed);
    }

    assert_eq!(probe.total(), 7);
    assert_eq!(probe.max_active(), 1);
    assert_eq!(h.orchestrator.gate().status().queued, 0);
    assert_eq!(h.orchestrator.gate().status().running, 0);
}

#[tokio::test]
async fn test_closed_gate_fails_queued_job() {
    let h = harness().await;
    h.orchestrator.gate().close();

    let (outcome, events) = separate(&h.orchestrator, fixtures::CLIP_BYTES).await;

    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(
        milestones(&events),
        vec!["init", "load_progress", "load_complete", "infer_queued", "error"]
    );
    assert_eq!(h.separator.call_count(), 0);
    assert_eq!(upload_dir_entries(&h.orchestrator), 0);
}

#[test]
fn test_orchestrator_is_shareable_across_tasks() {
    fn is_send_sync<T: Send + Sync>() {}
    is_send_sync::<Orchestrator>();
}
