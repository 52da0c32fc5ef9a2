//! `POST /separate` over the in-process router.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{fixtures::CLIP_BYTES, terminal, TestFixture};
use jellysing_core::{ContentDigest, ModelError};

fn clip_hash() -> String {
    ContentDigest::of(CLIP_BYTES).to_string()
}

/// Event types without heartbeats, whose count depends on timing.
fn milestones(response: &common::TestResponse) -> Vec<String> {
    response
        .event_types()
        .into_iter()
        .filter(|t| t != "infer_progress")
        .collect()
}

#[tokio::test]
async fn test_multipart_upload_streams_full_sequence() {
    let fixture = TestFixture::new().await;

    let response = fixture.upload("/separate", "clip.wav", CLIP_BYTES).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("text/event-stream")));
    assert_eq!(
        milestones(&response),
        vec![
            "init",
            "load_progress",
            "load_complete",
            "infer_queued",
            "infer_start",
            "infer_complete",
            "results"
        ]
    );

    let events = response.events();
    assert_eq!(events[1].data["read"], 17);
    assert_eq!(events[2].data["read"], 17);
    assert_eq!(events[2].data["sha256"], clip_hash());
    assert!(events.iter().all(|e| e.data["time"].is_f64()));

    let results = terminal(&response);
    let hash = clip_hash();
    assert_eq!(results.data["hash"], hash);
    assert_eq!(results.data["cache"], false);
    assert_eq!(
        results.data["filenames"],
        serde_json::json!([format!("{}.0.wav", hash), format!("{}.1.wav", hash)])
    );
}

#[tokio::test]
async fn test_second_upload_is_served_from_cache() {
    let fixture = TestFixture::new().await;

    let first = fixture.upload("/separate", "clip.wav", CLIP_BYTES).await;
    assert_eq!(terminal(&first).data["cache"], false);

    let second = fixture.upload("/separate", "again.wav", CLIP_BYTES).await;
    assert_eq!(
        second.event_types(),
        vec!["init", "load_progress", "load_complete", "results"]
    );
    let results = terminal(&second);
    assert_eq!(results.data["cache"], true);
    assert_eq!(results.data["filenames"], terminal(&first).data["filenames"]);
    assert_eq!(fixture.separator.call_count(), 1);
}

#[tokio::test]
async fn test_parts_are_served_statically() {
    let fixture = TestFixture::new().await;
    let response = fixture.upload("/separate", "clip.wav", CLIP_BYTES).await;
    let filenames = terminal(&response).data["filenames"].clone();
    let vocals = filenames[0].as_str().unwrap();

    let part = fixture.get(&format!("/data/{}", vocals)).await;
    assert_eq!(part.status, StatusCode::OK);
    let mut expected = b"Vocals:".to_vec();
    expected.extend_from_slice(CLIP_BYTES);
    assert_eq!(part.body, expected);

    let stem = fixture.get(&format!("/data/{}.wav", clip_hash())).await;
    assert_eq!(stem.status, StatusCode::OK);
    assert_eq!(stem.body, CLIP_BYTES);
}

#[tokio::test]
async fn test_declared_extension_reaches_the_separator() {
    let fixture = TestFixture::new().await;
    fixture.upload("/separate", "Song.MP3", CLIP_BYTES).await;

    let calls = fixture.separator.recorded_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].input.extension().is_some_and(|e| e == "mp3"));
}

#[tokio::test]
async fn test_raw_body_upload() {
    let fixture = TestFixture::new().await;

    let response = fixture.upload_raw("/separate?ext=flac", CLIP_BYTES).await;

    assert_eq!(response.status, StatusCode::OK);
    let results = terminal(&response);
    assert_eq!(results.event, "results");
    assert_eq!(results.data["hash"], clip_hash());

    let calls = fixture.separator.recorded_calls();
    assert!(calls[0].input.extension().is_some_and(|e| e == "flac"));
}

#[tokio::test]
async fn test_misspelled_alias() {
    let fixture = TestFixture::new().await;
    let response = fixture.upload("/seperate", "clip.wav", CLIP_BYTES).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(terminal(&response).event, "results");
}

#[tokio::test]
async fn test_multipart_without_file_field_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .upload_field("/separate", "attachment", "clip.wav", CLIP_BYTES)
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.json()["error"]
        .as_str()
        .unwrap()
        .contains("file"));
    assert_eq!(fixture.separator.call_count(), 0);
}

#[tokio::test]
async fn test_truncated_multipart_reports_parse_error() {
    let fixture = TestFixture::new().await;

    // Part headers never end, so the parser fails before any field is yielded
    let body = "--cut-boundary\r\nContent-Disposition: form-data; name=\"file\"; filename=\"clip.wav\"\r\n";
    let request = Request::builder()
        .method("POST")
        .uri("/separate")
        .header(
            header::CONTENT_TYPE,
            "multipart/form-data; boundary=cut-boundary",
        )
        .body(Body::from(body))
        .unwrap();
    let response = fixture.send_raw(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let error = response.json()["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("malformed multipart body"), "{}", error);
    assert!(!error.contains("missing multipart field"));
    assert_eq!(fixture.separator.call_count(), 0);
}

#[tokio::test]
async fn test_separator_failure_ends_with_error_event() {
    let fixture = TestFixture::new().await;
    fixture.separator.fail_next(ModelError::NoOutput);

    let response = fixture.upload("/separate", "clip.wav", CLIP_BYTES).await;

    assert_eq!(response.status, StatusCode::OK);
    let error = terminal(&response);
    assert_eq!(error.event, "error");
    assert_eq!(error.data["hash"], clip_hash());
    assert!(!error.data["error"].as_str().unwrap().is_empty());
    assert!(!fixture.data_path(&format!("{}.wav", clip_hash())).exists());
}

#[tokio::test]
async fn test_upload_spool_is_cleaned_up() {
    let fixture = TestFixture::new().await;
    fixture.upload("/separate", "clip.wav", CLIP_BYTES).await;

    // The stream ends on the terminal event; the spool goes right after.
    let spool = fixture.data_path("tmp");
    let mut leftovers = usize::MAX;
    for _ in 0..50 {
        leftovers = std::fs::read_dir(&spool).unwrap().count();
        if leftovers == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_concurrent_uploads_run_one_at_a_time() {
    let fixture = TestFixture::new().await;
    fixture
        .separator
        .set_delay(std::time::Duration::from_millis(50));

    let shared = &fixture;
    let uploads = (0..3u8).map(move |i| {
        let mut bytes = CLIP_BYTES.to_vec();
        bytes.push(i);
        async move { shared.upload("/separate", "clip.wav", &bytes).await }
    });
    let responses = futures::future::join_all(uploads).await;

    for response in &responses {
        assert_eq!(terminal(response).event, "results");
    }
    assert_eq!(fixture.separator.call_count(), 3);
    assert_eq!(fixture.separator.probe().max_active(), 1);
}
