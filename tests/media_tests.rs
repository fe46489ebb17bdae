// tests/media_tests.rs

use grok_imagine_gateway::imagine::media::MediaStore;
use grok_imagine_gateway::imagine::session::GenerationSession;
use std::time::Instant;
use tempfile::TempDir;

const IMAGE_A: &str = "0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9";
const IMAGE_B: &str = "ffffffff-0000-1111-2222-333333333333";

fn blob(size: usize) -> String {
    // valid standard base64: length is a multiple of 4 in every caller
    "x".repeat(size)
}

#[tokio::test]
async fn finals_are_jpg_and_intermediates_png() {
    let dir = TempDir::new().unwrap();
    let store = MediaStore::new(dir.path().join("images"), "http://127.0.0.1:9563".to_string());

    let mut session = GenerationSession::new(2);
    let now = Instant::now();
    session.observe_frame(
        &format!("https://assets.grok.com/images/{IMAGE_A}.jpg"),
        blob(150_000),
        now,
    );
    session.observe_frame(
        &format!("https://assets.grok.com/images/{IMAGE_B}.png"),
        blob(40_000),
        now,
    );

    let images = store.persist(&session, 2).await;
    assert_eq!(images.count(), 2);
    // final first, then the medium candidate
    assert_eq!(
        images.urls[0],
        format!("http://127.0.0.1:9563/images/{IMAGE_A}.jpg")
    );
    assert_eq!(
        images.urls[1],
        format!("http://127.0.0.1:9563/images/{IMAGE_B}.png")
    );
    assert!(dir.path().join("images").join(format!("{IMAGE_A}.jpg")).exists());
    assert!(dir.path().join("images").join(format!("{IMAGE_B}.png")).exists());
    assert_eq!(images.b64.len(), 2);
}

#[tokio::test]
async fn persist_honors_the_limit() {
    let dir = TempDir::new().unwrap();
    let store = MediaStore::new(dir.path().join("images"), "http://127.0.0.1:9563".to_string());

    let mut session = GenerationSession::new(1);
    let now = Instant::now();
    session.observe_frame(
        &format!("https://assets.grok.com/images/{IMAGE_A}.jpg"),
        blob(150_000),
        now,
    );
    session.observe_frame(
        &format!("https://assets.grok.com/images/{IMAGE_B}.png"),
        blob(40_000),
        now,
    );

    let images = store.persist(&session, 1).await;
    assert_eq!(images.count(), 1);
    assert!(images.urls[0].ends_with(&format!("{IMAGE_A}.jpg")));
}

#[tokio::test]
async fn undecodable_payloads_are_skipped() {
    let dir = TempDir::new().unwrap();
    let store = MediaStore::new(dir.path().join("images"), "http://127.0.0.1:9563".to_string());

    let mut session = GenerationSession::new(1);
    // medium-sized but not valid base64
    session.observe_frame(
        &format!("https://assets.grok.com/images/{IMAGE_A}.png"),
        "!".repeat(40_000),
        Instant::now(),
    );

    let images = store.persist(&session, 1).await;
    assert!(images.is_empty());
}

#[tokio::test]
async fn empty_session_persists_nothing() {
    let dir = TempDir::new().unwrap();
    let store = MediaStore::new(dir.path().join("images"), "http://127.0.0.1:9563".to_string());
    let session = GenerationSession::new(4);

    let images = store.persist(&session, 4).await;
    assert!(images.is_empty());
    // the directory is not even created for an empty session
    assert!(!dir.path().join("images").exists());
}
