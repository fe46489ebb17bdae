// tests/session_tests.rs

use grok_imagine_gateway::imagine::protocol::ImageStage;
use grok_imagine_gateway::imagine::session::{
    BLOCKED_READ_TIMEOUT_WINDOW, BLOCKED_STEADY_WINDOW, GenerationSession,
};
use std::time::{Duration, Instant};

const IMAGE_A: &str = "0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9";
const IMAGE_B: &str = "ffffffff-0000-1111-2222-333333333333";

fn png_url(id: &str) -> String {
    format!("https://assets.grok.com/images/{id}.png")
}

fn jpg_url(id: &str) -> String {
    format!("https://assets.grok.com/images/{id}.jpg")
}

fn blob(size: usize) -> String {
    "x".repeat(size)
}

#[test]
fn stages_progress_preview_medium_final() {
    let mut session = GenerationSession::new(1);
    let now = Instant::now();

    // 5KB preview, 40KB medium, 150KB final: one update per stage transition
    let first = session.observe_frame(&png_url(IMAGE_A), blob(5_000), now).unwrap();
    assert_eq!(first.stage, ImageStage::Preview);

    let second = session.observe_frame(&png_url(IMAGE_A), blob(40_000), now).unwrap();
    assert_eq!(second.stage, ImageStage::Medium);

    let third = session.observe_frame(&jpg_url(IMAGE_A), blob(150_000), now).unwrap();
    assert_eq!(third.stage, ImageStage::Final);
    assert!(third.is_final);
    assert_eq!(session.completed(), 1);
}

#[test]
fn repeated_stage_emits_no_update() {
    let mut session = GenerationSession::new(1);
    let now = Instant::now();

    assert!(session.observe_frame(&png_url(IMAGE_A), blob(40_000), now).is_some());
    // a second medium frame for the same image is not a transition
    assert!(session.observe_frame(&png_url(IMAGE_A), blob(45_000), now).is_none());
}

#[test]
fn stage_never_regresses() {
    let mut session = GenerationSession::new(1);
    let now = Instant::now();

    assert!(session.observe_frame(&png_url(IMAGE_A), blob(40_000), now).is_some());
    // a late preview-sized frame must not demote the recorded stage
    assert!(session.observe_frame(&png_url(IMAGE_A), blob(5_000), now).is_none());

    let candidates = session.best_candidates(4);
    assert_eq!(candidates[0].stage, ImageStage::Medium);
    assert_eq!(candidates[0].blob_size, 40_000);
}

#[test]
fn finalized_image_is_never_overwritten() {
    let mut session = GenerationSession::new(1);
    let now = Instant::now();

    assert!(session.observe_frame(&jpg_url(IMAGE_A), blob(150_000), now).is_some());
    assert!(session.observe_frame(&png_url(IMAGE_A), blob(40_000), now).is_none());
    assert!(session.observe_frame(&png_url(IMAGE_A), blob(5_000), now).is_none());
    assert!(session.observe_frame(&jpg_url(IMAGE_A), blob(200_000), now).is_none());

    assert_eq!(session.completed(), 1);
    let candidates = session.best_candidates(4);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].blob_size, 150_000);
}

#[test]
fn frames_without_extractable_id_are_dropped() {
    let mut session = GenerationSession::new(1);
    let now = Instant::now();
    assert!(session
        .observe_frame("https://grok.com/somewhere/else.jpg", blob(150_000), now)
        .is_none());
    assert!(session.is_empty());
}

#[test]
fn completed_counts_distinct_finals() {
    let mut session = GenerationSession::new(2);
    let now = Instant::now();

    session.observe_frame(&jpg_url(IMAGE_A), blob(150_000), now);
    session.observe_frame(&jpg_url(IMAGE_B), blob(130_000), now);
    assert_eq!(session.completed(), 2);
}

#[test]
fn blocked_fires_only_past_the_steady_window() {
    let mut session = GenerationSession::new(4);
    let medium_at = Instant::now();
    session.observe_frame(&png_url(IMAGE_A), blob(40_000), medium_at);

    // at 14s: not blocked yet
    assert!(!session.blocked_since_medium(medium_at + Duration::from_secs(14), BLOCKED_STEADY_WINDOW));
    // at 16s: blocked
    assert!(session.blocked_since_medium(medium_at + Duration::from_secs(16), BLOCKED_STEADY_WINDOW));
}

#[test]
fn blocked_uses_shorter_window_after_read_timeout() {
    let mut session = GenerationSession::new(4);
    let medium_at = Instant::now();
    session.observe_frame(&png_url(IMAGE_A), blob(40_000), medium_at);

    let at_9s = medium_at + Duration::from_secs(9);
    let at_11s = medium_at + Duration::from_secs(11);
    assert!(!session.blocked_since_medium(at_9s, BLOCKED_READ_TIMEOUT_WINDOW));
    assert!(session.blocked_since_medium(at_11s, BLOCKED_READ_TIMEOUT_WINDOW));
    // the same instant is inside the steady window
    assert!(!session.blocked_since_medium(at_11s, BLOCKED_STEADY_WINDOW));
}

#[test]
fn blocked_clears_once_a_final_arrives() {
    let mut session = GenerationSession::new(4);
    let medium_at = Instant::now();
    session.observe_frame(&png_url(IMAGE_A), blob(40_000), medium_at);
    session.observe_frame(&jpg_url(IMAGE_A), blob(150_000), medium_at);

    let much_later = medium_at + Duration::from_secs(60);
    assert!(!session.blocked_since_medium(much_later, BLOCKED_STEADY_WINDOW));
    assert!(!session.check_blocked());
}

#[test]
fn blocked_requires_a_medium_frame() {
    let mut session = GenerationSession::new(4);
    let now = Instant::now();
    session.observe_frame(&png_url(IMAGE_A), blob(5_000), now);

    assert!(!session.blocked_since_medium(now + Duration::from_secs(60), BLOCKED_STEADY_WINDOW));
    assert!(!session.check_blocked());
}

#[test]
fn check_blocked_matches_medium_without_final() {
    let mut session = GenerationSession::new(4);
    let now = Instant::now();
    session.observe_frame(&png_url(IMAGE_A), blob(40_000), now);
    assert!(session.check_blocked());
}

#[test]
fn idle_completion_requires_a_final_and_quiet_stream() {
    let mut session = GenerationSession::new(4);
    let start = Instant::now();

    // no finals: never idle-complete
    session.observe_frame(&png_url(IMAGE_A), blob(40_000), start);
    assert!(!session.idle_complete(start + Duration::from_secs(60), start));

    session.observe_frame(&jpg_url(IMAGE_A), blob(150_000), start);
    assert!(!session.idle_complete(start + Duration::from_secs(9), start));
    assert!(session.idle_complete(start + Duration::from_secs(11), start));
}

#[test]
fn best_candidates_prefer_final_then_size() {
    let mut session = GenerationSession::new(4);
    let now = Instant::now();

    // B: large but never final; A: smaller but final
    session.observe_frame(&png_url(IMAGE_B), blob(90_000), now);
    session.observe_frame(&jpg_url(IMAGE_A), blob(120_000), now);

    let candidates = session.best_candidates(4);
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].image_id, IMAGE_A);
    assert!(candidates[0].is_final);
    assert_eq!(candidates[1].image_id, IMAGE_B);
}

#[test]
fn best_candidates_respect_the_limit() {
    let mut session = GenerationSession::new(1);
    let now = Instant::now();
    session.observe_frame(&png_url(IMAGE_A), blob(40_000), now);
    session.observe_frame(&png_url(IMAGE_B), blob(50_000), now);

    let candidates = session.best_candidates(1);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].image_id, IMAGE_B);
}
