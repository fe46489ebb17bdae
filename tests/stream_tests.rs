// tests/stream_tests.rs

use futures::StreamExt;
use grok_imagine_gateway::error::AppError;
use grok_imagine_gateway::imagine::media::GeneratedImages;
use grok_imagine_gateway::imagine::protocol::ImageStage;
use grok_imagine_gateway::imagine::session::ImageProgress;
use grok_imagine_gateway::imagine::stream::{
    EVENT_QUEUE_DEPTH, GenerationEvent, GenerationStream, ProgressSender,
};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

fn progress(image_id: &str, stage: ImageStage) -> ImageProgress {
    ImageProgress {
        image_id: image_id.to_string(),
        stage,
        blob: "aGVsbG8=".to_string(),
        blob_size: 8,
        url: format!("https://assets.grok.com/images/{image_id}.png"),
        is_final: stage == ImageStage::Final,
    }
}

#[tokio::test]
async fn stream_is_finite_and_ends_after_result() {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let task = tokio::spawn({
        let tx = tx.clone();
        async move {
            let sender = ProgressSender::from(tx.clone());
            sender.send(&progress("img-1", ImageStage::Preview), 0, 2).await;
            sender.send(&progress("img-1", ImageStage::Medium), 0, 2).await;
            let images = GeneratedImages {
                urls: vec!["http://127.0.0.1:9563/images/img-1.jpg".to_string()],
                b64: vec!["aGVsbG8=".to_string()],
            };
            let _ = tx.send(GenerationEvent::success(&images)).await;
            // stay alive: the consumer must still terminate on the result event
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    });
    drop(tx);

    let mut stream = GenerationStream::new(rx, task);

    let first = stream.next().await.unwrap();
    assert!(matches!(first, GenerationEvent::Progress { completed: 0, total: 2, .. }));
    let second = stream.next().await.unwrap();
    assert!(matches!(second, GenerationEvent::Progress { .. }));
    let third = stream.next().await.unwrap();
    assert!(matches!(third, GenerationEvent::Result { success: true, .. }));

    // exactly one terminal event, then the sequence is over
    assert!(stream.next().await.is_none());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_producer() {
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let (_tx, rx) = mpsc::channel::<GenerationEvent>(EVENT_QUEUE_DEPTH);
    let task = tokio::spawn(async move {
        // holds the sender until aborted; an orderly finish would send
        tokio::time::sleep(Duration::from_secs(3600)).await;
        let _ = done_tx.send(());
    });

    let stream = GenerationStream::new(rx, task);
    drop(stream);

    // abort drops done_tx without sending
    let outcome = tokio::time::timeout(Duration::from_secs(5), done_rx).await;
    assert!(matches!(outcome, Ok(Err(_))), "producer task must be cancelled");
}

#[tokio::test]
async fn progress_send_survives_dropped_consumer() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let sender = ProgressSender::from(tx);
    // logged, never fatal
    sender.send(&progress("img-1", ImageStage::Preview), 0, 1).await;
}

#[test]
fn events_serialize_with_stable_tags() {
    let images = GeneratedImages {
        urls: vec!["http://host/images/a.jpg".to_string()],
        b64: vec![],
    };
    let success = serde_json::to_value(GenerationEvent::success(&images)).unwrap();
    assert_eq!(success["type"], "result");
    assert_eq!(success["success"], true);
    assert_eq!(success["urls"][0], "http://host/images/a.jpg");

    let failure =
        serde_json::to_value(GenerationEvent::failure(&AppError::Blocked("x".to_string())))
            .unwrap();
    assert_eq!(failure["type"], "result");
    assert_eq!(failure["success"], false);
    assert_eq!(failure["error_code"], "blocked");
    assert!(failure.get("urls").is_none(), "empty url list is omitted");

    let event = GenerationEvent::Progress {
        image_id: "img".to_string(),
        stage: ImageStage::Medium,
        blob_size: 42,
        is_final: false,
        completed: 1,
        total: 4,
    };
    let progress = serde_json::to_value(event).unwrap();
    assert_eq!(progress["type"], "progress");
    assert_eq!(progress["stage"], "medium");
}
