//! Identity rotation against a fake control endpoint

use crate::common::{direct_identity, download_config};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use veil_fetch::identity::{
    ControlClient, ControlError, ControlStep, RotationController, TransportSettings,
};

/// Replies to each line of every connection from a fixed script
///
/// A `None` entry swallows the line and never answers.
async fn control_server(
    replies: Vec<Option<&'static str>>,
) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let received = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&received);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let replies = replies.clone();
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read).lines();
                let mut replies = replies.into_iter();
                while let Ok(Some(line)) = lines.next_line().await {
                    log.lock().unwrap().push(line);
                    match replies.next().flatten() {
                        Some(reply) => {
                            if write.write_all(format!("{}\r\n", reply).as_bytes()).await.is_err() {
                                return;
                            }
                        }
                        None => {
                            tokio::time::sleep(Duration::from_secs(30)).await;
                            return;
                        }
                    }
                }
            });
        }
    });

    (address, received)
}

fn controller(address: &str, exchange_timeout: Duration) -> RotationController {
    let config = download_config(std::env::temp_dir().as_path());
    let control = ControlClient::new(
        address,
        "secret",
        Duration::from_millis(500),
        exchange_timeout,
    );
    RotationController::new(
        direct_identity(&config),
        control,
        TransportSettings::direct(&config),
        Duration::ZERO,
    )
}

#[tokio::test]
async fn test_rotation_advances_generation() {
    let (address, received) = control_server(vec![Some("250 OK"), Some("250 OK")]).await;
    let rotation = controller(&address, Duration::from_secs(2));

    let generation = rotation.rotate().await.unwrap();

    assert_eq!(generation, 1);
    assert_eq!(rotation.completed(), 1);
    assert_eq!(rotation.identity().generation(), 1);
    assert!(rotation.identity().current().is_consistent());
    assert_eq!(
        *received.lock().unwrap(),
        vec!["AUTHENTICATE \"secret\"", "SIGNAL NEWNYM"]
    );
}

#[tokio::test]
async fn test_rejected_authentication_keeps_epoch() {
    let (address, received) =
        control_server(vec![Some("515 Authentication failed: Password did not match")]).await;
    let rotation = controller(&address, Duration::from_secs(2));

    let err = rotation.rotate().await.unwrap_err();

    assert!(
        matches!(&err, ControlError::AuthenticationRejected { reply } if reply.starts_with("515")),
        "{err:?}"
    );
    assert_eq!(rotation.identity().generation(), 0);
    assert_eq!(rotation.completed(), 0);
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_signal_keeps_epoch() {
    let (address, _) =
        control_server(vec![Some("250 OK"), Some("552 Unrecognized signal")]).await;
    let rotation = controller(&address, Duration::from_secs(2));

    let err = rotation.rotate().await.unwrap_err();

    assert!(matches!(err, ControlError::SignalRejected { .. }), "{err:?}");
    assert_eq!(rotation.identity().generation(), 0);
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_dial() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let rotation = controller(&address, Duration::from_secs(2));
    let err = rotation.rotate().await.unwrap_err();

    assert!(matches!(err, ControlError::Dial { .. }), "{err:?}");
    assert_eq!(rotation.identity().generation(), 0);
}

#[tokio::test]
async fn test_silent_endpoint_times_out() {
    let (address, _) = control_server(vec![None]).await;
    let rotation = controller(&address, Duration::from_millis(200));

    let err = rotation.rotate().await.unwrap_err();

    assert!(
        matches!(
            err,
            ControlError::Timeout {
                step: ControlStep::Authenticate
            }
        ),
        "{err:?}"
    );
    assert_eq!(rotation.identity().generation(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_mixed_epochs() {
    let (address, _) = control_server(vec![Some("250 OK"), Some("250 OK")]).await;
    let rotation = Arc::new(controller(&address, Duration::from_secs(2)));
    let done = Arc::new(AtomicBool::new(false));

    let mut readers = Vec::new();
    for _ in 0..8 {
        let identity = Arc::clone(rotation.identity());
        let done = Arc::clone(&done);
        readers.push(tokio::spawn(async move {
            let mut last = 0;
            while !done.load(Ordering::Relaxed) {
                let epoch = identity.current();
                assert!(epoch.is_consistent());
                assert!(epoch.generation() >= last);
                last = epoch.generation();
                tokio::task::yield_now().await;
            }
        }));
    }

    let mut rotations = Vec::new();
    for _ in 0..20 {
        let rotation = Arc::clone(&rotation);
        rotations.push(tokio::spawn(async move { rotation.rotate().await }));
    }
    let mut generations = Vec::new();
    for handle in rotations {
        generations.push(handle.await.unwrap().unwrap());
    }

    done.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.await.unwrap();
    }

    generations.sort_unstable();
    assert_eq!(generations, (1..=20).collect::<Vec<u64>>());
    assert_eq!(rotation.identity().generation(), 20);
    assert_eq!(rotation.completed(), 20);
}
