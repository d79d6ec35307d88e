//! Concurrent broadcast tests driving sessions without a network

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_relay::metrics::RelayMetrics;
use signal_relay::{
    ConnectionHandle, ConnectionId, Payload, Registry, RelayDispatcher, SessionEvent, SessionState,
};
use tokio::sync::Barrier;

const SENDERS: usize = 8;
const MESSAGES: usize = 250;
/// Room for everything a sender's receiver collects before it is drained
const QUEUE_CAPACITY: usize = 16_384;

fn dispatcher() -> RelayDispatcher {
    RelayDispatcher::new(
        Arc::new(Registry::new()),
        Arc::new(RelayMetrics::new().unwrap()),
    )
}

fn text(payload: &Payload) -> String {
    String::from_utf8(payload.as_bytes().to_vec()).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_self_delivery_under_churn() {
    let dispatcher = dispatcher();
    let all_registered = Arc::new(Barrier::new(SENDERS));
    let all_sent = Arc::new(Barrier::new(SENDERS));
    let stop_churn = Arc::new(AtomicBool::new(false));

    let churn = {
        let dispatcher = dispatcher.clone();
        let stop_churn = Arc::clone(&stop_churn);
        tokio::spawn(async move {
            let mut round = 0u64;
            while !stop_churn.load(Ordering::Relaxed) {
                let id = ConnectionId::new(format!("churn-{}", round));
                let (handle, mut rx) = ConnectionHandle::channel();
                let mut session = dispatcher.open_session(id.clone(), handle);
                session.handle_event(SessionEvent::Accept);
                session.handle_event(SessionEvent::Message(Payload::Text(format!("{}:0", id).into())));
                tokio::task::yield_now().await;
                session.handle_event(SessionEvent::Close);
                session.handle_event(SessionEvent::Close);

                while let Ok(payload) = rx.try_recv() {
                    assert!(!text(&payload).starts_with(&format!("{}:", id)), "churn client got its own message");
                }
                round += 1;
            }
            round
        })
    };

    let mut senders = Vec::new();
    for s in 0..SENDERS {
        let dispatcher = dispatcher.clone();
        let all_registered = Arc::clone(&all_registered);
        let all_sent = Arc::clone(&all_sent);

        senders.push(tokio::spawn(async move {
            let id = ConnectionId::new(format!("sender-{}", s));
            let (handle, mut rx) = ConnectionHandle::bounded(QUEUE_CAPACITY);
            let mut session = dispatcher.open_session(id.clone(), handle);
            session.handle_event(SessionEvent::Accept);
            all_registered.wait().await;

            for seq in 0..MESSAGES {
                session.handle_event(SessionEvent::Message(Payload::Text(format!("{}:{}", id, seq).into())));
                if seq % 16 == 0 {
                    tokio::task::yield_now().await;
                }
            }

            all_sent.wait().await;
            assert_eq!(session.handle_event(SessionEvent::Close), SessionState::Closed);

            let mut last_seq: HashMap<String, usize> = HashMap::new();
            let mut from_senders = 0;
            while let Ok(payload) = rx.try_recv() {
                let body = text(&payload);
                let (origin, seq) = body.split_once(':').unwrap();
                assert_ne!(origin, id.as_str(), "sender got its own message");

                if origin.starts_with("sender-") {
                    let seq: usize = seq.parse().unwrap();
                    if let Some(previous) = last_seq.insert(origin.to_string(), seq) {
                        assert!(seq > previous, "messages from {} arrived out of order", origin);
                    }
                    from_senders += 1;
                }
            }
            from_senders
        }));
    }

    for sender in senders {
        let received = sender.await.unwrap();
        assert_eq!(received, MESSAGES * (SENDERS - 1));
    }

    stop_churn.store(true, Ordering::Relaxed);
    churn.await.unwrap();

    assert!(dispatcher.registry().is_empty());
    assert_eq!(dispatcher.metrics().active_connections(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_and_unregister_leaves_registry_consistent() {
    let dispatcher = dispatcher();
    let mut tasks = Vec::new();

    for t in 0..16 {
        let dispatcher = dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..100 {
                let (handle, _rx) = ConnectionHandle::channel();
                let mut session = dispatcher.open_session(ConnectionId::new(format!("{}-{}", t, round)), handle);
                session.handle_event(SessionEvent::Accept);
                session.handle_event(SessionEvent::Message(Payload::from("ping")));
                if round % 2 == 0 {
                    session.handle_event(SessionEvent::Close);
                }
                // odd rounds are dropped while open
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    assert!(dispatcher.registry().is_empty());
    assert_eq!(dispatcher.metrics().total_connections(), 1600);
    assert_eq!(dispatcher.metrics().active_connections(), 0);
}
