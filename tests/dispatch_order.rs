#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Ordered dispatch integration tests
//! Consumers run on a multi-threaded runtime with one spawned task per event;
//! the predecessor gates alone must produce per-session FIFO ordering.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;

use zone_protocol::core::packet::{ControllerPacket, GamePacket};
use zone_protocol::dispatch::{run_ordered, DispatchEvent, Dispatcher};

fn tagged(tag: u32) -> Arc<dyn GamePacket> {
    Arc::new(ControllerPacket {
        controller_id: tag,
        receiver_id: 0,
        body: vec![],
    })
}

fn tag_of(event: &DispatchEvent) -> Option<(u64, u32)> {
    match event {
        DispatchEvent::InboundPacket { session_id, packet } => {
            let ctrl = packet.as_any().downcast_ref::<ControllerPacket>()?;
            Some((*session_id, ctrl.controller_id))
        }
        _ => None,
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

// ============================================================================
// ARRIVAL-ORDER GUARANTEE
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn two_intakes_complete_in_arrival_order() {
    let (dispatcher, stream) = Dispatcher::new();
    let completed: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = completed.clone();
    tokio::spawn(run_ordered(stream, move |event| {
        // Jittered handler: without the gates this would scramble the order.
        std::thread::sleep(Duration::from_millis(rand::rng().random_range(0..5)));
        if let Some((_, tag)) = tag_of(event) {
            sink.lock().unwrap().push(tag);
        }
    }));

    dispatcher.open_session(1).unwrap();
    // First intake: A, B, C. Second intake: D.
    for tag in [1, 2, 3] {
        dispatcher.publish_packet(1, tagged(tag)).unwrap();
    }
    dispatcher.publish_packet(1, tagged(4)).unwrap();

    wait_for(|| completed.lock().unwrap().len() == 4).await;
    assert_eq!(*completed.lock().unwrap(), vec![1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn per_session_order_holds_across_many_sessions() {
    let (dispatcher, stream) = Dispatcher::new();
    let completed: Arc<Mutex<Vec<(u64, u32)>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = completed.clone();
    tokio::spawn(run_ordered(stream, move |event| {
        std::thread::sleep(Duration::from_millis(rand::rng().random_range(0..3)));
        if let Some(entry) = tag_of(event) {
            sink.lock().unwrap().push(entry);
        }
    }));

    const SESSIONS: u64 = 4;
    const PACKETS: u32 = 50;

    // Each session publishes from its own task: publication is concurrent
    // across sessions, sequential within one.
    let mut publishers = Vec::new();
    for session_id in 1..=SESSIONS {
        let dispatcher = dispatcher.clone();
        publishers.push(tokio::spawn(async move {
            dispatcher.open_session(session_id).unwrap();
            for tag in 1..=PACKETS {
                dispatcher.publish_packet(session_id, tagged(tag)).unwrap();
                if tag % 7 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for publisher in publishers {
        publisher.await.unwrap();
    }

    wait_for(|| completed.lock().unwrap().len() == (SESSIONS * PACKETS as u64) as usize).await;

    let completed = completed.lock().unwrap();
    for session_id in 1..=SESSIONS {
        let order: Vec<u32> = completed
            .iter()
            .filter(|(id, _)| *id == session_id)
            .map(|(_, tag)| *tag)
            .collect();
        let expected: Vec<u32> = (1..=PACKETS).collect();
        assert_eq!(order, expected, "session {session_id} out of order");
    }
}

// ============================================================================
// CHAIN LIFECYCLE
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn close_event_is_ordered_after_packets() {
    let (dispatcher, stream) = Dispatcher::new();
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = log.clone();
    tokio::spawn(run_ordered(stream, move |event| {
        let entry = match event {
            DispatchEvent::SessionOpened { .. } => "open".to_string(),
            DispatchEvent::InboundPacket { .. } => "packet".to_string(),
            DispatchEvent::SessionClosed { .. } => "close".to_string(),
        };
        sink.lock().unwrap().push(entry);
    }));

    dispatcher.open_session(5).unwrap();
    dispatcher.publish_packet(5, tagged(1)).unwrap();
    dispatcher.close_session(5).unwrap();

    wait_for(|| log.lock().unwrap().len() == 3).await;
    assert_eq!(*log.lock().unwrap(), vec!["open", "packet", "close"]);
}
