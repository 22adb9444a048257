#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end transport test: a real TCP server, a framed client, and the
//! map-location request/response loop over the wire.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use tokio::sync::mpsc;

use zone_protocol::config::ProtocolConfig;
use zone_protocol::core::registry::PacketRegistry;
use zone_protocol::dispatch::{run_ordered, DispatchEvent, Dispatcher};
use zone_protocol::replication::map::{
    LocationSpec, MapLocationCache, MapLocationsRequest, MapLocationsResponse, MapTier,
    TierVersions,
};
use zone_protocol::transport::tcp::{self, Server};

fn point(name: &str) -> LocationSpec {
    LocationSpec {
        name: name.to_string(),
        x: 12.0,
        y: 7.5,
        category: 3,
        subcategory: 1,
        active: false,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn map_request_response_over_tcp() {
    // Server side: registry, dispatcher, seeded cache.
    let registry = Arc::new(PacketRegistry::new());
    registry
        .register(MapLocationsRequest::NAME, MapLocationsRequest::decode)
        .unwrap();

    let cache = Arc::new(MapLocationCache::new());
    cache.append(
        MapTier::Static,
        "tatooine",
        vec![point("mos eisley"), point("mos espa"), point("anchorhead")],
    );

    let (dispatcher, events) = Dispatcher::new();

    let config = ProtocolConfig::default_with_overrides(|c| {
        c.server.address = "127.0.0.1:0".to_string();
    });
    let server = Server::bind(config.clone(), registry, dispatcher)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let sessions = server.sessions();

    // Event consumer: answer map requests through the session directory.
    let handler_cache = cache.clone();
    tokio::spawn(run_ordered(events, move |event| {
        if let DispatchEvent::InboundPacket { session_id, packet } = event {
            if let Some(request) = packet.as_any().downcast_ref::<MapLocationsRequest>() {
                let response = handler_cache.query(&request.region, request.seen);
                if let Some(session) = sessions.get(*session_id) {
                    session.send_packet(&response.encode()).unwrap();
                }
            }
        }
    }));

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server_task = tokio::spawn(server.run_with_shutdown(shutdown_rx));

    // Client side: framed stream over the same codec settings.
    let mut client = tcp::connect(&addr.to_string(), &config).await.unwrap();

    // First exchange: stale versions, expect the full static list.
    let request = MapLocationsRequest {
        region: "tatooine".to_string(),
        seen: TierVersions {
            static_version: 1,
            dynamic_version: 1,
            persistent_version: 1,
        },
    };
    client.send(Bytes::from(request.encode())).await.unwrap();

    let frame = tokio::time::timeout(
        Duration::from_secs(5),
        tcp::next_application_frame(&mut client),
    )
    .await
    .expect("server must answer")
    .expect("stream open");
    let response = MapLocationsResponse::decode(&frame.payload).unwrap();
    let response = response
        .as_any()
        .downcast_ref::<MapLocationsResponse>()
        .unwrap();
    assert_eq!(response.region, "tatooine");
    let entries = response.static_locations.as_ref().expect("stale tier sent");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].name, "mos eisley");
    assert_eq!(
        entries.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(response.dynamic_locations.is_none());

    // Second exchange: present the versions just received, expect no update.
    let request = MapLocationsRequest {
        region: "tatooine".to_string(),
        seen: response.versions,
    };
    client.send(Bytes::from(request.encode())).await.unwrap();

    let frame = tokio::time::timeout(
        Duration::from_secs(5),
        tcp::next_application_frame(&mut client),
    )
    .await
    .expect("server must answer")
    .expect("stream open");
    let response = MapLocationsResponse::decode(&frame.payload).unwrap();
    let response = response
        .as_any()
        .downcast_ref::<MapLocationsResponse>()
        .unwrap();
    assert!(response.static_locations.is_none(), "client is current");
    assert!(response.persistent_locations.is_none());

    drop(client);
    shutdown_tx.send(()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(15), server_task)
        .await
        .expect("graceful shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_packets_do_not_break_the_stream() {
    let registry = Arc::new(PacketRegistry::new());
    registry
        .register(MapLocationsRequest::NAME, MapLocationsRequest::decode)
        .unwrap();
    let (dispatcher, events) = Dispatcher::new();

    let received: Arc<std::sync::Mutex<Vec<String>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = received.clone();
    tokio::spawn(run_ordered(events, move |event| {
        if let DispatchEvent::InboundPacket { packet, .. } = event {
            if let Some(request) = packet.as_any().downcast_ref::<MapLocationsRequest>() {
                sink.lock().unwrap().push(request.region.clone());
            }
        }
    }));

    let config = ProtocolConfig::default_with_overrides(|c| {
        c.server.address = "127.0.0.1:0".to_string();
    });
    let server = Server::bind(config.clone(), registry, dispatcher)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server_task = tokio::spawn(server.run_with_shutdown(shutdown_rx));

    let mut client = tcp::connect(&addr.to_string(), &config).await.unwrap();

    // A body with an unregistered type identifier, then a real request.
    let unknown = zone_protocol::core::packet::application_body(0x1234_5678, b"noise");
    client.send(Bytes::from(unknown)).await.unwrap();
    let request = MapLocationsRequest {
        region: "naboo".to_string(),
        seen: TierVersions::default(),
    };
    client.send(Bytes::from(request.encode())).await.unwrap();

    // The unknown packet is dropped silently; the stream keeps decoding.
    for _ in 0..500 {
        if !received.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*received.lock().unwrap(), vec!["naboo".to_string()]);

    drop(client);
    shutdown_tx.send(()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(15), server_task)
        .await
        .expect("graceful shutdown")
        .unwrap()
        .unwrap();
}
