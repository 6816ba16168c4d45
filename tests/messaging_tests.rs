//! Outbound queueing, frame delivery and decode-failure isolation.

mod common;

use common::{drain_events, fast_options, quiet_timeouts, wait_for_event, MockFactory};
use pulse_link::{ClientEvent, ConnectionOptions, PulseLinkClient};
use serde_json::json;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn client_with(factory: &MockFactory, options: ConnectionOptions) -> PulseLinkClient {
    PulseLinkClient::builder("ws://localhost:9999/app/test")
        .options(options)
        .timeouts(quiet_timeouts())
        .transport_factory(factory.clone())
        .build()
        .unwrap()
}

#[tokio::test]
async fn connected_send_goes_straight_to_the_wire() {
    let factory = MockFactory::new();
    let client = client_with(&factory, fast_options());

    client.connect().await.unwrap();
    client.send("chat.message", json!({"body": "hi"})).await.unwrap();

    let conn = factory.conn(0);
    conn.wait_for_sent(|sent| sent.iter().any(|s| s.contains("chat.message")), WAIT)
        .await;
    let frames = conn.sent_with_event("chat.message");
    assert_eq!(frames[0]["data"]["body"], "hi");
}

#[tokio::test]
async fn offline_sends_are_flushed_in_order_on_connect() {
    let factory = MockFactory::new();
    let client = client_with(&factory, fast_options());

    client.send("m1", json!(1)).await.unwrap();
    client.send("m2", json!(2)).await.unwrap();
    client.send("m3", json!(3)).await.unwrap();

    client.connect().await.unwrap();
    let conn = factory.conn(0);
    conn.wait_for_sent(|sent| sent.len() >= 3, WAIT).await;

    let events: Vec<String> = conn
        .sent()
        .iter()
        .map(|s| serde_json::from_str::<serde_json::Value>(s).unwrap()["event"]
            .as_str()
            .unwrap()
            .to_string())
        .collect();
    assert_eq!(&events[..3], &["m1", "m2", "m3"]);
}

#[tokio::test]
async fn full_queue_drops_the_oldest_message() {
    let factory = MockFactory::new();
    let client = client_with(&factory, fast_options().with_max_queue_size(2));

    client.send("m1", json!(null)).await.unwrap();
    client.send("m2", json!(null)).await.unwrap();
    client.send("m3", json!(null)).await.unwrap();

    client.connect().await.unwrap();
    let conn = factory.conn(0);
    conn.wait_for_sent(|sent| sent.len() >= 2, WAIT).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let sent = conn.sent();
    assert!(!sent.iter().any(|s| s.contains("m1")), "oldest kept: {sent:?}");
    assert!(sent.iter().any(|s| s.contains("m2")));
    assert!(sent.iter().any(|s| s.contains("m3")));
}

#[tokio::test]
async fn queue_survives_a_reconnect() {
    let factory = MockFactory::new();
    let client = client_with(&factory, fast_options());
    let mut events = client.take_events().await.unwrap();

    client.connect().await.unwrap();
    factory.conn(0).inject_error("connection reset");
    wait_for_event(&mut events, WAIT, |e| matches!(e, ClientEvent::Close { .. })).await;

    // Buffered while the retry is pending.
    client.send("later", json!({"n": 1})).await.unwrap();

    factory.wait_for_conns(2, WAIT).await;
    let conn2 = factory.conn(1);
    conn2
        .wait_for_sent(|sent| sent.iter().any(|s| s.contains("later")), WAIT)
        .await;
}

#[tokio::test]
async fn write_failure_requeues_and_emits_send_error() {
    let factory = MockFactory::new();
    let client = client_with(&factory, fast_options());
    let mut events = client.take_events().await.unwrap();

    client.connect().await.unwrap();
    let conn = factory.conn(0);
    conn.fail_writes(true);

    client.send("chat.message", json!({"body": "hi"})).await.unwrap();
    wait_for_event(&mut events, WAIT, |e| matches!(e, ClientEvent::SendError { .. })).await;

    // Recovers after a reconnect flushes the queue.
    conn.inject_error("connection reset");
    factory.wait_for_conns(2, WAIT).await;
    let conn2 = factory.conn(1);
    conn2
        .wait_for_sent(|sent| sent.iter().any(|s| s.contains("chat.message")), WAIT)
        .await;
}

#[tokio::test]
async fn malformed_frame_emits_one_parse_error_and_nothing_else() {
    let factory = MockFactory::new();
    let client = client_with(&factory, fast_options());
    let mut events = client.take_events().await.unwrap();

    client.connect().await.unwrap();
    wait_for_event(&mut events, WAIT, |e| matches!(e, ClientEvent::Open)).await;
    let conn = factory.conn(0);
    conn.inject_text("{not json");

    let event = wait_for_event(&mut events, WAIT, |e| {
        matches!(e, ClientEvent::ParseError { .. })
    })
    .await;
    if let ClientEvent::ParseError { raw, .. } = event {
        assert_eq!(raw, "{not json");
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    let later = drain_events(&mut events);
    assert!(
        !later.iter().any(|e| {
            matches!(
                e,
                ClientEvent::ParseError { .. } | ClientEvent::Close { .. } | ClientEvent::Error { .. }
            )
        }),
        "unexpected follow-up events: {later:?}"
    );
    assert!(client.is_connected());
}

#[tokio::test]
async fn application_frames_are_surfaced_with_channel() {
    let factory = MockFactory::new();
    let client = client_with(&factory, fast_options());
    let mut events = client.take_events().await.unwrap();

    client.connect().await.unwrap();
    let conn = factory.conn(0);
    // Data double-encoded as a JSON string, as the wire format allows.
    conn.inject_text(
        json!({
            "event": "order.created",
            "channel": "orders",
            "data": json!({"id": 7}).to_string(),
        })
        .to_string(),
    );

    let event = wait_for_event(&mut events, WAIT, |e| {
        matches!(e, ClientEvent::Message { .. })
    })
    .await;
    match event {
        ClientEvent::Message { event, data, channel } => {
            assert_eq!(event, "order.created");
            assert_eq!(data["id"], 7);
            assert_eq!(channel.as_deref(), Some("orders"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
