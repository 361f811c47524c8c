//! Connection lifecycle through the hub.

use std::time::Duration;

use trail_relay::connection::{CloseReason, PeerFrame};
use trail_relay::{RelayError, RelayHub};

use crate::support::{eventually, position, TestClient};

#[tokio::test]
async fn disconnect_deregisters_and_reconnect_gets_a_new_id() {
    let hub = RelayHub::builder().build().unwrap();

    let first = TestClient::connect(&hub);
    let first_id = first.id;
    assert_eq!(hub.metrics().active_subscribers(), 1);

    let outcome = first.disconnect().await;
    assert_eq!(outcome.id, first_id);
    assert_eq!(outcome.reason, CloseReason::PeerClosed);
    assert!(!hub.registry().contains(first_id));
    assert_eq!(hub.metrics().active_subscribers(), 0);

    let second = TestClient::connect(&hub);
    assert_ne!(second.id, first_id);
    assert_eq!(hub.subscriber_count(), 1);
}

#[tokio::test]
async fn inbound_text_is_ignored() {
    let hub = RelayHub::builder().build().unwrap();
    let mut client = TestClient::connect(&hub);

    client.send_frame(Ok(PeerFrame::Text("hello".into())));
    client.send_frame(Ok(PeerFrame::Other));
    hub.ingest(position("A", 1)).unwrap();

    assert_eq!(client.next_json().await["athlete"], "A");
    assert!(hub.registry().contains(client.id));
}

#[tokio::test]
async fn protocol_error_closes_the_connection() {
    let hub = RelayHub::builder().build().unwrap();
    let client = TestClient::connect(&hub);
    let id = client.id;

    client.send_frame(Err("invalid frame".into()));
    let outcome = client.outcome().await;

    assert_eq!(
        outcome.reason,
        CloseReason::ProtocolError("invalid frame".into())
    );
    assert!(!hub.registry().contains(id));
}

#[tokio::test]
async fn stalled_write_times_out_and_deregisters() {
    let hub = RelayHub::builder()
        .send_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let mut fast = TestClient::connect(&hub);
    let stalled = TestClient::connect_with_buffer(&hub, 0);
    let stalled_id = stalled.id;

    for seq in 1..=3 {
        hub.ingest(position("A", seq)).unwrap();
    }

    let outcome = stalled.outcome().await;
    assert!(matches!(outcome.reason, CloseReason::SendFailed(_)));
    assert_eq!(outcome.delivered, 1);
    assert!(!hub.registry().contains(stalled_id));

    for seq in 1..=3u64 {
        assert_eq!(fast.next_json().await["seq"], seq);
    }
    assert!(hub.registry().contains(fast.id));
}

#[tokio::test]
async fn shutdown_flushes_queued_events_then_closes() {
    let hub = RelayHub::builder().build().unwrap();
    let mut client = TestClient::connect(&hub);

    for seq in 1..=3 {
        hub.ingest(position("A", seq)).unwrap();
    }
    hub.shutdown();

    for seq in 1..=3u64 {
        assert_eq!(client.next_json().await["seq"], seq);
    }
    let frames_closed = client.next().await.is_none();
    assert!(frames_closed);

    assert!(eventually(|| hub.subscriber_count() == 0).await);
    assert_eq!(
        hub.connections().accept().unwrap_err(),
        RelayError::RegistryUnavailable
    );
    assert_eq!(
        hub.ingest(position("A", 4)).unwrap_err(),
        RelayError::RegistryUnavailable
    );
}
