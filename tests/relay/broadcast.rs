//! Fan-out behaviour across several subscribers.

use std::sync::Arc;

use serde_json::json;
use trail_relay::registry::Subscriber;
use trail_relay::RelayHub;

use crate::support::{eventually, position, TestClient};

#[tokio::test]
async fn event_with_no_subscribers_still_succeeds() {
    let hub = RelayHub::builder().build().unwrap();

    let report = hub.ingest(position("A", 1)).unwrap();

    assert_eq!(report.reached, 0);
    assert!(report.dropped.is_empty());
    assert_eq!(hub.metrics().processed(), 1);
}

#[tokio::test]
async fn three_subscribers_each_get_exactly_one_copy() {
    let hub = RelayHub::builder().build().unwrap();
    let mut clients: Vec<_> = (0..3).map(|_| TestClient::connect(&hub)).collect();

    let event = position("A", 1);
    let report = hub.ingest(event.clone()).unwrap();
    assert_eq!(report.reached, 3);

    for client in clients.iter_mut() {
        assert_eq!(client.next_json().await, event);
        assert!(client.is_idle().await);
    }
    assert_eq!(hub.metrics().processed(), 1);
}

#[tokio::test]
async fn closed_subscriber_is_pruned_and_others_still_receive() {
    let hub = RelayHub::builder().build().unwrap();
    let mut live = TestClient::connect(&hub);

    // Registered handle whose transport is already gone.
    let (stale, mailbox) = Subscriber::channel(8);
    let stale_id = hub.registry().add(stale);
    drop(mailbox);
    assert_eq!(hub.subscriber_count(), 2);

    let report = hub.ingest(position("A", 1)).unwrap();

    assert_eq!(report.reached, 1);
    assert_eq!(report.dropped_ids(), vec![stale_id]);
    assert_eq!(live.next_json().await["athlete"], "A");
    assert_eq!(hub.subscriber_count(), 1);
    assert!(!hub.registry().contains(stale_id));
    assert_eq!(hub.metrics().dropped_subscribers(), 1);
    assert_eq!(hub.metrics().active_subscribers(), 1);
}

#[tokio::test]
async fn per_subscriber_order_matches_ingest_order() {
    let hub = RelayHub::builder().build().unwrap();
    let mut a = TestClient::connect(&hub);
    let mut b = TestClient::connect(&hub);

    for seq in 1..=50 {
        hub.ingest(position("A", seq)).unwrap();
    }

    for client in [&mut a, &mut b] {
        for seq in 1..=50u64 {
            assert_eq!(client.next_json().await["seq"], seq);
        }
    }
}

#[tokio::test]
async fn full_mailbox_drops_only_the_slow_subscriber() {
    let hub = RelayHub::builder().mailbox_capacity(2).build().unwrap();

    // Never polled: its connection task blocks on the first write.
    let slow = TestClient::connect_with_buffer(&hub, 0);
    let slow_id = slow.id;

    let mut reached = Vec::new();
    for seq in 1..=6 {
        reached.push(hub.ingest(position("A", seq)).unwrap());
    }

    assert!(reached.iter().any(|r| r.dropped_ids() == vec![slow_id]));
    assert!(!hub.registry().contains(slow_id));
    assert_eq!(hub.metrics().dropped_subscribers(), 1);
    drop(slow);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingest_and_churn_keep_registry_consistent() {
    let hub = RelayHub::builder().mailbox_capacity(1024).build().unwrap();
    let mut steady = TestClient::connect(&hub);

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let hub = hub.clone();
            tokio::spawn(async move {
                for seq in 0..25 {
                    hub.ingest(json!({ "producer": p, "seq": seq })).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let churn = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                let client = TestClient::connect(&hub);
                tokio::task::yield_now().await;
                client.disconnect().await;
            }
        })
    };

    for producer in producers {
        producer.await.unwrap();
    }
    churn.await.unwrap();

    assert!(eventually(|| hub.subscriber_count() == 1).await);
    assert_eq!(hub.metrics().active_subscribers(), 1);
    assert_eq!(hub.metrics().processed(), 100);

    // Per-producer order survives concurrent ingestion.
    let mut last = [-1i64; 4];
    for _ in 0..100 {
        let event = steady.next_json().await;
        let p = event["producer"].as_u64().unwrap() as usize;
        let seq = event["seq"].as_i64().unwrap();
        assert!(seq > last[p]);
        last[p] = seq;
    }
    assert!(steady.is_idle().await);
}

#[tokio::test]
async fn payload_is_shared_not_copied_per_subscriber() {
    let hub = RelayHub::builder().build().unwrap();
    let (a, mut a_box) = Subscriber::channel(4);
    let (b, mut b_box) = Subscriber::channel(4);
    hub.registry().add(a);
    hub.registry().add(b);

    hub.ingest(json!({ "athlete": "A" })).unwrap();

    let first = a_box.try_recv().unwrap();
    let second = b_box.try_recv().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
