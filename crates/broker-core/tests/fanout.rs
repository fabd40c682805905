//! Real-session coverage of the fan-out ordering guarantees spec §5/§8
//! make: idempotent subscription, per-origin publish order, and no
//! cross-subscriber-count duplication.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rpc_protocol::Message;
use serde_json::Value;
use tokio::time::sleep;

async fn settle() {
    sleep(Duration::from_millis(30)).await;
}

#[tokio::test]
async fn repeated_subscribe_yields_one_fanout_copy_per_publish() {
    let (addr, _broker) = rpc_test_support::spawn_broker().await.unwrap();

    let received = Arc::new(Mutex::new(0usize));
    let received_cb = received.clone();
    let mut handlers = std::collections::HashMap::new();
    handlers.insert(
        "notifysub".to_owned(),
        Arc::new(move |_msg: Message, _session: rpc_session::SessionHandle| -> rpc_session::HandlerFuture {
            let received_cb = received_cb.clone();
            Box::pin(async move {
                *received_cb.lock().unwrap() += 1;
            })
        }) as rpc_session::MethodHandler,
    );

    let subscriber = rpc_session::FramedSession::connect(addr, handlers, rpc_session::SessionHooks::default())
        .await
        .unwrap();

    // Subscribe three times; the registry must treat this as one entry.
    for _ in 0..3 {
        subscriber.notify("subscribe", &[Value::String("command".to_owned())]);
    }
    settle().await;

    let publisher = rpc_test_support::connect_bare(addr).await.unwrap();
    publisher.notify("publish", &[Value::String("command".to_owned()), Value::String("go".to_owned())]);
    settle().await;

    assert_eq!(*received.lock().unwrap(), 1);
}

#[tokio::test]
async fn same_origin_publishes_arrive_in_source_order() {
    let (addr, _broker) = rpc_test_support::spawn_broker().await.unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let order_cb = order.clone();
    let mut handlers = std::collections::HashMap::new();
    handlers.insert(
        "notifysub".to_owned(),
        Arc::new(move |msg: Message, _session: rpc_session::SessionHandle| -> rpc_session::HandlerFuture {
            let order_cb = order_cb.clone();
            Box::pin(async move {
                if let Message::Notification { params, .. } = msg {
                    if let Some(Value::String(value)) = params.get(1) {
                        order_cb.lock().unwrap().push(value.clone());
                    }
                }
            })
        }) as rpc_session::MethodHandler,
    );
    let subscriber = rpc_session::FramedSession::connect(addr, handlers, rpc_session::SessionHooks::default())
        .await
        .unwrap();
    subscriber.notify("subscribe", &[Value::String("command".to_owned())]);
    settle().await;

    let publisher = rpc_test_support::connect_bare(addr).await.unwrap();
    for token in ["go", "stop", "turn"] {
        publisher.notify("publish", &[Value::String("command".to_owned()), Value::String(token.to_owned())]);
    }
    settle().await;

    assert_eq!(*order.lock().unwrap(), vec!["go", "stop", "turn"]);
}
