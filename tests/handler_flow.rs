//! Two handler instances subscribed to the same broker, sharing one lock store.

use std::sync::Arc;
use std::time::Duration;

use nodelink::Handler;
use nodelink::handler::TX_TOPIC;
use nodelink::handler::engine::DataDownReceiver;
use nodelink::payload::DataDownPayload;
use nodelink::persistence::SledLockStore;
use nodelink::transport::LocalTransport;
use serde_json::json;
use tokio::time::{sleep, timeout};

struct Instance {
    handler: Handler,
    data_down: DataDownReceiver,
    transport: Arc<LocalTransport>,
}

async fn start_instance(store: &SledLockStore) -> Instance {
    let (transport, events) = LocalTransport::new();
    let (handler, data_down) =
        Handler::with_transport(transport.clone(), events, Arc::new(store.clone()));
    transport.connect();

    timeout(Duration::from_secs(5), async {
        while !transport.subscriptions().iter().any(|s| s == TX_TOPIC) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("instance did not subscribe");

    Instance {
        handler,
        data_down,
        transport,
    }
}

fn shared_store() -> SledLockStore {
    SledLockStore::from_db(sled::Config::new().temporary(true).open().unwrap())
}

fn command(reference: &str, dev_eui: &str) -> Vec<u8> {
    json!({
        "reference": reference,
        "confirmed": true,
        "devEUI": dev_eui,
        "fPort": 2,
        "data": "3q2+7w=="
    })
    .to_string()
    .into_bytes()
}

async fn collect(rx: &mut DataDownReceiver, window: Duration) -> Vec<DataDownPayload> {
    let mut received = Vec::new();
    while let Ok(Some(pl)) = timeout(window, rx.recv()).await {
        received.push(pl);
    }
    received
}

#[tokio::test]
async fn fan_out_is_forwarded_by_one_instance() {
    let store = shared_store();
    let mut a = start_instance(&store).await;
    let mut b = start_instance(&store).await;

    let topic = "application/0102030405060708/node/D1/tx";
    assert!(a.transport.deliver(topic, command("r1", "D1")));
    sleep(Duration::from_millis(50)).await;
    assert!(b.transport.deliver(topic, command("r1", "D1")));

    let from_a = collect(&mut a.data_down, Duration::from_millis(200)).await;
    let from_b = collect(&mut b.data_down, Duration::from_millis(200)).await;

    assert_eq!(from_a.len() + from_b.len(), 1);
    let pl = from_a.into_iter().chain(from_b).next().unwrap();
    assert_eq!(pl.reference, "r1");
    assert_eq!(pl.dev_eui, "D1");
    assert!(pl.confirmed);
    assert_eq!(pl.data, vec![0xde, 0xad, 0xbe, 0xef]);
}

#[tokio::test]
async fn concurrent_fan_out_to_many_instances() {
    let store = shared_store();
    let mut instances = Vec::new();
    for _ in 0..4 {
        instances.push(start_instance(&store).await);
    }

    let topic = "application/01/node/0807060504030201/tx";
    for _ in 0..3 {
        for instance in &instances {
            instance
                .transport
                .deliver(topic, command("ref-7", "0807060504030201"));
        }
    }

    let mut total = 0;
    for instance in &mut instances {
        total += collect(&mut instance.data_down, Duration::from_millis(200))
            .await
            .len();
    }
    assert_eq!(total, 1);
}

#[tokio::test]
async fn distinct_commands_are_all_forwarded() {
    let store = shared_store();
    let mut a = start_instance(&store).await;
    let mut b = start_instance(&store).await;

    for reference in ["r1", "r2", "r3"] {
        a.transport
            .deliver("application/01/node/D1/tx", command(reference, "D1"));
        b.transport
            .deliver("application/01/node/D1/tx", command(reference, "D1"));
    }

    let mut references: Vec<String> = collect(&mut a.data_down, Duration::from_millis(200))
        .await
        .into_iter()
        .chain(collect(&mut b.data_down, Duration::from_millis(200)).await)
        .map(|pl| pl.reference)
        .collect();
    references.sort();
    assert_eq!(references, vec!["r1", "r2", "r3"]);
}

#[tokio::test]
async fn closed_instance_leaves_delivery_to_sibling() {
    let store = shared_store();
    let a = start_instance(&store).await;
    let mut b = start_instance(&store).await;

    a.handler.close().await.unwrap();
    assert!(!a.transport.deliver("application/01/node/D1/tx", command("r9", "D1")));
    assert!(b.transport.deliver("application/01/node/D1/tx", command("r9", "D1")));

    let pl = timeout(Duration::from_secs(1), b.data_down.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pl.reference, "r9");

    b.handler.close().await.unwrap();
    assert_eq!(b.data_down.recv().await, None);
}
