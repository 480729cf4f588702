//! Registry and dispatcher behaviour through the public API
//!
//! All sessions use the in-memory transport, so no server or sockets are needed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio_test::{assert_err, assert_ok};

use websocket_broadcast_service::broadcast::{BroadcastDispatcher, BroadcastRequest};
use websocket_broadcast_service::session::{
    MemoryTransport, Payload, RegistryError, SendError, SessionRegistry,
};
use websocket_broadcast_service::triggers::InboundTrigger;
use websocket_broadcast_service::websocket::{ConnectionLifecycle, ConnectionState};

struct TestEnvironment {
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<BroadcastDispatcher>,
}

fn create_test_environment() -> TestEnvironment {
    let registry = Arc::new(SessionRegistry::new());
    let dispatcher = Arc::new(BroadcastDispatcher::with_pool(
        registry.clone(),
        8,
        Duration::from_secs(1),
    ));
    TestEnvironment {
        registry,
        dispatcher,
    }
}

fn connect(
    registry: &SessionRegistry,
    id: &str,
) -> (Arc<MemoryTransport>, mpsc::UnboundedReceiver<Payload>) {
    let (transport, rx) = MemoryTransport::new();
    let transport = Arc::new(transport);
    registry.register(id, transport.clone()).unwrap();
    (transport, rx)
}

fn snapshot_ids(registry: &SessionRegistry) -> HashSet<String> {
    registry
        .snapshot()
        .unwrap()
        .iter()
        .map(|s| s.id.clone())
        .collect()
}

#[tokio::test]
async fn test_broadcast_reaches_all_sessions() {
    let env = create_test_environment();
    let mut receivers = Vec::new();
    for id in ["a", "b", "c"] {
        receivers.push(connect(&env.registry, id));
    }

    let result = env
        .dispatcher
        .broadcast(BroadcastRequest::new("hi/alice"))
        .await
        .unwrap();

    assert_eq!(result.success_count, 3);
    assert!(result.failures.is_empty());
    for (_, rx) in receivers.iter_mut() {
        assert_eq!(rx.recv().await, Some(Payload::from("hi/alice")));
    }

    let expected: HashSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    assert_eq!(snapshot_ids(&env.registry), expected);
}

#[tokio::test]
async fn test_failed_session_is_evicted() {
    let env = create_test_environment();
    let (a, _rx_a) = connect(&env.registry, "a");
    let (_b, mut rx_b) = connect(&env.registry, "b");

    a.fail_with(SendError::Io("connection reset".into()));

    let result = env
        .dispatcher
        .broadcast(BroadcastRequest::new("x"))
        .await
        .unwrap();

    assert_eq!(result.success_count, 1);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].session_id, "a");
    assert_eq!(rx_b.recv().await, Some(Payload::from("x")));

    let expected: HashSet<String> = ["b".to_string()].into_iter().collect();
    assert_eq!(snapshot_ids(&env.registry), expected);
}

#[tokio::test]
async fn test_k_of_n_failures() {
    let env = create_test_environment();
    let n = 20;
    let k = 7;
    let mut transports = Vec::new();
    let mut receivers = Vec::new();
    for i in 0..n {
        let (transport, rx) = connect(&env.registry, &format!("s{}", i));
        transports.push(transport);
        receivers.push(rx);
    }
    for transport in transports.iter().take(k) {
        transport.fail_with(SendError::Closed);
    }

    let result = env
        .dispatcher
        .broadcast(BroadcastRequest::new("payload"))
        .await
        .unwrap();

    assert_eq!(result.success_count, n - k);
    assert_eq!(result.failures.len(), k);

    let remaining = snapshot_ids(&env.registry);
    assert_eq!(remaining.len(), n - k);
    for failure in &result.failures {
        assert!(!remaining.contains(&failure.session_id));
    }

    // Evicted sessions are not retried
    let again = env
        .dispatcher
        .broadcast(BroadcastRequest::new("again"))
        .await
        .unwrap();
    assert_eq!(again.success_count, n - k);
    assert!(again.failures.is_empty());
}

#[tokio::test]
async fn test_duplicate_registration_keeps_original() {
    let env = create_test_environment();
    let (_original, mut rx) = connect(&env.registry, "a");

    let (impostor, _impostor_rx) = MemoryTransport::new();
    let err = assert_err!(env.registry.register("a", Arc::new(impostor)));
    assert_eq!(err, RegistryError::DuplicateSession("a".to_string()));

    let result = assert_ok!(env.dispatcher.broadcast(BroadcastRequest::new("still me")).await);
    assert_eq!(result.success_count, 1);
    assert_eq!(rx.recv().await, Some(Payload::from("still me")));
}

#[test]
fn test_deregister_unknown_is_noop() {
    let registry = SessionRegistry::new();
    assert!(registry.deregister("ghost").is_none());
    assert!(registry.deregister("ghost").is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_snapshot_tracks_register_deregister_sequences() {
    let registry = SessionRegistry::new();
    let mut model: HashSet<String> = HashSet::new();

    // Deterministic pseudo-random operation sequence
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    for _ in 0..2000 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;

        let id = format!("s{}", seed % 16);
        if seed % 3 == 0 {
            registry.deregister(&id);
            model.remove(&id);
        } else {
            let (transport, _rx) = MemoryTransport::new();
            match registry.register(id.clone(), Arc::new(transport)) {
                Ok(_) => assert!(model.insert(id)),
                Err(RegistryError::DuplicateSession(_)) => assert!(model.contains(&id)),
                Err(e) => panic!("unexpected registry error: {e}"),
            }
        }

        assert_eq!(snapshot_ids(&registry), model);
    }
}

#[tokio::test]
async fn test_concurrent_broadcasts_deliver_whole_payloads() {
    let env = create_test_environment();
    let (_a, mut rx) = connect(&env.registry, "a");

    let payloads: Vec<String> = (0..16).map(|i| format!("{:02}", i).repeat(512)).collect();
    let broadcasts: Vec<_> = payloads
        .iter()
        .cloned()
        .map(|p| {
            let dispatcher = env.dispatcher.clone();
            tokio::spawn(async move { dispatcher.broadcast(BroadcastRequest::new(p)).await })
        })
        .collect();
    for handle in broadcasts {
        assert_eq!(handle.await.unwrap().unwrap().success_count, 1);
    }

    let mut seen = HashSet::new();
    for _ in 0..payloads.len() {
        match rx.recv().await {
            Some(Payload::Text(text)) => {
                assert!(payloads.iter().any(|p| p.as_str() == &*text));
                seen.insert(text.to_string());
            }
            other => panic!("unexpected delivery: {other:?}"),
        }
    }
    assert_eq!(seen.len(), payloads.len());
}

#[tokio::test]
async fn test_lifecycle_and_dispatcher_share_registry() {
    let env = create_test_environment();
    let (transport, mut rx) = MemoryTransport::new();
    let transport = Arc::new(transport);

    let mut lifecycle = ConnectionLifecycle::new(env.registry.clone(), "client-1", transport.clone());
    lifecycle.on_open().await.unwrap();

    env.dispatcher
        .broadcast(BroadcastRequest::new("welcome"))
        .await
        .unwrap();
    assert_eq!(rx.recv().await, Some(Payload::from("welcome")));

    lifecycle.on_closing().await;
    assert_eq!(lifecycle.state(), ConnectionState::Closed);
    assert!(transport.is_closed());

    let result = env
        .dispatcher
        .broadcast(BroadcastRequest::new("gone"))
        .await
        .unwrap();
    assert_eq!(result.attempted(), 0);
}

#[tokio::test]
async fn test_trigger_is_fire_and_forget() {
    let env = create_test_environment();
    let (failing, _rx_failing) = connect(&env.registry, "failing");
    let (_ok, mut rx_ok) = connect(&env.registry, "ok");
    failing.fail_with(SendError::Io("broken pipe".into()));

    let (trigger, worker) = InboundTrigger::channel(env.dispatcher.clone(), 8);
    let (shutdown_tx, _) = broadcast::channel(1);
    let worker_handle = tokio::spawn(worker.run(shutdown_tx.subscribe()));

    // Delivery failures never reach the caller
    assert_ok!(trigger.handle_request("alice"));

    let delivered = tokio::time::timeout(Duration::from_secs(2), rx_ok.recv())
        .await
        .unwrap();
    assert_eq!(delivered, Some(Payload::from("alice")));

    // Eviction happens inside the broadcast that the worker awaits
    tokio::time::timeout(Duration::from_secs(2), async {
        while env.registry.contains("failing") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    shutdown_tx.send(()).unwrap();
    worker_handle.await.unwrap();
}
