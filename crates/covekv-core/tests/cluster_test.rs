mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use covekv_core::{
    ping_operation, Cluster, CoveError, Node, NodeBuilder, NodeState, NodeStateListener,
};

use support::{wait_until, Behavior, Fixture};

fn fixture_node(fixture: &Fixture, min: usize, max: usize) -> Node {
    NodeBuilder::new()
        .with_remote_host(fixture.host())
        .with_remote_port(fixture.port())
        .with_min_connections(min)
        .with_max_connections(max)
        .build()
}

#[tokio::test]
async fn operation_success() {
    let mut fixtures = Vec::new();
    for _ in 0..3 {
        fixtures.push(Fixture::spawn(Behavior::PingOk).await);
    }

    let cluster = Cluster::builder()
        .with_nodes(fixtures.iter().map(|f| fixture_node(f, 2, 10)))
        .build();
    cluster.start();

    let future = cluster.execute(ping_operation());
    future.get().await.expect("ping must succeed");
    assert!(future.is_success());
    assert!(future.cause().is_none());

    cluster.shutdown().await;
}

#[tokio::test]
async fn operation_failure() {
    let mut fixtures = Vec::new();
    for _ in 0..3 {
        fixtures.push(Fixture::spawn(Behavior::AcceptThenClose).await);
    }

    let cluster = Cluster::builder()
        .with_nodes(fixtures.iter().map(|f| fixture_node(f, 1, 10)))
        .build();
    cluster.start();

    let future = cluster.execute(ping_operation());
    assert!(future.await_for(Duration::from_secs(5)).await);
    assert!(!future.is_success());
    assert!(matches!(future.cause(), Some(CoveError::Transport(_))));

    cluster.shutdown().await;
}

#[tokio::test]
async fn server_error_is_terminal() {
    let fixture = Fixture::spawn(Behavior::ErrorFrame {
        code: 13,
        message: "overload".to_string(),
    })
    .await;

    let cluster = Cluster::builder()
        .with_node(fixture_node(&fixture, 1, 4))
        .build();
    cluster.start();

    let future = cluster.execute(ping_operation());
    match future.get().await {
        Err(CoveError::Server { code, message }) => {
            assert_eq!(code, 13);
            assert_eq!(message, "overload");
        }
        other => panic!("expected server error, got {other:?}"),
    }
    // Server errors are terminal: no retry attempts on other frames.
    assert_eq!(fixture.request_count(), 1);

    cluster.shutdown().await;
}

struct CountingListener {
    events: Mutex<Vec<(String, NodeState)>>,
}

impl CountingListener {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn count(&self, state: NodeState) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| *s == state)
            .count()
    }

    fn total(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    fn states_for(&self, addr: &str) -> Vec<NodeState> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a == addr)
            .map(|(_, s)| *s)
            .collect()
    }
}

impl NodeStateListener for CountingListener {
    fn node_state_changed(&self, node: &Node, state: NodeState) {
        self.events
            .lock()
            .unwrap()
            .push((node.addr().to_string(), state));
    }
}

#[tokio::test]
async fn state_listener_sees_full_history() {
    let mut fixtures = Vec::new();
    for _ in 0..3 {
        fixtures.push(Fixture::spawn(Behavior::PingOk).await);
    }
    let nodes: Vec<Node> = fixtures.iter().map(|f| fixture_node(f, 1, 4)).collect();
    let addrs: Vec<String> = nodes.iter().map(|n| n.addr().to_string()).collect();

    let cluster = Cluster::builder().with_nodes(nodes).build();

    let listener = Arc::new(CountingListener::new());
    cluster.register_node_state_listener(listener.clone());

    cluster.start();
    cluster.shutdown().await;

    assert!(
        wait_until(Duration::from_secs(5), || listener.total() >= 12).await,
        "expected 12 notifications, saw {}",
        listener.total()
    );

    assert_eq!(listener.count(NodeState::Created), 3);
    assert_eq!(listener.count(NodeState::Running), 3);
    assert_eq!(listener.count(NodeState::ShuttingDown), 3);
    assert_eq!(listener.count(NodeState::Shutdown), 3);

    for addr in &addrs {
        assert_eq!(
            listener.states_for(addr),
            vec![
                NodeState::Created,
                NodeState::Running,
                NodeState::ShuttingDown,
                NodeState::Shutdown
            ],
            "node {addr} must transition in order"
        );
    }
}

#[tokio::test]
async fn operation_queue_preserves_fifo_order() {
    // No nodes yet: everything queues against a depth-2 queue.
    let cluster = Cluster::builder().with_operation_queue_max_depth(2).build();
    cluster.start();

    let future1 = cluster.execute(ping_operation());
    let future2 = cluster.execute(ping_operation());
    let future3 = cluster.execute(ping_operation());

    // The third submission finds the queue full and fails immediately.
    assert!(future3.await_for(Duration::from_secs(5)).await);
    assert!(!future3.is_success());
    assert!(matches!(future3.cause(), Some(CoveError::CapacityExceeded)));

    // One node with capacity 1 starts processing the backlog.
    let fixture = Fixture::spawn(Behavior::PingOk).await;
    cluster.add_node(fixture_node(&fixture, 1, 1));

    assert!(future1.await_for(Duration::from_secs(1)).await);
    future1.get().await.expect("first queued operation");

    // Refill the queue; it must drain strictly behind operation 2.
    let future4 = cluster.execute(ping_operation());

    assert!(future2.await_for(Duration::from_secs(1)).await);
    future2.get().await.expect("second queued operation");

    assert!(future4.await_for(Duration::from_secs(1)).await);
    future4.get().await.expect("operation submitted after refill");

    cluster.shutdown().await;
}

#[tokio::test]
async fn excess_submissions_fail_fast() {
    // Total capacity: 1 in flight + 1 queued. The response is held back so
    // the first operation occupies the node while the rest arrive.
    let fixture = Fixture::spawn(Behavior::PingDelay(Duration::from_millis(300))).await;
    let cluster = Cluster::builder()
        .with_node(fixture_node(&fixture, 1, 1))
        .with_operation_queue_max_depth(1)
        .build();
    cluster.start();

    let in_flight = cluster.execute(ping_operation());
    let queued = cluster.execute(ping_operation());
    let rejected = cluster.execute(ping_operation());

    // The rejection is immediate, not subject to the 300ms response delay.
    assert!(rejected.await_for(Duration::from_millis(100)).await);
    assert!(matches!(rejected.cause(), Some(CoveError::CapacityExceeded)));

    in_flight.get().await.expect("in-flight operation");
    queued.get().await.expect("queued operation");

    cluster.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_a_join_point() {
    let fixture = Fixture::spawn(Behavior::PingDelay(Duration::from_millis(100))).await;
    let node = fixture_node(&fixture, 1, 2);
    let cluster = Cluster::builder().with_node(node.clone()).build();
    cluster.start();

    let future = cluster.execute(ping_operation());
    cluster.shutdown().await;

    // In-flight work finished before shutdown resolved.
    assert!(future.is_done());
    future.get().await.expect("in-flight operation drains");
    assert_eq!(node.state(), NodeState::Shutdown);

    let late = cluster.execute(ping_operation());
    assert!(matches!(late.cause(), Some(CoveError::Shutdown)));
}

#[tokio::test]
async fn transport_failure_retries_on_other_nodes() {
    let broken = Fixture::spawn(Behavior::AcceptThenClose).await;
    let healthy = Fixture::spawn(Behavior::PingOk).await;

    let cluster = Cluster::builder()
        .with_node(fixture_node(&broken, 1, 2))
        .with_node(fixture_node(&healthy, 1, 2))
        .build();
    cluster.start();

    // Whichever node is picked first, every operation must land on the
    // healthy node within the configured attempts.
    for _ in 0..4 {
        let future = cluster.execute(ping_operation());
        future.get().await.expect("retry must reach healthy node");
    }

    cluster.shutdown().await;
}
