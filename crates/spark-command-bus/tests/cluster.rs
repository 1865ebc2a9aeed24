use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use spark_command_bus::{
    CommandEndpoint, ConnectorError, DispatchOutcome, DistributedCommandBus, SendError,
    handler_fn,
};
use spark_command_core::transport::status;
use spark_command_core::{
    Capability, ClusterMembership, CommandMessage, CommandPattern, DistributedCommandBusSettings,
    Endpoint, HandlerFailure, InMemoryMembership, JsonSerializer, Member, RequestHandler,
    TransportRequest, TransportResponse,
};
use spark_transport_tcp::{TcpServer, TcpTransport};

/// 服务端先绑定端口，总线装配完成后再接上端点。
#[derive(Default)]
struct DeferredEndpoint {
    endpoint: OnceLock<CommandEndpoint>,
}

#[async_trait]
impl RequestHandler for DeferredEndpoint {
    async fn handle(&self, request: TransportRequest) -> TransportResponse {
        match self.endpoint.get() {
            Some(endpoint) => endpoint.handle(request).await,
            None => TransportResponse::error(status::INTERNAL_ERROR, "node is starting"),
        }
    }
}

struct Node {
    bus: DistributedCommandBus,
    membership: Arc<InMemoryMembership>,
    _server: TcpServer,
}

impl Node {
    async fn start(id: &str, settings: &DistributedCommandBusSettings) -> Self {
        let slot = Arc::new(DeferredEndpoint::default());
        let server = TcpServer::bind(SocketAddr::from(([127, 0, 0, 1], 0)), slot.clone())
            .await
            .unwrap();
        let membership = Arc::new(InMemoryMembership::new(Member::new(id, server.endpoint())));
        let bus = DistributedCommandBus::from_settings(
            settings,
            membership.clone(),
            Arc::new(TcpTransport::new()),
            Arc::new(JsonSerializer::new()),
        )
        .unwrap();
        if slot.endpoint.set(bus.endpoint()).is_err() {
            panic!("endpoint installed twice");
        }
        Self {
            bus,
            membership,
            _server: server,
        }
    }

    fn member(&self) -> Member {
        self.membership.local_member()
    }
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn unused_endpoint() -> Endpoint {
    let probe = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let endpoint = Endpoint::from(probe.local_addr().unwrap());
    drop(probe);
    endpoint
}

fn ship(key: &str, payload: &'static [u8]) -> CommandMessage {
    CommandMessage::new("Ship", Bytes::from_static(payload)).with_routing_key(key)
}

/// B 处理 `Ship` 与 `Reject`，A 只负责发送。
async fn two_nodes(settings: &DistributedCommandBusSettings) -> (Node, Node) {
    let a = Node::start("node-a", settings).await;
    let b = Node::start("node-b", settings).await;
    b.bus
        .subscribe(
            CommandPattern::exact("Ship"),
            handler_fn(|command| async move {
                let mut reply = b"b:".to_vec();
                reply.extend_from_slice(command.payload());
                Ok(Bytes::from(reply))
            }),
        )
        .await
        .unwrap();
    b.bus
        .subscribe(
            CommandPattern::exact("Reject"),
            handler_fn(|_| async { Err(HandlerFailure::new("out-of-stock", "nothing to ship")) }),
        )
        .await
        .unwrap();
    (a, b)
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_query_cluster_routes_commands_end_to_end() {
    let settings = DistributedCommandBusSettings::default();
    let (a, b) = two_nodes(&settings).await;
    a.membership.join(b.member());
    b.membership.join(a.member());
    let _listener_a = a.bus.start(a.membership.clone()).await.unwrap();
    let _listener_b = b.bus.start(b.membership.clone()).await.unwrap();

    let router = a.bus.router().clone();
    eventually("node-a to learn node-b's capabilities", || {
        !router.members_for("Ship").is_empty()
    })
    .await;

    let result = a.bus.send(ship("order-1", b"crate")).await.unwrap();
    assert_eq!(result, Bytes::from_static(b"b:crate"));

    let failure = a
        .bus
        .send(CommandMessage::new("Reject", Bytes::new()).with_routing_key("order-2"))
        .await
        .unwrap_err();
    assert_eq!(
        failure,
        SendError::Handler(HandlerFailure::new("out-of-stock", "nothing to ship"))
    );

    let unknown = a
        .bus
        .send(CommandMessage::new("Unload", Bytes::new()).with_routing_key("order-3"))
        .await
        .unwrap_err();
    assert_eq!(unknown.code(), "spark.command.route.no_capable_member");
}

#[tokio::test(flavor = "multi_thread")]
async fn simple_mode_reads_capabilities_from_member_metadata() {
    let mut settings = DistributedCommandBusSettings::default();
    settings.discovery.mode = "simple".to_owned();
    let (a, b) = two_nodes(&settings).await;
    // B 发布后的本地成员携带能力元数据。
    a.membership.join(b.member());
    let _listener = a.bus.start(a.membership.clone()).await.unwrap();

    let router = a.bus.router().clone();
    eventually("node-a to read node-b's metadata", || {
        !router.members_for("Ship").is_empty()
    })
    .await;
    let result = a.bus.send(ship("order-9", b"box")).await.unwrap();
    assert_eq!(result, Bytes::from_static(b"b:box"));
}

#[tokio::test(flavor = "multi_thread")]
async fn local_destination_is_served_in_process() {
    let settings = DistributedCommandBusSettings::default();
    let a = Node::start("node-a", &settings).await;
    a.bus
        .subscribe(
            CommandPattern::parse("local.*").unwrap(),
            handler_fn(|command| async move { Ok(command.payload().clone()) }),
        )
        .await
        .unwrap();

    let handle = a
        .bus
        .dispatch(CommandMessage::new("local.Echo", Bytes::from_static(b"hi")).with_routing_key("k"))
        .unwrap();
    assert_eq!(handle.member(), a.member().id());
    assert_eq!(handle.await, DispatchOutcome::Completed(Bytes::from_static(b"hi")));
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_member_fails_within_the_dispatch_timeout() {
    let settings = DistributedCommandBusSettings::default();
    let a = Node::start("node-a", &settings).await;
    let dead = Member::new("node-dead", unused_endpoint().await);

    let started = Instant::now();
    let outcome = a
        .bus
        .connector()
        .dispatch(&dead, ship("order-1", b"crate"))
        .await;
    assert!(started.elapsed() < Duration::from_secs(5));
    let error = outcome.connector_error().cloned().unwrap();
    assert!(
        matches!(
            error,
            ConnectorError::Unreachable { .. } | ConnectorError::Timeout { .. }
        ),
        "unexpected failure: {error:?}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn connector_failures_are_retried_on_another_member() {
    let mut settings = DistributedCommandBusSettings::default();
    settings.retry.max_attempts = 2;
    settings.retry.interval_ms = 10;
    let (a, b) = two_nodes(&settings).await;
    let dead = Member::new("node-dead", unused_endpoint().await);

    let router = a.bus.router();
    router
        .update_member_capabilities(
            b.member(),
            Capability::new(1).with_pattern(CommandPattern::exact("Ship")),
        )
        .await;
    router
        .update_member_capabilities(
            dead.clone(),
            Capability::new(1).with_pattern(CommandPattern::exact("Ship")),
        )
        .await;

    let mut reached_dead_first = 0;
    for i in 0..20 {
        let key = format!("order-{i}");
        if router.resolve("Ship", Some(&key)).unwrap().id() == dead.id() {
            reached_dead_first += 1;
        }
        let result = a
            .bus
            .send(CommandMessage::new("Ship", Bytes::from_static(b"x")).with_routing_key(key))
            .await
            .unwrap();
        assert_eq!(result, Bytes::from_static(b"b:x"));
    }
    assert!(reached_dead_first > 0, "no key was routed to the dead member");
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_dispatch_is_abandoned_locally() {
    let settings = DistributedCommandBusSettings::default();
    let (a, b) = two_nodes(&settings).await;
    b.bus
        .subscribe(
            CommandPattern::exact("Slow"),
            handler_fn(|_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Bytes::new())
            }),
        )
        .await
        .unwrap();

    let handle = a
        .bus
        .connector()
        .dispatch(&b.member(), CommandMessage::new("Slow", Bytes::new()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();
    let started = Instant::now();
    let outcome = handle.await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(
        outcome,
        DispatchOutcome::ConnectorFailed(ConnectorError::Cancelled {
            member: b.member().id().clone()
        })
    );
}
