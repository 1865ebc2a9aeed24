use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use spark_command_core::transport::status;
use spark_command_core::{
    Endpoint, RequestHandler, Transport, TransportError, TransportRequest, TransportResponse,
};
use spark_transport_tcp::{TcpServer, TcpTransport};

struct EchoHandler;

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn handle(&self, request: TransportRequest) -> TransportResponse {
        match request.path() {
            "/echo" => TransportResponse::ok(request.body().clone()),
            "/slow" => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                TransportResponse::ok(Bytes::new())
            }
            other => TransportResponse::error(status::NOT_FOUND, format!("no route for {other}")),
        }
    }
}

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

async fn unused_endpoint() -> Endpoint {
    let probe = tokio::net::TcpListener::bind(loopback()).await.unwrap();
    let endpoint = Endpoint::from(probe.local_addr().unwrap());
    drop(probe);
    endpoint
}

#[tokio::test(flavor = "multi_thread")]
async fn request_reaches_handler_and_response_comes_back() {
    let server = TcpServer::bind(loopback(), Arc::new(EchoHandler)).await.unwrap();
    let transport = TcpTransport::new();

    let response = transport
        .request(
            &server.endpoint(),
            TransportRequest::new("/echo", Bytes::from_static(b"ping")),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
    assert!(response.is_success());
    assert_eq!(response.body(), &Bytes::from_static(b"ping"));

    let missing = transport
        .request(
            &server.endpoint(),
            TransportRequest::new("/nowhere", Bytes::new()),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), status::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn refused_connection_is_a_connect_error() {
    let endpoint = unused_endpoint().await;
    let err = TcpTransport::new()
        .request(
            &endpoint,
            TransportRequest::new("/echo", Bytes::new()),
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Connect { .. }), "{err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_handler_hits_the_request_timeout() {
    let server = TcpServer::bind(loopback(), Arc::new(EchoHandler)).await.unwrap();
    let started = Instant::now();
    let err = TcpTransport::new()
        .request(
            &server.endpoint(),
            TransportRequest::new("/slow", Bytes::new()),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_millis(450));
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_accepting() {
    let server = TcpServer::bind(loopback(), Arc::new(EchoHandler)).await.unwrap();
    let endpoint = server.endpoint();
    server.shutdown().await;

    let err = TcpTransport::new()
        .request(
            &endpoint,
            TransportRequest::new("/echo", Bytes::new()),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Connect { .. }), "{err:?}");
}
