// tests/server_tests.rs
use rust_health_checker::health::{probe_fn, CheckDefinition, Checker};
use rust_health_checker::probes::HttpProbe;
use rust_health_checker::server::{HealthHandler, ServerBuilder};
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

async fn spawn_server(checker: Checker) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<anyhow::Result<()>>) {
    let server = ServerBuilder::new(SocketAddr::from(([127, 0, 0, 1], 0)))
        .with_handler(HealthHandler::new(checker, "/health"))
        .bind()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve_with_shutdown(async move {
        let _ = rx.await;
    }));
    (addr, tx, handle)
}

#[tokio::test]
async fn test_serves_health_over_http() {
    let mut upstream = mockito::Server::new_async().await;
    let _ping = upstream
        .mock("GET", "/ping")
        .with_status(200)
        .create_async()
        .await;

    let url = format!("{}/ping", upstream.url()).parse().unwrap();
    let checker = Checker::builder()
        .with_info("service", "orders")
        .with_check(CheckDefinition::new("upstream", HttpProbe::new(url)))
        .build()
        .unwrap();
    let (addr, shutdown, handle) = spawn_server(checker).await;

    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["expires"], "-1");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "up");
    assert_eq!(body["info"]["service"], "orders");
    assert_eq!(body["details"]["upstream"]["status"], "up");

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failing_dependency_is_service_unavailable() {
    let mut upstream = mockito::Server::new_async().await;
    let _ping = upstream
        .mock("GET", "/ping")
        .with_status(500)
        .create_async()
        .await;

    let url = format!("{}/ping", upstream.url()).parse().unwrap();
    let checker = Checker::builder()
        .with_check(CheckDefinition::new("upstream", HttpProbe::new(url)))
        .build()
        .unwrap();
    let (addr, shutdown, handle) = spawn_server(checker).await;

    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "down");
    assert!(body["details"]["upstream"]["error"]
        .as_str()
        .unwrap()
        .contains("500"));

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let checker = Checker::builder()
        .with_check(CheckDefinition::new("noop", probe_fn(|_| async { Ok(()) })))
        .build()
        .unwrap();
    let (addr, shutdown, handle) = spawn_server(checker).await;

    let response = reqwest::get(format!("http://{}/status", addr)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
