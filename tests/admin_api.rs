//! Query interface served over a real listener.

use std::sync::Arc;

use reqwest::StatusCode;
use tokio::net::TcpListener;

use dynamic_upstream::admin::{self, AdminState};
use dynamic_upstream::lifecycle::Shutdown;
use dynamic_upstream::registry::{UpstreamRegistry, UpstreamSettings};
use dynamic_upstream::resolver::StaticResolver;
use dynamic_upstream::upstream::{Engine, Protocol, Reclaimer};

struct TestServer {
    base: String,
    client: reqwest::Client,
    shutdown: Shutdown,
}

impl TestServer {
    async fn start(api_key: Option<&str>) -> Self {
        let engine = Arc::new(Engine::new(Arc::new(StaticResolver::new())));
        let registry = Arc::new(UpstreamRegistry::new(Arc::new(Reclaimer::new())));
        registry
            .register("web", Protocol::Http, 64 * 1024, UpstreamSettings::default())
            .unwrap();
        registry
            .register("db", Protocol::Stream, 64 * 1024, UpstreamSettings::default())
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let shutdown = Shutdown::new();
        let state = AdminState::new(registry, engine, api_key.map(str::to_string));
        tokio::spawn(admin::serve(listener, state, shutdown.subscribe()));

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        Self {
            base,
            client,
            shutdown,
        }
    }

    async fn get(&self, query: &str) -> (StatusCode, String) {
        let res = self
            .client
            .get(format!("{}/dynamic?{}", self.base, query))
            .send()
            .await
            .expect("server unreachable");
        let status = res.status();
        (status, res.text().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

#[tokio::test]
async fn test_list_add_and_not_modified() {
    let server = TestServer::start(None).await;

    let (status, body) = server.get("upstream=web").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "server 0.0.0.0:1 addr=0.0.0.0:1 down;\n");

    let (status, body) = server.get("upstream=web&add=&server=10.0.0.1:80&weight=2").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("server 10.0.0.1:80 addr=10.0.0.1:80 weight=2 "));

    let (status, body) = server.get("upstream=web&add=&server=10.0.0.1:80").await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert!(body.is_empty());

    let (status, _) = server.get("upstream=web&remove=&server=10.0.0.1:80").await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = server.get("upstream=web").await;
    assert_eq!(body, "server 0.0.0.0:1 addr=0.0.0.0:1 down;\n");
}

#[tokio::test]
async fn test_error_statuses() {
    let server = TestServer::start(None).await;

    server.get("upstream=web&add=&server=10.0.0.1:80").await;
    let (status, body) = server.get("upstream=web&add=&server=10.0.0.1:80&backup=").await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert!(!body.is_empty());

    let (status, _) = server.get("upstream=missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.get("upstream=web&stream=").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.get("upstream=db&stream=").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.get("upstream=web&remove=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "'server' argument required");

    let (status, _) = server.get("upstream=web&server=10.9.9.9:80&down=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let res = server
        .client
        .post(format!("{}/dynamic?upstream=web", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_bearer_key_required_when_configured() {
    let server = TestServer::start(Some("secret")).await;

    let (status, _) = server.get("upstream=web").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let res = server
        .client
        .get(format!("{}/dynamic?upstream=web", server.base))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = server
        .client
        .get(format!("{}/upstreams", server.base))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let upstreams: serde_json::Value = res.json().await.unwrap();
    assert_eq!(upstreams.as_array().map(Vec::len), Some(2));
}
