use gate::{
    AdmissionGate, IdentityResolver, NonceLedger, RequestSigner, SharedSecret, TimestampGuard,
    unix_now,
};
use registry::{AuthResponse, create_registry_state, create_router};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

struct TestServer {
    base_url: String,
    _temp_dir: TempDir,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn shared_secret() -> SharedSecret {
    SharedSecret::new(b"s3cr3t".to_vec()).expect("secret should be valid")
}

async fn start_test_server() -> TestServer {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let state = create_registry_state(temp_dir.path(), shared_secret())
        .await
        .expect("Failed to create registry state");

    let resolver: Arc<dyn IdentityResolver> = Arc::new(state.storage.clone());
    let gate = AdmissionGate::new(
        shared_secret(),
        TimestampGuard::default(),
        Arc::new(NonceLedger::new(Duration::from_secs(300))),
        resolver,
    );
    let app = create_router(state, gate);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to read bound addr");
    let base_url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("Registry test server exited unexpectedly");
    });

    TestServer {
        base_url,
        _temp_dir: temp_dir,
        handle,
    }
}

async fn signed_post(
    client: &reqwest::Client,
    server: &TestServer,
    signer: &RequestSigner,
    path: &str,
    body: &str,
    nonce: &str,
) -> reqwest::Response {
    let headers = signer.sign_with("POST", path, body.as_bytes(), unix_now(), nonce);
    let mut request = client
        .post(format!("{}{}", server.base_url, path))
        .header("content-type", "application/json")
        .body(body.to_string());
    for (name, value) in headers.pairs() {
        request = request.header(name, value);
    }
    request.send().await.expect("signed request failed")
}

async fn register_and_login(client: &reqwest::Client, server: &TestServer) -> AuthResponse {
    let created = client
        .post(format!("{}/users/create", server.base_url))
        .json(&json!({
            "user_name": "Maria Silva",
            "user_email": "maria@example.com",
            "user_password": "Secret123"
        }))
        .send()
        .await
        .expect("create request failed");
    assert_eq!(created.status(), StatusCode::CREATED);

    let login = client
        .post(format!("{}/users/login", server.base_url))
        .json(&json!({
            "user_email": "maria@example.com",
            "user_password": "Secret123"
        }))
        .send()
        .await
        .expect("login request failed");
    assert_eq!(login.status(), StatusCode::OK);
    login.json().await.expect("login response should parse")
}

#[tokio::test]
async fn test_address_create_then_replay() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();
    let auth = register_and_login(&client, &server).await;
    let signer = RequestSigner::new(shared_secret(), auth.user_id);

    let body = json!({
        "address_street": "Rua A",
        "address_number": "100",
        "address_neighborhood": "Centro",
        "address_city": "Campinas",
        "address_state": "SP",
        "address_cep": "13010-000"
    })
    .to_string();

    let resp = signed_post(&client, &server, &signer, "/address/create", &body, "abc123").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let address: Value = resp.json().await.expect("address should parse");
    assert_eq!(address["user_id"], auth.user_id);
    assert_eq!(address["address_street"], "Rua A");

    // 同一 nonce，不同 body 重新签名
    let replay_body = body.replace("Rua A", "Rua B");
    let resp = signed_post(&client, &server, &signer, "/address/update", &replay_body, "abc123").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json: Value = resp.json().await.expect("rejection should be json");
    assert_eq!(json["reason"], "nonce_reused");

    let resp = signed_post(&client, &server, &signer, "/address/update", &replay_body, "abc124").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let address: Value = resp.json().await.expect("address should parse");
    assert_eq!(address["address_street"], "Rua B");
}

#[tokio::test]
async fn test_get_user_with_signature() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();
    let auth = register_and_login(&client, &server).await;
    let signer = RequestSigner::new(shared_secret(), auth.user_id);

    let resp = signed_post(&client, &server, &signer, "/users/get", "", "get-1").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let user: Value = resp.json().await.expect("user should parse");
    assert_eq!(user["user_id"], auth.user_id);
    assert_eq!(user["user_name"], "Maria Silva");
}

#[tokio::test]
async fn test_tampered_body_rejected() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();
    let auth = register_and_login(&client, &server).await;
    let signer = RequestSigner::new(shared_secret(), auth.user_id);

    let signed_body = r#"{"address_street":"Rua A"}"#;
    let headers = signer.sign("POST", "/address/create", signed_body.as_bytes());

    let mut request = client
        .post(format!("{}/address/create", server.base_url))
        .header("content-type", "application/json")
        .body(r#"{"address_street":"Rua Z"}"#);
    for (name, value) in headers.pairs() {
        request = request.header(name, value);
    }
    let resp = request.send().await.expect("request failed");

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json: Value = resp.json().await.expect("rejection should be json");
    assert_eq!(json["reason"], "invalid_credentials");
}

#[tokio::test]
async fn test_health() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let health = client
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .expect("health request failed");
    assert_eq!(health.status(), StatusCode::OK);
    let health_json: Value = health.json().await.expect("health body should be json");
    assert_eq!(health_json["status"], "healthy");
    assert_eq!(health_json["backend"], "sqlite");
}
