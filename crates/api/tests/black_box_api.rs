use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};

use warden_infra::{InMemoryKeyCustody, WardenConfig};

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod with in-memory collaborators, on an ephemeral port.
        let config = WardenConfig::default();
        let custody = Arc::new(InMemoryKeyCustody::new());
        let services = warden_api::app::build_services(&config, custody)
            .await
            .expect("failed to build services");
        let app = warden_api::app::build_app(Arc::new(services));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn call(&self, path: &str, body: Value) -> Value {
        let res = self
            .client
            .post(format!("{}/v1/{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{path}");
        res.json().await.unwrap()
    }

    /// Call and require `status: ok`.
    async fn ok(&self, path: &str, body: Value) -> Value {
        let reply = self.call(path, body).await;
        assert_eq!(reply["status"], "ok", "{path}: {reply}");
        reply
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn namespace_with_built_ins(srv: &TestServer, namespace: &str) {
    srv.ok("namespace/create", json!({ "namespace": namespace })).await;

    // Bootstrap runs on the event consumer; poll until it lands.
    for _ in 0..100 {
        let roles = srv.ok("role/list", json!({ "namespace": namespace })).await;
        if roles["roles"].as_array().unwrap().len() == 2 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("built-ins for {namespace} did not appear in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_is_up() {
    let srv = TestServer::spawn().await;
    let res = srv
        .client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn undecodable_body_is_bad_request() {
    let srv = TestServer::spawn().await;
    let res = srv
        .client
        .post(format!("{}/v1/policy/create", srv.base_url))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "invalid_argument");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logical_failures_are_statuses() {
    let srv = TestServer::spawn().await;

    let missing = srv
        .call(
            "policy/get",
            json!({ "namespace": "acme", "uuid": "0190a5a0-0000-7000-8000-000000000000" }),
        )
        .await;
    assert_eq!(missing["status"], "not_found");

    let bad_namespace = srv.call("policy/list", json!({ "namespace": "a b" })).await;
    assert_eq!(bad_namespace["status"], "invalid_argument");

    let no_namespace = srv
        .call("policy/create", json!({ "namespace": "ghost", "name": "p" }))
        .await;
    assert_eq!(no_namespace["status"], "failed_precondition");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn global_namespace_is_provisioned_at_startup() {
    let srv = TestServer::spawn().await;
    let policies = srv.ok("policy/list", json!({ "namespace": "" })).await;
    assert_eq!(policies["policies"].as_array().unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn password_login_and_scope_checks() {
    let srv = TestServer::spawn().await;
    namespace_with_built_ins(&srv, "acme").await;

    let policy = srv
        .ok(
            "policy/create",
            json!({
                "namespace": "acme",
                "name": "orders",
                "resources": ["order.*"],
                "actions": ["read", "write"],
            }),
        )
        .await;
    let policy_uuid = policy["policy"]["uuid"].clone();

    let role = srv
        .ok(
            "role/create",
            json!({
                "namespace": "acme",
                "name": "clerk",
                "policies": [{ "namespace": "acme", "uuid": policy_uuid }],
            }),
        )
        .await;
    let role_uuid = role["role"]["uuid"].clone();

    let identity = srv
        .ok("identity/create", json!({ "namespace": "acme", "name": "alice" }))
        .await;
    let identity_uuid = identity["identity"]["uuid"].clone();
    assert!(identity["identity"].get("password").is_none());

    srv.ok(
        "identity/add_role",
        json!({
            "namespace": "acme",
            "uuid": identity_uuid,
            "role": { "namespace": "acme", "uuid": role_uuid },
        }),
    )
    .await;
    srv.ok(
        "identity/set_password",
        json!({ "namespace": "acme", "uuid": identity_uuid, "password": "s3cret" }),
    )
    .await;

    let wrong = srv
        .call(
            "auth/create_token_with_password",
            json!({ "namespace": "acme", "identity": identity_uuid, "password": "nope" }),
        )
        .await;
    assert_eq!(wrong["status"], "unauthenticated");

    let tokens = srv
        .ok(
            "auth/create_token_with_password",
            json!({ "namespace": "acme", "identity": identity_uuid, "password": "s3cret" }),
        )
        .await;
    let access = tokens["access_token"].as_str().unwrap().to_string();
    let refresh = tokens["refresh_token"].as_str().unwrap().to_string();

    let order = json!([{ "namespace": "acme", "resources": ["order.123"], "actions": ["read"], "namespace_independent": false }]);
    let invoice = json!([{ "namespace": "acme", "resources": ["invoice.1"], "actions": ["read"], "namespace_independent": false }]);

    let granted = srv
        .ok("auth/check_access_with_token", json!({ "token": access, "scopes": order }))
        .await;
    assert_eq!(granted["granted"], true);
    let denied = srv
        .ok("auth/check_access_with_token", json!({ "token": access, "scopes": invoice }))
        .await;
    assert_eq!(denied["granted"], false);

    let by_password = srv
        .ok(
            "auth/check_access_with_password",
            json!({ "namespace": "acme", "identity": identity_uuid, "password": "s3cret", "scopes": order }),
        )
        .await;
    assert_eq!(by_password["granted"], true);

    let validated = srv.ok("token/validate", json!({ "token": access })).await;
    assert_eq!(validated["token_status"], "ok");
    assert_eq!(validated["token"]["identity"], identity_uuid);

    let refreshed = srv
        .ok("auth/refresh_token", json!({ "refresh_token": refresh }))
        .await;
    assert!(refreshed["access_token"].as_str().is_some());

    // Deactivation: the refresh token no longer works.
    srv.ok(
        "identity/set_active",
        json!({ "namespace": "acme", "uuid": identity_uuid, "active": false }),
    )
    .await;
    let revoked = srv
        .call("auth/refresh_token", json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(revoked["status"], "unauthenticated");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn certificate_lifecycle() {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;

    let srv = TestServer::spawn().await;
    namespace_with_built_ins(&srv, "acme").await;

    let identity = srv
        .ok("identity/create", json!({ "namespace": "acme", "name": "device-1" }))
        .await;
    let identity_uuid = identity["identity"]["uuid"].clone();

    let client_key = rcgen::KeyPair::generate().unwrap();
    let issued = srv
        .ok(
            "certificate/issue",
            json!({
                "namespace": "acme",
                "identity": identity_uuid,
                "public_key_der": STANDARD.encode(client_key.public_key_der()),
                "description": "edge device",
            }),
        )
        .await;
    let der = issued["der"].as_str().unwrap().to_string();
    let uuid = issued["certificate"]["uuid"].clone();
    assert!(issued["pem"].as_str().unwrap().starts_with("-----BEGIN CERTIFICATE-----"));

    let valid = srv
        .ok("certificate/validate_raw", json!({ "certificate_der": der }))
        .await;
    assert_eq!(valid["certificate_status"], "ok");
    assert_eq!(valid["certificate"]["uuid"], uuid);

    let mut tampered = STANDARD.decode(&der).unwrap();
    let last = tampered.len() - 1;
    tampered[last] ^= 0xff;
    let rejected = srv
        .ok(
            "certificate/validate_raw",
            json!({ "certificate_der": STANDARD.encode(&tampered) }),
        )
        .await;
    assert_ne!(rejected["certificate_status"], "ok");

    srv.ok("certificate/disable", json!({ "namespace": "acme", "uuid": uuid }))
        .await;
    let refused = srv
        .call("certificate/regenerate", json!({ "namespace": "acme", "uuid": uuid }))
        .await;
    assert_eq!(refused["status"], "permission_denied");

    let ca = srv.ok("certificate/ca", json!({})).await;
    assert!(ca["pem"].as_str().unwrap().contains("BEGIN CERTIFICATE"));
}
