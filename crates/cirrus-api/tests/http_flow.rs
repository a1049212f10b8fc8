use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use cirrus_api::{AppState, AppStateInner, router};
use cirrus_core::auth::AuthService;
use cirrus_core::blobstore::FsBlobStore;
use cirrus_core::ledger::FileLedger;
use cirrus_core::mailer::LogMailer;
use cirrus_db::Database;

struct TestApp {
    router: Router,
    db: Arc<Database>,
    _dir: tempfile::TempDir,
}

async fn app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_in_memory().unwrap());
    let store = Arc::new(FsBlobStore::new(dir.path().to_path_buf()).await.unwrap());
    let state: AppState = Arc::new(AppStateInner {
        auth: AuthService::new(
            db.clone(),
            Arc::new(LogMailer),
            "http://localhost:8080".into(),
        ),
        ledger: FileLedger::new(db.clone(), store),
        cookie_secure: false,
    });
    TestApp {
        router: router(state),
        db,
        _dir: dir,
    }
}

fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let mut req = builder.body(body).unwrap();
    // The router is exercised without a real socket; supply the peer address
    // the ConnectInfo extractor would normally see.
    let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, cookie, value)
}

fn register_body(username: &str, email: &str, auth_hash: &str) -> Value {
    json!({
        "name": "Alice",
        "surname": "Keys",
        "username": username,
        "email": email,
        "password_salt": "a1".repeat(16),
        "auth_salt": "b2".repeat(16),
        "enc_salt": "c3".repeat(16),
        "master_key_salt": "d4".repeat(16),
        "auth_hash": auth_hash,
        "wrapped_master_key": "wrapped-mk",
        "master_key_iv": "e5".repeat(12),
        "public_key": "pubkey-hex",
        "wrapped_private_key": "wrapped-pk",
        "private_key_iv": "f6".repeat(12),
        "private_key_salt": "a7".repeat(16),
    })
}

fn verification_code(db: &Database, email: &str) -> String {
    let account = db.get_account_by_email(email).unwrap().unwrap();
    db.get_verification(&account.id)
        .unwrap()
        .unwrap()
        .code
        .unwrap()
}

#[tokio::test]
async fn register_login_logout_over_http() {
    let app = app().await;

    let (status, _, _) = send(
        &app.router,
        request(
            "POST",
            "/api/v1/auth/register",
            None,
            Some(register_body("alice", "alice@example.com", "hash-1")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let code = verification_code(&app.db, "alice@example.com");
    let (status, _, _) = send(
        &app.router,
        request(
            "POST",
            "/api/v1/auth/verify",
            None,
            Some(json!({"email": "alice@example.com", "code": code})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Init hands back the registered salts.
    let (status, _, body) = send(
        &app.router,
        request(
            "POST",
            "/api/v1/auth/init",
            None,
            Some(json!({"email": "alice@example.com"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["password_salt"], "a1".repeat(16));

    // Login sets the HTTP-only session cookie and returns the wrapped keys.
    let (status, cookie, body) = send(
        &app.router,
        request(
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "alice@example.com", "auth_hash": "hash-1"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["wrapped_master_key"], "wrapped-mk");
    let cookie = cookie.expect("login must set the session cookie");
    assert!(cookie.starts_with("sessionId="));

    // The session works for protected routes.
    let (status, _, body) = send(
        &app.router,
        request("GET", "/api/v1/users/profile", Some(&cookie), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "alice");

    let (status, _, body) = send(
        &app.router,
        request("GET", "/api/v1/auth/verify-session", Some(&cookie), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    // Logout invalidates the session immediately.
    let (status, _, _) = send(
        &app.router,
        request("POST", "/api/v1/auth/logout", Some(&cookie), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, body) = send(
        &app.router,
        request("GET", "/api/v1/auth/verify-session", Some(&cookie), None),
    )
    .await;
    assert_eq!(body["valid"], false);

    let (status, _, _) = send(
        &app.router,
        request("GET", "/api/v1/users/profile", Some(&cookie), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_email_init_is_indistinguishable() {
    let app = app().await;

    let (status, _, body) = send(
        &app.router,
        request(
            "POST",
            "/api/v1/auth/init",
            None,
            Some(json!({"email": "ghost@example.com"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["password_salt"].as_str().unwrap().len(), 32);
    assert_eq!(body["data"]["auth_salt"].as_str().unwrap().len(), 32);
}

#[tokio::test]
async fn protected_routes_reject_missing_and_bogus_cookies() {
    let app = app().await;

    let (status, _, _) = send(&app.router, request("GET", "/api/v1/files", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &app.router,
        request("GET", "/api/v1/files", Some("sessionId=forged-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app().await;

    let (status, _, _) = send(
        &app.router,
        request(
            "POST",
            "/api/v1/auth/register",
            None,
            Some(register_body("alice", "alice@example.com", "hash-1")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = send(
        &app.router,
        request(
            "POST",
            "/api/v1/auth/register",
            None,
            Some(register_body("alice2", "alice@example.com", "hash-2")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}
