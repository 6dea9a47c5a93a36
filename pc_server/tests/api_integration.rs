//! Integration tests for the HTTP API.
//!
//! Each test builds a fresh application state on an in-memory database, a
//! scripted shell and a supervisor that records instead of exiting.

use argon2::Params;
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header, request::Builder as RequestBuilder},
};
use http_body_util::BodyExt;
use chrono::Utc;
use pc_server::{
    api::{AppState, create_router, request_id::REQUEST_ID_HEADER},
    log_capture::{LogBuffer, LogEntry},
};
use pi_cockpit::{
    AdminControl, Database, ProcessSupervisor, SessionRegistry, TokenService, UserStore,
    led::LedService,
    scores::ScoreBoard,
    settings::{JsonFileConfigStore, SettingsStore},
    shell::{ShellError, ShellOutput, ShellRunner},
    speedtest::SpeedTestService,
    update::{AutoUpdateService, AutoUpdateTask, DEFAULT_CHECK_INTERVAL, UpdateChecker},
};
use serde_json::{Value, json};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;
use tower::ServiceExt; // For `oneshot` method

const SECRET: &str = "integration_test_secret_at_least_32_chars";
const REPORT: &str = r#"{"ping": 12.5, "download": 94000000.0, "upload": 11000000.0}"#;

#[derive(Default)]
struct FakeShell {
    calls: Mutex<Vec<String>>,
    /// How long `sudo` commands take
    sudo_delay: Mutex<Duration>,
}

impl FakeShell {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn slow_sudo(&self, delay: Duration) {
        *self.sudo_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl ShellRunner for FakeShell {
    async fn exec(
        &self,
        program: &str,
        args: &[&str],
        _timeout: Duration,
    ) -> Result<ShellOutput, ShellError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", program, args.join(" ")));
        if program == "sudo" {
            let delay = *self.sudo_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
        }
        let stdout = match (program, args.first().copied()) {
            ("speedtest", Some("--json")) => REPORT,
            ("git", Some("rev-list")) => "0\n",
            _ => "",
        };
        Ok(ShellOutput {
            stdout: stdout.to_string(),
            exit_code: 0,
        })
    }
}

#[derive(Default)]
struct RecordingSupervisor {
    requests: Mutex<Vec<&'static str>>,
}

impl RecordingSupervisor {
    fn requests(&self) -> Vec<&'static str> {
        self.requests.lock().unwrap().clone()
    }
}

impl ProcessSupervisor for RecordingSupervisor {
    fn request_restart(&self) {
        self.requests.lock().unwrap().push("restart");
    }

    fn request_shutdown(&self) {
        self.requests.lock().unwrap().push("shutdown");
    }
}

struct TestServer {
    app: Router,
    state: AppState,
    shell: Arc<FakeShell>,
    supervisor: Arc<RecordingSupervisor>,
    leds_root: PathBuf,
    _dir: TempDir,
}

/// Helper to create test server with fresh components
async fn create_test_server() -> TestServer {
    let dir = TempDir::new().unwrap();
    let database = Database::in_memory()
        .await
        .expect("Failed to create test database");
    let pool = database.pool().clone();

    let params = Params::new(8, 1, 1, None).unwrap();
    let users = Arc::new(UserStore::with_params(
        pool.clone(),
        "test_pepper".to_string(),
        params,
    ));
    let tokens = Arc::new(TokenService::new(users.clone(), SECRET));

    let shell = Arc::new(FakeShell::default());
    let supervisor = Arc::new(RecordingSupervisor::default());
    let admin = AdminControl::new(
        supervisor.clone(),
        shell.clone(),
        Duration::from_millis(10),
        "bash start.sh 0",
    );

    let speedtest = Arc::new(SpeedTestService::new(
        shell.clone(),
        Arc::new(JsonFileConfigStore::new(dir.path().join("speedtest.json"))),
    ));
    let settings = SettingsStore::new(pool).await.unwrap();
    let auto_update = Arc::new(AutoUpdateService::new(
        AutoUpdateTask::new(
            UpdateChecker::new(shell.clone()),
            settings.clone(),
            admin.clone(),
        ),
        settings.clone(),
        DEFAULT_CHECK_INTERVAL,
    ));
    let scores = Arc::new(ScoreBoard::load(dir.path().join("scores.json")).await);
    let leds_root = dir.path().join("leds");
    let led = Arc::new(LedService::with_root(
        shell.clone(),
        settings.clone(),
        &leds_root,
    ));

    let state = AppState {
        tokens,
        sessions: Arc::new(SessionRegistry::new()),
        users,
        speedtest,
        auto_update,
        settings,
        admin,
        scores,
        led,
        logs: LogBuffer::new(),
        sso: None,
        database,
        cookie_secure: false,
    };

    TestServer {
        app: create_router(state.clone()),
        state,
        shell,
        supervisor,
        leds_root,
        _dir: dir,
    }
}

fn write_trigger(root: &Path, led: &str, content: &str) {
    let dir = root.join(led);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("trigger"), content).unwrap();
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        headers,
        body,
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    with_cookie(Request::get(uri), cookie)
        .body(Body::empty())
        .unwrap()
}

fn delete(uri: &str, cookie: Option<&str>) -> Request<Body> {
    with_cookie(Request::delete(uri), cookie)
        .body(Body::empty())
        .unwrap()
}

fn post_form(uri: &str, form: &str, cookie: Option<&str>) -> Request<Body> {
    with_cookie(Request::post(uri), cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

fn post_json(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    with_cookie(Request::post(uri), cookie)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_cookie(builder: RequestBuilder, cookie: Option<&str>) -> RequestBuilder {
    match cookie {
        Some(cookie) => builder.header(header::COOKIE, cookie),
        None => builder,
    }
}

fn set_cookie(reply: &Reply) -> String {
    reply.headers[header::SET_COOKIE].to_str().unwrap().to_string()
}

/// Log in and return the `jwt=<token>` pair for later requests
async fn login(server: &TestServer, email: &str, password: &str) -> String {
    let reply = send(
        &server.app,
        post_form(
            "/api/login",
            &format!("email={}&password={}", email, password),
            None,
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "login failed: {}", reply.body);
    set_cookie(&reply)
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

async fn admin_cookie(server: &TestServer) -> String {
    server
        .state
        .users
        .create("admin@example.com", "admin", "Admin")
        .await
        .unwrap();
    login(server, "admin@example.com", "admin").await
}

// Real time: the SQLite worker thread does not cooperate with a paused clock.
async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ============================================================================
// Health and plumbing
// ============================================================================

#[tokio::test]
async fn test_health_check_endpoint() {
    let server = create_test_server().await;

    let reply = send(&server.app, get("/health", None)).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "healthy");
    assert_eq!(reply.body["database"], true);
    assert_eq!(reply.body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_request_id_echoed() {
    let server = create_test_server().await;

    let request = Request::get("/health")
        .header(REQUEST_ID_HEADER, "req-42")
        .body(Body::empty())
        .unwrap();
    let reply = send(&server.app, request).await;

    assert_eq!(reply.headers[REQUEST_ID_HEADER], "req-42");
}

// ============================================================================
// Login, session and logout
// ============================================================================

#[tokio::test]
async fn test_login_touch_logout_flow() {
    let server = create_test_server().await;
    let user = server
        .state
        .users
        .create("user1@example.com", "1", "User One")
        .await
        .unwrap();

    // Login sets the cookie and opens exactly one session.
    let reply = send(
        &server.app,
        post_form("/api/login", "email=user1@example.com&password=1", None),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["userId"], user.id.as_str());

    let cookie_header = set_cookie(&reply);
    assert!(cookie_header.starts_with("jwt="));
    assert!(cookie_header.contains("HttpOnly"));
    assert!(cookie_header.contains("Path=/"));
    assert!(cookie_header.contains("Max-Age=900"));
    assert!(cookie_header.contains("SameSite=Lax"));
    let cookie = cookie_header.split(';').next().unwrap().to_string();
    let token = cookie.trim_start_matches("jwt=").to_string();

    let sessions = server.state.sessions.list().await;
    assert_eq!(sessions.len(), 1);
    let created = sessions[0].clone();

    // An authenticated request touches the same session.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let reply = send(&server.app, get("/api/sessions", Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["sessions"].as_array().unwrap().len(), 1);
    assert_eq!(reply.body["sessions"][0]["id"], created.id.as_str());
    assert!(reply.body["appToken"].is_null());
    assert!(reply.body["sessions"][0].get("token").is_none());

    let touched = server.state.sessions.list().await;
    assert_eq!(touched.len(), 1);
    assert!(touched[0].last_activity > created.last_activity);

    // Logout removes the session, purges the cache and clears the cookie.
    let reply = send(&server.app, post_form("/api/logout", "", Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(set_cookie(&reply).contains("Max-Age=0"));
    assert!(server.state.sessions.is_empty().await);
    assert!(!server.state.tokens.has_cached(&token).await);

    // Revocation is cache-only: the token still verifies until it expires.
    let reply = send(&server.app, get("/api/whoami", Some(&cookie))).await;
    assert_eq!(reply.body["loggedIn"], true);
    assert_eq!(reply.body["userId"], user.id.as_str());
}

#[tokio::test]
async fn test_failed_logins_are_indistinguishable() {
    let server = create_test_server().await;
    server
        .state
        .users
        .create("user1@example.com", "1", "")
        .await
        .unwrap();

    let wrong_password = send(
        &server.app,
        post_form("/api/login", "email=user1@example.com&password=2", None),
    )
    .await;
    let unknown_user = send(
        &server.app,
        post_form("/api/login", "email=ghost@example.com&password=1", None),
    )
    .await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body, unknown_user.body);
    assert_eq!(wrong_password.body, json!({"error": "Invalid credentials"}));
    assert!(server.state.sessions.is_empty().await);
}

#[tokio::test]
async fn test_protected_routes_require_valid_cookie() {
    let server = create_test_server().await;

    for request in [
        get("/api/users", None),
        get("/api/sessions", Some("jwt=not.a.token")),
        post_form("/api/admin/restart", "", None),
        delete("/api/scores", Some("theme=dark")),
    ] {
        let reply = send(&server.app, request).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body["error"], "Unauthorized");
    }
    assert!(server.supervisor.requests().is_empty());
}

#[tokio::test]
async fn test_whoami_without_cookie() {
    let server = create_test_server().await;

    let reply = send(&server.app, get("/api/whoami", None)).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({"loggedIn": false, "userId": null}));
}

#[tokio::test]
async fn test_revoke_all_clears_sessions_and_cache() {
    let server = create_test_server().await;
    let admin = admin_cookie(&server).await;
    server
        .state
        .users
        .create("other@example.com", "pw", "")
        .await
        .unwrap();
    login(&server, "other@example.com", "pw").await;
    assert_eq!(server.state.sessions.len().await, 2);

    let reply = send(
        &server.app,
        post_form("/api/sessions/revoke-all", "", Some(&admin)),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["revoked"], 2);
    assert!(server.state.sessions.is_empty().await);
    assert_eq!(server.state.tokens.cached_count().await, 0);
}

// ============================================================================
// Users and access requests
// ============================================================================

#[tokio::test]
async fn test_access_request_approval_flow() {
    let server = create_test_server().await;
    let admin = admin_cookie(&server).await;

    let reply = send(
        &server.app,
        post_form(
            "/api/request-access",
            "email=joiner@example.com&password=secret&name=Joiner",
            None,
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);

    let duplicate = send(
        &server.app,
        post_form(
            "/api/request-access",
            "email=joiner@example.com&password=secret&name=Joiner",
            None,
        ),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let malformed = send(
        &server.app,
        post_form("/api/request-access", "email=nope&password=x", None),
    )
    .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    let pending = send(&server.app, get("/api/user-requests", Some(&admin))).await;
    let pending = pending.body.as_array().unwrap().clone();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["status"], "pending");
    assert!(pending[0].get("passwordHash").is_none());
    let request_id = pending[0]["id"].as_str().unwrap().to_string();

    let approve_uri = format!("/api/user-requests/{}/approve", request_id);
    let approved = send(&server.app, post_form(&approve_uri, "", Some(&admin))).await;
    assert_eq!(approved.status, StatusCode::OK);
    assert_eq!(approved.body["user"]["email"], "joiner@example.com");

    let again = send(&server.app, post_form(&approve_uri, "", Some(&admin))).await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let rejected = send(
        &server.app,
        delete(&format!("/api/user-requests/{}", request_id), Some(&admin)),
    )
    .await;
    assert_eq!(rejected.status, StatusCode::CONFLICT);

    let missing = send(
        &server.app,
        post_form("/api/user-requests/req_missing/approve", "", Some(&admin)),
    )
    .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    // The approved password works without being re-entered.
    login(&server, "joiner@example.com", "secret").await;
}

#[tokio::test]
async fn test_create_and_delete_user() {
    let server = create_test_server().await;
    let admin = admin_cookie(&server).await;

    let created = send(
        &server.app,
        post_json(
            "/api/users",
            json!({"email": "a@b.com", "password": "x", "name": "A"}),
            Some(&admin),
        ),
    )
    .await;
    assert_eq!(created.status, StatusCode::OK);
    let user_id = created.body["user"]["id"].as_str().unwrap().to_string();

    let duplicate = send(
        &server.app,
        post_json(
            "/api/users",
            json!({"email": "a@b.com", "password": "y"}),
            Some(&admin),
        ),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let listed = send(&server.app, get("/api/users", Some(&admin))).await;
    assert_eq!(listed.body.as_array().unwrap().len(), 2);

    // The deleted user's live cookie stops working at once.
    let victim = login(&server, "a@b.com", "x").await;
    assert_eq!(
        send(&server.app, get("/api/settings", Some(&victim)))
            .await
            .status,
        StatusCode::OK
    );

    let deleted = send(
        &server.app,
        delete(&format!("/api/users/{}", user_id), Some(&admin)),
    )
    .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(server.state.sessions.len().await, 1);

    let after = send(&server.app, get("/api/settings", Some(&victim))).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);

    let missing = send(
        &server.app,
        delete(&format!("/api/users/{}", user_id), Some(&admin)),
    )
    .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Speedtest
// ============================================================================

#[tokio::test]
async fn test_speedtest_interval_validation() {
    let server = create_test_server().await;
    let admin = admin_cookie(&server).await;

    for bad in ["interval=0", "interval=-10", "interval=soon"] {
        let reply = send(
            &server.app,
            post_form("/api/speedtest/interval", bad, Some(&admin)),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{}", bad);
    }

    let reply = send(
        &server.app,
        post_form(
            "/api/speedtest/interval",
            "interval=120&enabled=false",
            Some(&admin),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);

    let current = send(&server.app, get("/api/speedtest/interval", Some(&admin))).await;
    assert_eq!(current.body["interval"], 120);
    assert_eq!(current.body["enabled"], false);
    assert!(!server.state.speedtest.is_scheduler_running());
}

#[tokio::test]
async fn test_manual_speedtest_recorded_in_history() {
    let server = create_test_server().await;
    let admin = admin_cookie(&server).await;

    let reply = send(&server.app, post_form("/api/speedtest", "", Some(&admin))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["download"], 94.0);

    let history = send(&server.app, get("/api/speedtest/history", Some(&admin))).await;
    assert_eq!(history.body.as_array().unwrap().len(), 1);

    let cleared = send(
        &server.app,
        post_form("/api/speedtest/history/clear", "", Some(&admin)),
    )
    .await;
    assert_eq!(cleared.status, StatusCode::OK);
    let history = send(&server.app, get("/api/speedtest/history", Some(&admin))).await;
    assert!(history.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_speedtest_toggle_and_status() {
    let server = create_test_server().await;
    let admin = admin_cookie(&server).await;

    let reply = send(
        &server.app,
        post_form("/api/admin/speedtest/toggle", "enabled=true", Some(&admin)),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["enabled"], true);

    let status = send(
        &server.app,
        get("/api/admin/speedtest/status", Some(&admin)),
    )
    .await;
    assert_eq!(status.body["enabled"], true);
    assert_eq!(status.body["schedulerRunning"], true);

    // Eager first run goes through the shell.
    wait_for(|| !server.shell.calls().is_empty()).await;
    assert_eq!(server.shell.calls()[0], "speedtest --json");

    send(
        &server.app,
        post_form("/api/admin/speedtest/toggle", "enabled=false", Some(&admin)),
    )
    .await;
    assert!(!server.state.speedtest.is_scheduler_running());

    let bad = send(
        &server.app,
        post_form("/api/admin/speedtest/toggle", "enabled=maybe", Some(&admin)),
    )
    .await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Settings and admin actions
// ============================================================================

#[tokio::test]
async fn test_auto_update_setting() {
    let server = create_test_server().await;
    let admin = admin_cookie(&server).await;

    let initial = send(&server.app, get("/api/settings", Some(&admin))).await;
    assert_eq!(initial.body["autoUpdate"], false);
    assert_eq!(initial.body["autoUpdateRunning"], false);

    let enabled = send(
        &server.app,
        post_form("/api/settings/auto-update", "enabled=true", Some(&admin)),
    )
    .await;
    assert_eq!(enabled.status, StatusCode::OK);
    assert_eq!(enabled.body["autoUpdate"], true);
    assert_eq!(enabled.body["autoUpdateRunning"], true);

    // Up to date, so no restart follows the check.
    wait_for(|| server.shell.calls().len() >= 2).await;
    assert!(server.shell.calls()[0].starts_with("git fetch"));
    assert!(server.supervisor.requests().is_empty());

    let disabled = send(
        &server.app,
        post_form("/api/settings/auto-update", "enabled=false", Some(&admin)),
    )
    .await;
    assert_eq!(disabled.body["autoUpdate"], false);
    assert_eq!(disabled.body["autoUpdateRunning"], false);
}

#[tokio::test]
async fn test_restart_answers_before_acting() {
    let server = create_test_server().await;
    let admin = admin_cookie(&server).await;

    let reply = send(&server.app, post_form("/api/admin/restart", "", Some(&admin))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);

    wait_for(|| !server.supervisor.requests().is_empty()).await;
    assert_eq!(server.supervisor.requests(), vec!["restart"]);

    // A second action while one is pending still reports success.
    let reply = send(&server.app, post_form("/api/admin/shutdown", "", Some(&admin))).await;
    assert_eq!(reply.body["success"], true);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.supervisor.requests(), vec!["restart"]);
}

#[tokio::test]
async fn test_update_runs_command_then_restarts() {
    let server = create_test_server().await;
    let admin = admin_cookie(&server).await;

    let reply = send(&server.app, post_form("/api/admin/update", "", Some(&admin))).await;
    assert_eq!(reply.status, StatusCode::OK);

    wait_for(|| !server.supervisor.requests().is_empty()).await;
    assert!(server.shell.calls().contains(&"bash start.sh 0".to_string()));
    assert_eq!(server.supervisor.requests(), vec!["restart"]);
}

// ============================================================================
// Scoreboard
// ============================================================================

#[tokio::test]
async fn test_scoreboard_with_optional_auth() {
    let server = create_test_server().await;
    let admin = admin_cookie(&server).await;

    let anonymous = send(&server.app, post_json("/api/scores", json!({"score": 5}), None)).await;
    assert_eq!(anonymous.status, StatusCode::OK);
    assert_eq!(anonymous.body["userId"], "anonymous");

    let player = send(
        &server.app,
        post_json("/api/scores", json!({"score": 10}), Some(&admin)),
    )
    .await;
    assert_eq!(player.status, StatusCode::OK);

    let top = send(&server.app, get("/api/scores", None)).await;
    let top = top.body.as_array().unwrap().clone();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0]["score"], 10);
    assert_eq!(top[0]["player"], "admin@example.com");
    assert_eq!(top[1]["player"], "Anonymous");

    let limited = send(&server.app, get("/api/scores?limit=1", None)).await;
    assert_eq!(limited.body.as_array().unwrap().len(), 1);

    let denied = send(&server.app, delete("/api/scores", None)).await;
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);

    let reset = send(&server.app, delete("/api/scores", Some(&admin))).await;
    assert_eq!(reset.status, StatusCode::OK);
    let top = send(&server.app, get("/api/scores", None)).await;
    assert!(top.body.as_array().unwrap().is_empty());
}

// ============================================================================
// LED control
// ============================================================================

#[tokio::test]
async fn test_led_routes_require_auth() {
    let server = create_test_server().await;

    let reply = send(&server.app, get("/api/led/status", None)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    let reply = send(
        &server.app,
        post_json("/api/led/config", json!({"mode": "none"}), None),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_led_status_and_config() {
    let server = create_test_server().await;
    let cookie = admin_cookie(&server).await;

    let reply = send(&server.app, get("/api/led/status", Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["available"], false);

    write_trigger(&server.leds_root, "PWR", "none mmc0 [actpwr] heartbeat");
    let reply = send(&server.app, get("/api/led/status", Some(&cookie))).await;
    assert_eq!(reply.body["available"], true);
    assert_eq!(reply.body["currentTrigger"], "actpwr");
    assert_eq!(reply.body["config"]["ledType"], "PWR");

    let reply = send(
        &server.app,
        post_json("/api/led/config", json!({"mode": "heartbeat"}), Some(&cookie)),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["config"]["mode"], "heartbeat");
    assert!(
        server
            .shell
            .calls()
            .iter()
            .any(|c| c.starts_with("sudo sh -c echo heartbeat > "))
    );

    let reply = send(
        &server.app,
        post_json("/api/led/config", json!({"mode": "timer"}), Some(&cookie)),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(
        &server.app,
        post_json(
            "/api/led/config",
            json!({"ledType": "ACT", "mode": "none"}),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_concurrent_led_update_is_conflict() {
    let server = create_test_server().await;
    let cookie = admin_cookie(&server).await;
    write_trigger(&server.leds_root, "PWR", "none mmc0 [actpwr] heartbeat");
    server.shell.slow_sudo(Duration::from_millis(400));

    let first = {
        let app = server.app.clone();
        let cookie = cookie.clone();
        tokio::spawn(async move {
            send(
                &app,
                post_json("/api/led/config", json!({"mode": "heartbeat"}), Some(&cookie)),
            )
            .await
        })
    };
    let shell = server.shell.clone();
    wait_for(move || shell.calls().iter().any(|c| c.starts_with("sudo"))).await;

    let second = send(
        &server.app,
        post_json("/api/led/config", json!({"mode": "none"}), Some(&cookie)),
    )
    .await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body["error"], "Update already in progress");

    let first = first.await.unwrap();
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["config"]["mode"], "heartbeat");
}

// ============================================================================
// Captured logs
// ============================================================================

fn log_entry(level: &str, message: &str) -> LogEntry {
    LogEntry {
        timestamp: Utc::now(),
        level: level.to_string(),
        target: "pc_server".to_string(),
        message: message.to_string(),
    }
}

#[tokio::test]
async fn test_logs_list_limit_and_clear() {
    let server = create_test_server().await;
    let cookie = admin_cookie(&server).await;

    assert_eq!(
        send(&server.app, get("/api/logs", None)).await.status,
        StatusCode::UNAUTHORIZED
    );

    server.state.logs.push(log_entry("info", "first"));
    server.state.logs.push(log_entry("warn", "second"));
    server.state.logs.push(log_entry("error", "third"));

    let reply = send(&server.app, get("/api/logs", Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::OK);
    let logs = reply.body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0]["message"], "first");
    assert_eq!(logs[2]["level"], "error");

    let reply = send(&server.app, get("/api/logs?limit=1", Some(&cookie))).await;
    let logs = reply.body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["message"], "third");

    let reply = send(
        &server.app,
        post_form("/api/logs/clear", "", Some(&cookie)),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(server.state.logs.is_empty());
}
