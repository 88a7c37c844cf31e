//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the synchronizer over HTTP. Handlers
//! share [`AppState`] through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                     | Description                          |
//! |--------|--------------------------|--------------------------------------|
//! | GET    | `/health`                | Liveness check                       |
//! | GET    | `/accounts`              | Every tracked slot + last operation  |
//! | GET    | `/accounts/:name`        | One slot                             |
//! | POST   | `/accounts/:name/create` | Create the slot's account            |
//! | POST   | `/accounts/:name/fund`   | Fund and load balances               |
//! | POST   | `/refresh`               | Refresh some or all slots            |
//! | POST   | `/payments`              | Record a payment hash, refresh all   |
//! | GET    | `/ws`                    | Live registry change events          |
//!
//! Secret seeds never leave the process: account views carry the public key
//! and balances only.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use lumen_sync::config::explorer_tx_url;
use lumen_sync::{
    AccountRecord, AccountSynchronizer, Balance, RefreshReport, SlotOutcome, StoreError, SyncError,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state. Cheap to clone; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub sync: Arc<AccountSynchronizer>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/accounts", get(list_accounts_handler))
        .route("/accounts/:name", get(account_handler))
        .route("/accounts/:name/create", post(create_handler))
        .route("/accounts/:name/fund", post(fund_handler))
        .route("/refresh", post(refresh_handler))
        .route("/payments", post(payment_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Public view of one slot.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountView {
    pub name: String,
    pub present: bool,
    pub public_key: Option<String>,
    pub balances: Vec<Balance>,
    /// An operation is in flight; actions on this slot will be refused.
    pub busy: bool,
}

impl AccountView {
    fn new(name: &str, record: Option<&AccountRecord>, busy: bool) -> Self {
        Self {
            name: name.to_string(),
            present: record.is_some(),
            public_key: record.map(|r| r.public_key().to_string()),
            balances: record.map(|r| r.balances().to_vec()).unwrap_or_default(),
            busy,
        }
    }
}

/// Response payload for `GET /accounts`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountsResponse {
    pub accounts: Vec<AccountView>,
    pub hash_id: Option<String>,
    pub explorer_url: Option<String>,
    pub revision: u64,
}

/// Optional body for `POST /refresh`. No body, or an empty list, means all.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub names: Vec<String>,
}

/// Per-slot line of a refresh response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SlotResult {
    pub name: String,
    /// `refreshed`, `skipped` or `failed`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balances: Option<Vec<Balance>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub results: Vec<SlotResult>,
}

impl From<&RefreshReport> for RefreshResponse {
    fn from(report: &RefreshReport) -> Self {
        let results = report
            .iter()
            .map(|(name, outcome)| {
                let (status, balances, error) = match outcome {
                    SlotOutcome::Refreshed(b) => ("refreshed", Some(b.clone()), None),
                    SlotOutcome::Skipped => ("skipped", None, None),
                    SlotOutcome::Failed(e) => ("failed", None, Some(e.to_string())),
                };
                SlotResult {
                    name: name.to_string(),
                    status: status.to_string(),
                    balances,
                    error,
                }
            })
            .collect();
        Self { results }
    }
}

/// Body for `POST /payments`.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub hash_id: String,
    pub explorer_url: String,
    pub results: Vec<SlotResult>,
}

/// Error body returned on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Sync(SyncError),
    Store(StoreError),
    BadRequest(String),
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        Self::Sync(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// HTTP status for a synchronizer failure.
pub fn status_for(err: &SyncError) -> StatusCode {
    match err {
        SyncError::AccountNotFound(_) | SyncError::UnknownSlot(_) => StatusCode::NOT_FOUND,
        SyncError::SlotBusy(_) => StatusCode::CONFLICT,
        SyncError::CreationFailed(_)
        | SyncError::FundingFailed { .. }
        | SyncError::QueryFailed { .. } => StatusCode::BAD_GATEWAY,
        SyncError::PersistenceFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        SyncError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, error) = match self {
            Self::Sync(e) => (status_for(&e), e.kind(), e.to_string()),
            Self::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
        };
        let body = ErrorResponse {
            error,
            kind: kind.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 while the process is alive.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "ok", "version": state.version })),
    )
}

/// `GET /accounts`: every tracked slot in configured order.
async fn list_accounts_handler(State(state): State<AppState>) -> ApiResult<AccountsResponse> {
    let registry = state.sync.registry();
    let accounts = registry
        .accounts()?
        .iter()
        .map(|(name, record)| AccountView::new(name, record.as_ref(), state.sync.is_busy(name)))
        .collect();
    let hash_id = registry.hash_id();

    Ok(Json(AccountsResponse {
        accounts,
        explorer_url: hash_id.as_deref().map(explorer_tx_url),
        hash_id,
        revision: registry.revision(),
    }))
}

/// `GET /accounts/:name`: 404 for untracked names and for empty slots.
async fn account_handler(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<AccountView> {
    let registry = state.sync.registry();
    if !registry.tracked().contains(&name) {
        return Err(SyncError::UnknownSlot(name).into());
    }
    match registry.get_account(&name)? {
        Some(record) => Ok(Json(AccountView::new(
            &name,
            Some(&record),
            state.sync.is_busy(&name),
        ))),
        None => Err(SyncError::AccountNotFound(name).into()),
    }
}

/// `POST /accounts/:name/create`
async fn create_handler(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<AccountView> {
    let started = Instant::now();
    let result = state.sync.create(&name).await;
    observe(&state, "create", started, &result);
    let record = result?;
    Ok(Json(AccountView::new(&name, Some(&record), false)))
}

/// `POST /accounts/:name/fund`
async fn fund_handler(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<AccountView> {
    let started = Instant::now();
    let result = state.sync.fund(&name).await;
    observe(&state, "fund", started, &result);
    let record = result?;
    Ok(Json(AccountView::new(&name, Some(&record), false)))
}

/// `POST /refresh`: always 200; per-slot failures are in the body.
async fn refresh_handler(
    State(state): State<AppState>,
    body: Option<Json<RefreshRequest>>,
) -> Json<RefreshResponse> {
    let names = body.map(|Json(req)| req.names).unwrap_or_default();

    let started = Instant::now();
    let report = if names.is_empty() {
        state.sync.refresh_all().await
    } else {
        state.sync.refresh_balances(&names).await
    };
    let outcome = if report.is_clean() { "ok" } else { "partial" };
    state.metrics.observe("refresh", outcome, started.elapsed());

    Json(RefreshResponse::from(&report))
}

/// `POST /payments`: settles a payment submitted elsewhere.
async fn payment_handler(
    State(state): State<AppState>,
    Json(req): Json<PaymentRequest>,
) -> ApiResult<PaymentResponse> {
    let hash = req.hash.trim().to_string();
    if hash.is_empty() {
        return Err(ApiError::BadRequest("payment hash must not be empty".into()));
    }

    let started = Instant::now();
    let result = state.sync.record_payment(&hash).await;
    observe(&state, "payment", started, &result);
    let report = result?;

    Ok(Json(PaymentResponse {
        explorer_url: explorer_tx_url(&hash),
        hash_id: hash,
        results: RefreshResponse::from(&report).results,
    }))
}

fn observe<T>(state: &AppState, operation: &str, started: Instant, result: &Result<T, SyncError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    state.metrics.observe(operation, outcome, started.elapsed());
    update_present_gauge(state);
}

/// Recounts slots holding a record. A store error leaves the gauge as is.
pub fn update_present_gauge(state: &AppState) {
    if let Ok(accounts) = state.sync.registry().accounts() {
        let present = accounts.iter().filter(|(_, r)| r.is_some()).count();
        state.metrics.accounts_present.set(present as i64);
    }
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// `GET /ws`: pushes JSON-encoded registry events. Client messages are
/// ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.sync.registry().subscribe();
    state.metrics.ws_clients.inc();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }

    state.metrics.ws_clients.dec();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use lumen_sync::{AccountRegistry, MemoryAccountStore, SandboxLedger, TrackedAccounts};
    use tower::ServiceExt;

    use crate::metrics::ManagerMetrics;

    struct TestApp {
        router: Router,
        state: AppState,
        ledger: Arc<SandboxLedger>,
    }

    fn test_app() -> TestApp {
        let store = Arc::new(MemoryAccountStore::new());
        let registry = Arc::new(AccountRegistry::new(store, TrackedAccounts::default()));
        let ledger = Arc::new(SandboxLedger::new());
        let sync = Arc::new(AccountSynchronizer::new(registry, ledger.clone()));
        let state = AppState {
            version: "0.1.0-test".into(),
            sync,
            metrics: Arc::new(ManagerMetrics::new().expect("metrics")),
        };
        TestApp {
            router: create_router(state.clone()),
            state,
            ledger,
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        send(router, req).await
    }

    async fn post(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        send(router, req).await
    }

    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        send(router, req).await
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = test_app();
        let (status, body) = get(&app.router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], "0.1.0-test");
    }

    #[tokio::test]
    async fn fresh_listing_shows_empty_slots() {
        let app = test_app();
        let (status, body) = get(&app.router, "/accounts").await;

        assert_eq!(status, StatusCode::OK);
        let resp: AccountsResponse = serde_json::from_slice(&body).unwrap();
        let names: Vec<_> = resp.accounts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["ayala3", "ayala4"]);
        assert!(resp.accounts.iter().all(|a| !a.present && a.balances.is_empty()));
        assert!(resp.hash_id.is_none());
    }

    #[tokio::test]
    async fn create_then_fund_round_trip() {
        let app = test_app();

        let (status, body) = post(&app.router, "/accounts/ayala3/create").await;
        assert_eq!(status, StatusCode::OK);
        let created: AccountView = serde_json::from_slice(&body).unwrap();
        assert!(created.present);
        assert!(created.balances.is_empty());

        let (status, body) = post(&app.router, "/accounts/ayala3/fund").await;
        assert_eq!(status, StatusCode::OK);
        let funded: AccountView = serde_json::from_slice(&body).unwrap();
        assert_eq!(funded.public_key, created.public_key);
        assert_eq!(funded.balances, vec![Balance::native("10000.0000000")]);

        let (_, body) = get(&app.router, "/accounts").await;
        let listing: AccountsResponse = serde_json::from_slice(&body).unwrap();
        let hash = listing.hash_id.expect("funding sets the hash id");
        assert!(listing.explorer_url.unwrap().ends_with(&hash));
        assert_eq!(app.state.metrics.accounts_present.get(), 1);
    }

    #[tokio::test]
    async fn secrets_never_appear_in_responses() {
        let app = test_app();
        post(&app.router, "/accounts/ayala4/create").await;
        let record = app
            .state
            .sync
            .registry()
            .get_account("ayala4")
            .unwrap()
            .unwrap();
        let seed = record.secret().expose().to_string();

        for path in ["/accounts", "/accounts/ayala4"] {
            let (_, body) = get(&app.router, path).await;
            let text = String::from_utf8(body).unwrap();
            assert!(!text.contains(&seed), "{path} leaked the seed");
            assert!(!text.contains("secret"));
        }
    }

    #[tokio::test]
    async fn missing_and_unknown_slots_are_404() {
        let app = test_app();

        let (status, body) = post(&app.router, "/accounts/ayala3/fund").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.kind, "account_not_found");
        assert_eq!(app.ledger.fund_calls(), 0);

        let (status, _) = get(&app.router, "/accounts/ayala4").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = post(&app.router, "/accounts/mallory/create").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.kind, "unknown_slot");
    }

    #[tokio::test]
    async fn gateway_failures_map_to_bad_gateway() {
        let app = test_app();
        app.ledger.fail_keypair_generation(true);

        let (status, body) = post(&app.router, "/accounts/ayala3/create").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.kind, "creation_failed");

        let text = app.state.metrics.encode().unwrap();
        assert!(text.contains(r#"outcome="creation_failed""#));
    }

    #[tokio::test]
    async fn refresh_reports_each_slot() {
        let app = test_app();
        post(&app.router, "/accounts/ayala3/create").await;
        post(&app.router, "/accounts/ayala3/fund").await;

        // No body: refresh everything.
        let (status, body) = post(&app.router, "/refresh").await;
        assert_eq!(status, StatusCode::OK);
        let resp: RefreshResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.results.len(), 2);
        assert_eq!(resp.results[0].status, "refreshed");
        assert_eq!(resp.results[1].status, "skipped");

        app.ledger.fail_balance_queries(true);
        let (status, body) =
            post_json(&app.router, "/refresh", serde_json::json!({ "names": ["ayala3"] })).await;
        assert_eq!(status, StatusCode::OK);
        let resp: RefreshResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].status, "failed");
        assert!(resp.results[0].error.is_some());
    }

    #[tokio::test]
    async fn payment_records_hash_and_refreshes() {
        let app = test_app();
        let (status, _) =
            post_json(&app.router, "/payments", serde_json::json!({ "hash": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            post_json(&app.router, "/payments", serde_json::json!({ "hash": "abc123" })).await;
        assert_eq!(status, StatusCode::OK);
        let resp: PaymentResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.hash_id, "abc123");
        assert!(resp.explorer_url.ends_with("/tx/abc123"));
        assert_eq!(resp.results.len(), 2);
        assert_eq!(app.state.sync.registry().hash_id().as_deref(), Some("abc123"));
    }

    #[test]
    fn error_statuses() {
        assert_eq!(status_for(&SyncError::SlotBusy("a".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&SyncError::Cancelled("a".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&SyncError::PersistenceFailed {
                key: "a".into(),
                source: StoreError::WriteRejected("ro".into()),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn disposed_synchronizer_answers_503() {
        let app = test_app();
        app.state.sync.dispose();
        let (status, _) = post(&app.router, "/accounts/ayala3/create").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
