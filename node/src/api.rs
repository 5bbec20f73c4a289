//! # REST API
//!
//! Builds the axum router that exposes coinpass over HTTP. Credentials and
//! group identifiers travel in request headers; the client address used for
//! session binding is the TCP peer address.
//!
//! ## Endpoints
//!
//! | Method | Path                   | Headers              | Success            |
//! |--------|------------------------|----------------------|--------------------|
//! | GET    | `/health`              |                      | 200                |
//! | POST   | `/api/client/register` | Username, Password   | 201                |
//! | POST   | `/api/client/login`    | Username, Password   | 201 `{token}`      |
//! | POST   | `/api/client/logout`   | Username, Token      | 204                |
//! | GET    | `/api/group/:user`     | Username, Token      | 200 group          |
//! | POST   | `/api/group/create`    | Username, Token      | 200 group          |
//! | POST   | `/api/group/join`      | Username, Token, ID  | 200 group          |
//! | POST   | `/api/group/coin`      | Username, Token, ID  | 201 transfer       |
//!
//! Failures carry `{ "error": <code>, "message": <text> }` with the status
//! given by [`status_for`].

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use coinpass_protocol::auth::Credentials;
use coinpass_protocol::storage::CoinDb;
use coinpass_protocol::{CoinService, ServiceError, ServiceResult};

use crate::metrics::SharedMetrics;

pub const USERNAME_HEADER: &str = "Username";
pub const PASSWORD_HEADER: &str = "Password";
pub const TOKEN_HEADER: &str = "Token";
pub const GROUP_HEADER: &str = "ID";

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub service: Arc<CoinService<CoinDb>>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// Handlers extract `ConnectInfo<SocketAddr>`, so the router must be served
/// with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/client/register", post(register_handler))
        .route("/api/client/login", post(login_handler))
        .route("/api/client/logout", post(logout_handler))
        .route("/api/group/create", post(create_group_handler))
        .route("/api/group/join", post(join_handler))
        .route("/api/group/coin", post(coin_handler))
        .route("/api/group/:user", get(group_of_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub live_sessions: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    /// The blocking task running the service call panicked or was cancelled.
    Internal(String),
}

/// HTTP status for each service classification.
pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::MissingCredential(_)
        | ServiceError::MissingField(_)
        | ServiceError::MalformedIdentity(_)
        | ServiceError::MalformedSecret(_)
        | ServiceError::IdentityTaken(_)
        | ServiceError::AlreadyMember(_) => StatusCode::BAD_REQUEST,
        ServiceError::InvalidSession(_) | ServiceError::InvalidCredentials => {
            StatusCode::UNAUTHORIZED
        }
        ServiceError::NotAuthorizedHolder(_) => StatusCode::FORBIDDEN,
        ServiceError::UnknownIdentity(_) | ServiceError::GroupNotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::StaleHolder(_) => StatusCode::CONFLICT,
        ServiceError::PersistenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Service(err) => {
                let message = match &err {
                    // Storage details stay in the logs.
                    ServiceError::PersistenceUnavailable(detail) => {
                        tracing::error!(detail = %detail, "request failed on storage");
                        "storage temporarily unavailable".to_string()
                    }
                    other => other.to_string(),
                };
                (
                    status_for(&err),
                    ErrorResponse {
                        error: err.code().to_string(),
                        message,
                    },
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "handler task failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "internal".into(),
                        message: "internal error".into(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request Helpers
// ---------------------------------------------------------------------------

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Owned copy of the caller's credentials, movable into a blocking task.
struct RequestCredentials {
    identity: Option<String>,
    token: Option<String>,
    address: IpAddr,
}

impl RequestCredentials {
    fn from_request(headers: &HeaderMap, peer: SocketAddr) -> Self {
        Self {
            identity: header(headers, USERNAME_HEADER),
            token: header(headers, TOKEN_HEADER),
            address: peer.ip(),
        }
    }

    fn borrow(&self) -> Credentials<'_> {
        Credentials::new(self.identity.as_deref(), self.token.as_deref(), self.address)
    }
}

/// Runs a service call on the blocking pool (password hashing and sled
/// I/O both block), timing it and counting refusals.
async fn call<T, F>(state: &AppState, operation: &'static str, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&CoinService<CoinDb>) -> ServiceResult<T> + Send + 'static,
{
    let service = Arc::clone(&state.service);
    let timer = state
        .metrics
        .operation_duration_seconds
        .with_label_values(&[operation])
        .start_timer();
    let joined = tokio::task::spawn_blocking(move || f(&*service)).await;
    timer.observe_duration();

    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            record_refusal(&state.metrics, operation, &err);
            if matches!(err, ServiceError::InvalidSession(_)) {
                // Validation evicts the session it refuses.
                state
                    .metrics
                    .live_sessions
                    .set(state.service.sessions().len() as i64);
            }
            Err(ApiError::Service(err))
        }
        Err(join_err) => Err(ApiError::Internal(join_err.to_string())),
    }
}

fn record_refusal(metrics: &SharedMetrics, operation: &str, err: &ServiceError) {
    let code = err.code();
    if err.is_authentication_failure() {
        metrics.auth_failures_total.with_label_values(&[code]).inc();
    } else if operation == "pass_coin" {
        metrics
            .coin_transfer_rejections_total
            .with_label_values(&[code])
            .inc();
    } else if operation == "join" {
        metrics.join_rejections_total.with_label_values(&[code]).inc();
    }
    tracing::debug!(operation, code, "request refused");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        version: state.version.clone(),
        live_sessions: state.service.sessions().len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /api/client/register`
async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let username = header(&headers, USERNAME_HEADER);
    let password = header(&headers, PASSWORD_HEADER);

    let registered = call(&state, "register", move |svc| {
        svc.register(username.as_deref(), password.as_deref())
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            username: registered.to_string(),
        }),
    ))
}

/// `POST /api/client/login`
async fn login_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let username = header(&headers, USERNAME_HEADER);
    let password = header(&headers, PASSWORD_HEADER);

    let token = call(&state, "login", move |svc| {
        svc.login(username.as_deref(), password.as_deref(), peer.ip())
    })
    .await?;

    state.metrics.sessions_issued_total.inc();
    state
        .metrics
        .live_sessions
        .set(state.service.sessions().len() as i64);

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            token: token.to_string(),
        }),
    ))
}

/// `POST /api/client/logout`
async fn logout_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let creds = RequestCredentials::from_request(&headers, peer);
    call(&state, "logout", move |svc| svc.logout(&creds.borrow())).await?;

    state
        .metrics
        .live_sessions
        .set(state.service.sessions().len() as i64);
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/group/:user`: the first group `user` belongs to.
async fn group_of_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(user): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let creds = RequestCredentials::from_request(&headers, peer);
    let group = call(&state, "group_of", move |svc| {
        svc.group_of(&creds.borrow(), &user)
    })
    .await?;
    Ok(Json(group))
}

/// `POST /api/group/create`
async fn create_group_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let creds = RequestCredentials::from_request(&headers, peer);
    let group = call(&state, "create_group", move |svc| {
        svc.create_group(&creds.borrow())
    })
    .await?;
    Ok(Json(group))
}

/// `POST /api/group/join`
async fn join_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let creds = RequestCredentials::from_request(&headers, peer);
    let group_id = header(&headers, GROUP_HEADER);
    let group = call(&state, "join", move |svc| {
        svc.join(&creds.borrow(), group_id.as_deref())
    })
    .await?;
    Ok(Json(group))
}

/// `POST /api/group/coin`: pass the coin on.
async fn coin_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let creds = RequestCredentials::from_request(&headers, peer);
    let group_id = header(&headers, GROUP_HEADER);
    let transfer = call(&state, "pass_coin", move |svc| {
        svc.pass_coin(&creds.borrow(), group_id.as_deref())
    })
    .await?;

    state.metrics.coin_transfers_total.inc();
    Ok((StatusCode::CREATED, Json(transfer)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
