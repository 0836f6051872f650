pub mod config;
pub mod error;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{connect_info::ConnectInfo, Extension, MatchedPath, State};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use config::GatewayConfig;
use error::AuthRejection;
use pata_auth::{
    Argon2Hasher, AccessTokenValidator, AppTokenTable, AppTokenValidator, AuthError, AuthOptions,
    AuthRegistry, CredentialRequest, MemoryAppTokenTable, MemoryTokenStore, Principal,
    SecretHasher, TokenStore,
};
use pata_obs::{
    auth_decisions_total, encode_prometheus_metrics, health_router, http_requests_total, SpanExt,
    PROMETHEUS_CONTENT_TYPE,
};
use serde_json::json;
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub const SERVICE_NAME: &str = "pata-gateway";
const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_BODY_BYTES: usize = 64 * 1024;

const PROTOCOL_ACCESS: &str = "access_token";
const PROTOCOL_APP: &str = "app_token";

#[derive(Clone, Debug)]
pub struct AppState {
    pub registry: Arc<AuthRegistry>,
    pub access: AccessTokenValidator,
    pub app: AppTokenValidator,
}

impl AppState {
    /// State over an already-initialized registry and an app-token table.
    pub fn new(registry: Arc<AuthRegistry>, app_tokens: Arc<dyn AppTokenTable>) -> Self {
        Self {
            access: AccessTokenValidator::new(registry.clone()),
            app: AppTokenValidator::new(app_tokens),
            registry,
        }
    }

    /// Bind adapters described by `config`: SQLite when a database URL is
    /// set, in-memory tables otherwise.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self, AuthError> {
        let tokens: Arc<dyn TokenStore>;
        let app_tokens: Arc<dyn AppTokenTable>;
        match &config.database_url {
            Some(url) => {
                let pool = pata_auth::sql::connect(url).await?;
                tracing::info!(database_url = %url, "using sqlite token tables");
                tokens = Arc::new(pata_auth::sql::SqlTokenStore::new(pool.clone()));
                app_tokens = Arc::new(pata_auth::sql::SqlAppTokenTable::new(pool));
            }
            None => {
                tracing::warn!("no database configured; token tables are in-memory");
                tokens = Arc::new(MemoryTokenStore::new());
                app_tokens = Arc::new(MemoryAppTokenTable::new());
            }
        }
        let hasher: Arc<dyn SecretHasher> = Arc::new(Argon2Hasher);

        let mut options = AuthOptions::new(tokens, hasher);
        options.access_token_name = config.access_token_name.clone();
        let registry = Arc::new(AuthRegistry::initialized(options));

        Ok(Self::new(registry, app_tokens))
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let with_auth = Router::new()
        .route("/hello/withAuth", get(hello_with_auth))
        .route_layer(from_fn_with_state(state.clone(), require_access_token));
    let with_login_app = Router::new()
        .route("/hello/withLoginApp", get(hello_with_login_app))
        .route_layer(from_fn_with_state(state.clone(), require_app_token));

    Router::new()
        .route("/hello", get(hello))
        .merge(with_auth)
        .merge(with_login_app)
        .with_state(state)
        .route("/metrics", get(metrics))
        .merge(health_router(SERVICE_NAME))
        .layer(from_fn(track_http_metrics))
        .layer(from_fn(request_context))
}

/// Guard for the access-token protocol.
///
/// On success the caller's [`Principal`] is available to the handler as a
/// request extension.
pub async fn require_access_token(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthRejection> {
    let outcome = {
        let credentials = CredentialRequest::from_headers(req.headers());
        state.access.validate_request(&credentials).await
    };

    match outcome {
        Ok(principal) => {
            record_decision(PROTOCOL_ACCESS, "allow");
            tracing::debug!(user_id = principal.user_id, sid = %principal.sid, "access token accepted");
            req.extensions_mut().insert(principal);
            Ok(next.run(req).await)
        }
        Err(error) => Err(deny(PROTOCOL_ACCESS, error, AuthRejection::AccessDenied)),
    }
}

/// Guard for the app-token protocol.
///
/// The token comes from the `token` header, else a form or JSON body, else the
/// query string.
pub async fn require_app_token(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthRejection> {
    let (parts, body) = req.into_parts();
    let kind = body_kind(&parts.headers);
    let (buffered, body) = match kind {
        Some(_) => {
            let bytes = to_bytes(body, MAX_BODY_BYTES).await.map_err(|error| {
                tracing::warn!(%error, "failed to buffer request body");
                deny(PROTOCOL_APP, AuthError::Unauthenticated, AuthRejection::AppDenied)
            })?;
            (Some(bytes.clone()), Body::from(bytes))
        }
        None => (None, body),
    };

    let outcome = {
        let credentials =
            CredentialRequest::from_headers(&parts.headers).with_query(parts.uri.query());
        let credentials = match kind {
            Some(BodyKind::Form) => credentials.with_form(buffered.as_deref()),
            Some(BodyKind::Json) => credentials.with_json(buffered.as_deref()),
            None => credentials,
        };
        state.app.validate_request(&credentials).await
    };

    match outcome {
        Ok(()) => {
            record_decision(PROTOCOL_APP, "allow");
            Ok(next.run(Request::from_parts(parts, body)).await)
        }
        Err(error) => Err(deny(PROTOCOL_APP, error, AuthRejection::AppDenied)),
    }
}

// Everything but a configuration error fails closed into `denied`.
fn deny(protocol: &'static str, error: AuthError, denied: AuthRejection) -> AuthRejection {
    match &error {
        AuthError::Configuration(_) => {
            record_decision(protocol, "misconfigured");
            tracing::error!(protocol, %error, "auth guard invoked before registry init");
            return AuthRejection::Misconfigured;
        }
        AuthError::Backend(_) => {
            record_decision(protocol, "backend_error");
            tracing::warn!(protocol, %error, "auth backend failed; denying request");
        }
        AuthError::Unauthenticated | AuthError::InvalidCredential => {
            record_decision(protocol, "deny");
            tracing::debug!(protocol, %error, "credential refused");
        }
    }
    denied
}

fn record_decision(protocol: &str, outcome: &str) {
    auth_decisions_total().inc(&[protocol, outcome], 1);
}

#[derive(Debug, Clone, Copy)]
enum BodyKind {
    Form,
    Json,
}

fn body_kind(headers: &HeaderMap) -> Option<BodyKind> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime = content_type.split(';').next()?.trim();
    if mime.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        Some(BodyKind::Form)
    } else if mime.eq_ignore_ascii_case("application/json") {
        Some(BodyKind::Json)
    } else {
        None
    }
}

async fn hello() -> Json<serde_json::Value> {
    Json(json!({ "message": "Hello World!" }))
}

async fn hello_with_auth(Extension(principal): Extension<Principal>) -> Json<serde_json::Value> {
    tracing::debug!(user_id = principal.user_id, "serving withAuth");
    Json(json!({ "success": true, "message": "Hello World withAuth!" }))
}

async fn hello_with_login_app() -> Json<serde_json::Value> {
    Json(json!({ "success": true, "message": "Hello World withLoginApp!" }))
}

async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
        )],
        encode_prometheus_metrics(),
    )
}

async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    let status = response.status().as_u16().to_string();
    http_requests_total().inc(&[route.as_str(), status.as_str()], 1);

    response
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let request_id_value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &request_id_value {
        req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    let span = info_span!(
        "http.request",
        method = %method,
        path = %path,
        remote_addr = remote_addr.as_str(),
        request_id = %request_id
    );
    span.with_req(&request_id);

    let start = Instant::now();
    let mut response = async move {
        tracing::info!(event = "request_start", method = %method, path = %path);
        let response = next.run(req).await;
        tracing::info!(
            event = "request_end",
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            latency_ms = start.elapsed().as_secs_f64() * 1000.0
        );
        response
    }
    .instrument(span)
    .await;

    if let Some(value) = request_id_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
