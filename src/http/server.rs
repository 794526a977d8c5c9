//! HTTP server wiring: route pipeline composition and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::auth::{
    permission, AuthorizationGate, DenyReason, Directory, RequestPrincipal, Requirement,
    SessionVerifier,
};
use crate::config::GatekeeperConfig;
use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{BypassRules, Category, RateLimiter, RateLimitPolicy};

use super::middleware::{
    authenticate, authorize, limit_api, limit_by_ip, limit_tiered, GateState,
};
use super::responder;

/// The gate's HTTP server.
///
/// Owns the shared gating state and composes the per-route middleware
/// pipelines: IP-bucketed limits run before authentication, tier-scaled
/// limits after it.
pub struct GateServer {
    addr: SocketAddr,
    state: GateState,
    token_ttl_secs: i64,
}

#[derive(Clone)]
struct AppState {
    state: GateState,
    token_ttl_secs: i64,
}

impl GateServer {
    /// Build a server from validated configuration and a directory
    /// implementation.
    pub fn new(config: &GatekeeperConfig, directory: Arc<dyn Directory>) -> Result<Self> {
        let verifier = SessionVerifier::new(config.auth.signing_secret.clone());
        let gate = Arc::new(AuthorizationGate::new(verifier, directory.clone()));

        let trusted_ips = config
            .rate_limits
            .trusted_ips
            .iter()
            .map(|ip| {
                ip.parse().map_err(|_| {
                    GatekeeperError::Config(format!("invalid trusted IP: {ip}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let trusted_proxies = config
            .server
            .trusted_proxies
            .iter()
            .map(|ip| {
                ip.parse().map_err(|_| {
                    GatekeeperError::Config(format!("invalid trusted proxy: {ip}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let state = GateState {
            gate,
            directory,
            limiter: Arc::new(RateLimiter::new()),
            policy: Arc::new(RateLimitPolicy::from_settings(&config.rate_limits)),
            bypass: Arc::new(BypassRules::new(
                config.rate_limits.health_paths.clone(),
                trusted_ips,
            )),
            cookie_name: config.auth.cookie_name.clone(),
            trusted_proxies: Arc::new(trusted_proxies),
        };

        Ok(Self {
            addr: config.server.http_addr,
            state,
            token_ttl_secs: config.auth.token_ttl_secs,
        })
    }

    /// Build the route tree with its gating pipelines.
    pub fn router(&self) -> Router {
        let state = self.state.clone();
        let app = AppState {
            state: state.clone(),
            token_ttl_secs: self.token_ttl_secs,
        };

        // Login: IP-bucketed limit before any identity work. Failed
        // attempts consume quota; successful ones are settled back.
        let login_routes = Router::new().route("/login", post(login)).layer(from_fn({
            let state = state.clone();
            move |req: Request, next: Next| limit_by_ip(state.clone(), Category::Login, req, next)
        }));

        // Authentication-only route: attaches the principal, no
        // permission requirement. Limited per identity at the flat API
        // quota.
        let me_routes = Router::new()
            .route("/me", get(me))
            .layer(from_fn({
                let state = state.clone();
                move |req: Request, next: Next| limit_api(state.clone(), req, next)
            }))
            .layer(from_fn({
                let state = state.clone();
                move |req: Request, next: Next| authenticate(state.clone(), req, next)
            }));

        // Protected resource: permission gate first, then the
        // tier-scaled limit keyed by the resolved identity.
        let todo_routes = Router::new()
            .route("/todos", get(list_todos))
            .layer(from_fn({
                let state = state.clone();
                move |req: Request, next: Next| limit_tiered(state.clone(), req, next)
            }))
            .layer(from_fn({
                let state = state.clone();
                move |req: Request, next: Next| {
                    authorize(
                        state.clone(),
                        Requirement::new("todo", permission::READ),
                        req,
                        next,
                    )
                }
            }));

        Router::new()
            .route("/health", get(health))
            .merge(login_routes)
            .merge(me_routes)
            .merge(todo_routes)
            // Outermost: the global per-IP limit over everything.
            .layer(from_fn({
                let state = state.clone();
                move |req: Request, next: Next| limit_by_ip(state.clone(), Category::Global, req, next)
            }))
            .with_state(app)
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server shuts down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server for request gate");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            GatekeeperError::Io(e)
        })
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(rename = "subjectId")]
    subject_id: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    code: u16,
    #[serde(rename = "resultMessage")]
    result_message: &'static str,
}

/// Demo login: resolves the subject and issues a session cookie.
/// Credential verification proper (passwords) is the upstream
/// identity provider's concern, not the gate's.
async fn login(State(app): State<AppState>, Json(body): Json<LoginRequest>) -> Response {
    let identity = match app.state.directory.find_subject(&body.subject_id).await {
        Ok(Some(identity)) if identity.active => identity,
        Ok(Some(_)) => return responder::auth_denied(DenyReason::SubjectInactive),
        _ => return responder::auth_denied(DenyReason::SubjectNotFound),
    };

    let token = match app.state.gate.verifier().issue(
        &identity.id,
        &identity.role_id,
        app.token_ttl_secs,
    ) {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "Failed to issue session token");
            return responder::auth_denied(DenyReason::MissingSigningKey);
        }
    };

    let cookie = format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}",
        app.state.cookie_name, token, app.token_ttl_secs
    );

    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            code: 200,
            result_message: "login successful",
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct PrincipalResponse {
    #[serde(rename = "subjectId")]
    subject_id: String,
    #[serde(rename = "roleId")]
    role_id: String,
}

async fn me(Extension(principal): Extension<RequestPrincipal>) -> Json<PrincipalResponse> {
    Json(PrincipalResponse {
        subject_id: principal.subject_id,
        role_id: principal.role_id,
    })
}

/// Stand-in downstream handler; the real CRUD API sits behind the gate.
async fn list_todos(Extension(principal): Extension<RequestPrincipal>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "subjectId": principal.subject_id,
        "todos": [],
    }))
}
