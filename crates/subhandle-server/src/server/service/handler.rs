//! HTTP surface of the handle service.
//!
//! This module defines [`HandleService`], the shared state behind every route,
//! and [`router`], which wires the routes together.
//!
//! ## Routes
//!
//! - `GET /.well-known/atproto-did`: plain-text DID for the subdomain in the
//!   `Host` header, or an empty 404. This is what the identity provider
//!   fetches when verifying a handle without DNS.
//! - `POST /api/handles/current`: resolve the user's current handle.
//! - `POST /api/handles/availability`: check a vanity name.
//! - `POST /api/handles/claim`: bind a vanity name to an identity.
//! - `GET /healthz`: datastore liveness.

use crate::server::{
    config::ServerConfig,
    service::error::{ApiError, JsonBody},
    telemetry::{
        increment_availability_checks, increment_claims, increment_lookups,
        increment_request_errors, increment_resolver_failures, record_request_duration,
    },
};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use subhandle::{BindAction, Error, HandleRegistry};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct HandleService {
    config: Arc<ServerConfig>,
    registry: HandleRegistry,
}

impl HandleService {
    pub fn new(config: ServerConfig, registry: HandleRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Closes the connection pool once in-flight requests have drained.
    pub async fn shutdown(&self) {
        self.registry.store().close().await;
    }
}

#[derive(Debug, Deserialize)]
pub struct CurrentHandleRequest {
    pub handle: String,
}

#[derive(Debug, Serialize)]
pub struct CurrentHandleResponse {
    pub did: String,
    pub handle: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub handle: String,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub handle: String,
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub did: String,
    pub handle: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub did: String,
    pub handle: String,
    pub qualified: String,
}

pub fn router(service: HandleService) -> Router {
    Router::new()
        .route("/.well-known/atproto-did", get(atproto_did))
        .route("/api/handles/current", post(current_handle))
        .route("/api/handles/availability", post(check_availability))
        .route("/api/handles/claim", post(claim_handle))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(service)
}

/// Host header first, then the request target's authority (HTTP/2 sends
/// `:authority` instead of `Host`).
fn request_host<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> Option<&'a str> {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.host())
}

#[tracing::instrument(skip_all, fields(host))]
async fn atproto_did(
    State(service): State<HandleService>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let start = Instant::now();
    let host = request_host(&headers, &uri);
    tracing::Span::current().record("host", host.unwrap_or_default());

    let response = match service.registry.resolve_host(host).await {
        Ok(did) => {
            increment_lookups("found");
            did.into_inner().into_response()
        }
        Err(Error::NotFound) => {
            increment_lookups("not_found");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            increment_request_errors("atproto_did");
            ApiError(e).into_response()
        }
    };
    record_request_duration("atproto_did", start.elapsed().as_secs_f64() * 1000.0);
    response
}

#[tracing::instrument(skip_all, fields(handle = %req.handle))]
async fn current_handle(
    State(service): State<HandleService>,
    JsonBody(req): JsonBody<CurrentHandleRequest>,
) -> Result<Json<CurrentHandleResponse>, ApiError> {
    let start = Instant::now();
    let checked = service.registry.current_identity(&req.handle).await;
    record_request_duration("current", start.elapsed().as_secs_f64() * 1000.0);
    if checked.resolver_failed {
        increment_resolver_failures("current");
    }

    let did = checked
        .into_inner()
        .inspect_err(|_| increment_request_errors("current"))?;
    Ok(Json(CurrentHandleResponse {
        did: did.into_inner(),
        handle: req.handle.trim().to_string(),
    }))
}

#[tracing::instrument(skip_all, fields(handle = %req.handle))]
async fn check_availability(
    State(service): State<HandleService>,
    JsonBody(req): JsonBody<AvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let start = Instant::now();
    let checked = service.registry.check_availability(&req.handle).await;
    record_request_duration("availability", start.elapsed().as_secs_f64() * 1000.0);
    if checked.resolver_failed {
        increment_resolver_failures("availability");
    }

    match checked.into_inner() {
        Ok(handle) => {
            increment_availability_checks("available");
            Ok(Json(AvailabilityResponse {
                handle,
                available: true,
            }))
        }
        Err(e) => {
            increment_availability_checks(match &e {
                Error::Taken { .. } => "taken",
                Error::Denied { .. } => "denied",
                _ => "error",
            });
            Err(e.into())
        }
    }
}

#[tracing::instrument(skip_all, fields(did = %req.did, handle = %req.handle))]
async fn claim_handle(
    State(service): State<HandleService>,
    JsonBody(req): JsonBody<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let start = Instant::now();
    let result = service.registry.claim(&req.did, &req.handle).await;
    record_request_duration("claim", start.elapsed().as_secs_f64() * 1000.0);

    let (binding, action) = result.inspect_err(|_| increment_request_errors("claim"))?;
    increment_claims(match action {
        BindAction::Inserted => "inserted",
        BindAction::Updated => "updated",
    });

    let qualified = format!("{}.{}", binding.handle, service.config.vanity_domain);
    Ok(Json(ClaimResponse {
        did: binding.did.into_inner(),
        handle: binding.handle,
        qualified,
    }))
}

async fn health(State(service): State<HandleService>) -> impl IntoResponse {
    match service.registry.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use httpmock::prelude::*;
    use serde_json::{Value, json};
    use std::time::Duration;
    use subhandle::{Denylist, HandleResolver, HandleStore};
    use tower::ServiceExt;

    const DOMAIN: &str = "warga.cloud";
    const RESOLVE_PATH: &str = "/xrpc/com.atproto.identity.resolveHandle";

    async fn service(resolver_url: &str, ban_list: &str) -> HandleService {
        let config = ServerConfig {
            server_addr: "127.0.0.1:0".to_string(),
            uds: false,
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            vanity_domain: DOMAIN.to_string(),
            resolver_url: resolver_url.parse().unwrap(),
            resolver_timeout: Duration::from_secs(5),
            denylist: Denylist::parse(ban_list),
        };
        let store = HandleStore::in_memory().await.unwrap();
        let resolver = HandleResolver::new(resolver_url, config.resolver_timeout).unwrap();
        let registry = HandleRegistry::new(store, resolver, config.denylist.clone(), DOMAIN);
        HandleService::new(config, registry)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn well_known(host: &str) -> Request<Body> {
        Request::builder()
            .uri("/.well-known/atproto-did")
            .header(header::HOST, host)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn full_wizard_flow_ends_in_a_verifiable_handle() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(RESOLVE_PATH)
                    .query_param("handle", "sriwedari.bsky.social");
                then.status(200).json_body(json!({ "did": "did:plc:sri" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(RESOLVE_PATH)
                    .query_param("handle", "sri.warga.cloud");
                then.status(400);
            })
            .await;
        let app = router(service(&server.base_url(), "").await);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/handles/current",
                json!({ "handle": "sriwedari.bsky.social" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["did"], "did:plc:sri");

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/handles/availability",
                json!({ "handle": "sri" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "handle": "sri.warga.cloud", "available": true })
        );

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/handles/claim",
                json!({ "did": "did:plc:sri", "handle": "s.r.i" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "did": "did:plc:sri", "handle": "sri", "qualified": "sri.warga.cloud" })
        );

        let response = app.oneshot(well_known("sri.warga.cloud")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_bytes(response).await, b"did:plc:sri");
    }

    #[tokio::test]
    async fn well_known_is_an_empty_404_for_unbound_or_missing_hosts() {
        let server = MockServer::start_async().await;
        let app = router(service(&server.base_url(), "").await);

        let response = app.clone().oneshot(well_known("nobody.warga.cloud")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_bytes(response).await.is_empty());

        let request = Request::builder()
            .uri("/.well-known/atproto-did")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reclaiming_moves_the_identity_to_the_new_name() {
        let server = MockServer::start_async().await;
        let app = router(service(&server.base_url(), "").await);

        for name in ["first", "second"] {
            let response = app
                .clone()
                .oneshot(post_json(
                    "/api/handles/claim",
                    json!({ "did": "did:plc:alice", "handle": name }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(well_known("first.warga.cloud")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app.oneshot(well_known("second.warga.cloud:443")).await.unwrap();
        assert_eq!(body_bytes(response).await, b"did:plc:alice");
    }

    #[tokio::test]
    async fn taken_and_denied_names_are_reported_with_distinct_statuses() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(RESOLVE_PATH)
                    .query_param("handle", "taken.warga.cloud");
                then.status(200).json_body(json!({ "did": "did:plc:owner" }));
            })
            .await;
        let app = router(service(&server.base_url(), "admin").await);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/handles/availability",
                json!({ "handle": "taken" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"], "taken");

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/handles/availability",
                json!({ "handle": "admin" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(post_json(
                "/api/handles/claim",
                json!({ "did": "did:plc:alice", "handle": "admin" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], "denied");
    }

    #[tokio::test]
    async fn invalid_input_is_a_bad_request() {
        let server = MockServer::start_async().await;
        let app = router(service(&server.base_url(), "").await);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/handles/claim",
                json!({ "did": "did:plc:alice", "handle": "!!!" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_request");

        let response = app
            .oneshot(post_json(
                "/api/handles/current",
                json!({ "handle": "" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests_with_an_error_body() {
        let server = MockServer::start_async().await;
        let app = router(service(&server.base_url(), "").await);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/handles/claim",
                json!({ "handle": "alice" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_request");
        assert!(body["message"].as_str().unwrap().contains("did"));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/handles/availability")
            .body(Body::from(json!({ "handle": "alice" }).to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_request");

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/handles/current")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_request");
    }

    #[tokio::test]
    async fn unreachable_resolver_falls_back_per_step() {
        let app = router(service("http://127.0.0.1:9", "").await);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/handles/availability",
                json!({ "handle": "alice" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "handle": "alice.warga.cloud", "available": true })
        );

        let response = app
            .oneshot(post_json(
                "/api/handles/current",
                json!({ "handle": "alice.bsky.social" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn health_reflects_the_store() {
        let server = MockServer::start_async().await;
        let service = service(&server.base_url(), "").await;
        let app = router(service.clone());

        let request = || Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        service.shutdown().await;
        let response = app.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
