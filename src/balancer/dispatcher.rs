//! Request dispatching
//!
//! Entered once per inbound request: pick the least-connected healthy
//! backend, account for the request with the in-flight guard, and proxy the
//! full exchange (method, path, query, headers and body) in both directions.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{HeaderName, HeaderValue, HOST};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::StreamExt;
use reqwest::Client;

use crate::config::BalancerConfig;
use crate::error::{RelayError, Result};

use super::pool::BackendPool;

/// Response header naming the backend that served the request
pub const LB_FROM: HeaderName = HeaderName::from_static("lb-from");

/// Body returned when every backend is unhealthy
pub const NO_BACKEND_BODY: &str = "No available backend server";

/// Per-request proxy over the backend pool
pub struct Dispatcher {
    pool: Arc<BackendPool>,
    client: Client,
    scheme: &'static str,
    timeout: Duration,
    trace: bool,
}

impl Dispatcher {
    /// Create a dispatcher over `pool`
    pub fn new(pool: Arc<BackendPool>, config: &BalancerConfig) -> Self {
        Self {
            pool,
            client: Client::new(),
            scheme: config.scheme(),
            timeout: config.timeout,
            trace: config.trace,
        }
    }

    /// Build the balancer's frontend router
    ///
    /// Every path and method is accepted and forwarded.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new().fallback(dispatch).with_state(self)
    }

    /// Select a backend and proxy one request through it
    ///
    /// The in-flight slot is held until the proxied body has finished
    /// streaming to the client (or the exchange fails), not just until the
    /// upstream headers arrive.
    pub async fn dispatch(&self, req: Request) -> Result<Response> {
        let backend = self
            .pool
            .select_least_connected()
            .ok_or(RelayError::NoHealthyBackend)?;

        let guard = backend.begin_request();
        let response = self.forward(backend.address(), req).await?;

        let (parts, body) = response.into_parts();
        let body = Body::from_stream(body.into_data_stream().map(move |chunk| {
            let _ = &guard;
            chunk
        }));

        Ok(Response::from_parts(parts, body))
    }

    /// Proxy `req` to the backend at `address`
    ///
    /// The upstream call carries the configured timeout and is dropped if
    /// the inbound connection goes away, so client disconnects propagate as
    /// cancellation. On success every upstream header is copied (multi-valued
    /// headers preserved) and the body is streamed back; the `lb-from` tag is
    /// set before the status goes out when tracing is enabled.
    pub async fn forward(&self, address: &str, req: Request) -> Result<Response> {
        let (parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}://{}{}", self.scheme, address, path_and_query);

        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| RelayError::Upstream(format!("failed to read request body: {}", e)))?;

        // The upstream host is derived from the target URL; forwarding the
        // inbound Host header would override it.
        let mut headers = parts.headers;
        headers.remove(HOST);

        let upstream = self
            .client
            .request(parts.method, url.as_str())
            .headers(headers)
            .body(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RelayError::Upstream(format!("{}: {}", address, e)))?;

        tracing::info!(status = %upstream.status(), %url, "forwarded");

        let mut builder = Response::builder().status(upstream.status());
        if let Some(response_headers) = builder.headers_mut() {
            for (name, value) in upstream.headers() {
                response_headers.append(name.clone(), value.clone());
            }
            if self.trace {
                if let Ok(value) = HeaderValue::from_str(address) {
                    response_headers.insert(LB_FROM, value);
                }
            }
        }

        builder
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| RelayError::Upstream(e.to_string()))
    }
}

/// axum handler wrapping [`Dispatcher::dispatch`]
///
/// Both failure modes translate to 503: a pool with no healthy entry gets
/// the explicit body, an upstream transport error an empty one.
async fn dispatch(State(dispatcher): State<Arc<Dispatcher>>, req: Request) -> Response {
    match dispatcher.dispatch(req).await {
        Ok(response) => response,
        Err(RelayError::NoHealthyBackend) => {
            tracing::warn!("no healthy backend available");
            (StatusCode::SERVICE_UNAVAILABLE, NO_BACKEND_BODY).into_response()
        }
        Err(e) => {
            tracing::warn!("forwarding failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
