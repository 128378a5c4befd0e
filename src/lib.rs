//! Switchyard - a content-aware reverse proxy.
//!
//! Inbound requests must carry a JSON payload; the top-level `model` field
//! selects which configured backend handles the request. The chosen backend
//! receives the request with its path and body intact, and its response is
//! relayed back with streaming transport preserved.

use axum::Router;
use axum::routing::any;
use axum_prometheus::{
    GenericMetricLayer, Handle, PrometheusMetricLayerBuilder,
    metrics_exporter_prometheus::PrometheusHandle,
};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{info, instrument};

pub mod classify;
pub mod client;
pub mod error;
pub mod handlers;
pub mod routing;

use client::{HttpClient, HyperClient};
use handlers::proxy_handler;
use routing::RoutingTable;

/// The application state: the outbound HTTP client and the routing table,
/// shared read-only across all in-flight requests.
#[derive(Clone, Debug)]
pub struct AppState<T: HttpClient> {
    pub http_client: T,
    pub table: Arc<RoutingTable>,
}

impl AppState<HyperClient> {
    /// Create an AppState with the default pooled hyper client.
    pub fn new(table: RoutingTable) -> Self {
        let http_client = client::create_hyper_client(
            client::DEFAULT_POOL_IDLE_TIMEOUT_SECS,
            client::DEFAULT_POOL_MAX_IDLE_PER_HOST,
        );
        Self {
            http_client,
            table: Arc::new(table),
        }
    }
}

impl<T: HttpClient> AppState<T> {
    /// Create an AppState with a custom HTTP client (useful for testing).
    pub fn with_client(table: RoutingTable, http_client: T) -> Self {
        Self {
            http_client,
            table: Arc::new(table),
        }
    }
}

/// Build the proxy router. Every method and path lands on the front door;
/// the path is forwarded unchanged to the resolved backend.
#[instrument(skip(state))]
pub fn build_router<T: HttpClient + Clone + Send + Sync + 'static>(state: AppState<T>) -> Router {
    info!("Building router");
    Router::new()
        .route("/", any(proxy_handler))
        .route("/{*path}", any(proxy_handler))
        .with_state(state)
}

/// Builds a router for the metrics endpoint.
#[instrument(skip(handle))]
pub fn build_metrics_router(handle: PrometheusHandle) -> Router {
    info!("Building metrics router");
    Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    )
}

type MetricsLayerAndHandle = (
    GenericMetricLayer<'static, PrometheusHandle, Handle>,
    PrometheusHandle,
);

/// Builds a layer and handle for prometheus metrics collection. The prefix
/// must live for the whole process, as the metrics layer requires.
pub fn build_metrics_layer_and_handle(
    prefix: impl Into<Cow<'static, str>>,
) -> MetricsLayerAndHandle {
    info!("Building metrics layer");
    PrometheusMetricLayerBuilder::new()
        .with_prefix(prefix)
        .enable_response_body_size(true)
        .with_endpoint_label_type(axum_prometheus::EndpointLabel::Exact)
        .with_default_metrics()
        .build_pair()
}

pub mod test_utils {
    //! A recording HTTP client for tests: stores every forwarded request
    //! and replays a canned response (or failure).
    use super::*;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::{Arc, Mutex};

    type ResponseBuilder = Arc<
        dyn Fn() -> Result<axum::response::Response, Box<dyn std::error::Error + Send + Sync>>
            + Send
            + Sync,
    >;

    pub struct MockHttpClient {
        pub requests: Arc<Mutex<Vec<MockRequest>>>,
        response_builder: ResponseBuilder,
    }

    /// A forwarded request as the backend would have seen it.
    #[derive(Debug, Clone)]
    pub struct MockRequest {
        pub method: String,
        pub uri: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl MockHttpClient {
        pub fn new(status: StatusCode, body: &str) -> Self {
            let body = body.to_string();
            Self::from_builder(Arc::new(move || {
                Ok(axum::response::Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body.clone()))
                    .unwrap())
            }))
        }

        /// A backend that answers with an SSE stream of the given chunks.
        pub fn new_streaming(status: StatusCode, chunks: Vec<String>) -> Self {
            Self::from_builder(Arc::new(move || {
                use axum::body::Body;
                use futures_util::stream;

                let stream = stream::iter(
                    chunks
                        .clone()
                        .into_iter()
                        .map(|chunk| Ok::<_, std::io::Error>(chunk.into_bytes())),
                );

                Ok(axum::response::Response::builder()
                    .status(status)
                    .header("content-type", "text/event-stream")
                    .header("cache-control", "no-cache")
                    .body(Body::from_stream(stream))
                    .unwrap())
            }))
        }

        /// A backend that cannot be reached: every request errors.
        pub fn new_failing(message: &str) -> Self {
            let message = message.to_string();
            Self::from_builder(Arc::new(move || Err(message.clone().into())))
        }

        /// A backend that answers with whatever the closure builds.
        pub fn with_response<F>(builder: F) -> Self
        where
            F: Fn() -> axum::response::Response + Send + Sync + 'static,
        {
            Self::from_builder(Arc::new(move || Ok(builder())))
        }

        fn from_builder(response_builder: ResponseBuilder) -> Self {
            Self {
                requests: Arc::new(Mutex::new(Vec::new())),
                response_builder,
            }
        }

        pub fn get_requests(&self) -> Vec<MockRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl std::fmt::Debug for MockHttpClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockHttpClient")
                .field("requests", &self.requests)
                .field("response_builder", &"<closure>")
                .finish()
        }
    }

    impl Clone for MockHttpClient {
        fn clone(&self) -> Self {
            Self {
                requests: Arc::clone(&self.requests),
                response_builder: Arc::clone(&self.response_builder),
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn request(
            &self,
            req: axum::extract::Request,
        ) -> Result<axum::response::Response, Box<dyn std::error::Error + Send + Sync>> {
            let method = req.method().to_string();
            let uri = req.uri().to_string();
            let headers = req
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();

            let body = axum::body::to_bytes(req.into_body(), usize::MAX)
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?
                .to_vec();

            self.requests.lock().unwrap().push(MockRequest {
                method,
                uri,
                headers,
                body,
            });

            (self.response_builder)()
        }
    }
}
