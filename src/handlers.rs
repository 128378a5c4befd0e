//! The proxy front door: one handler that takes every inbound request
//! through content-type validation, body snapshotting, classification,
//! target resolution, and forwarding.
//!
//! The body is buffered exactly once so the classifier and the forwarder
//! read the same bytes, then the upstream response is re-framed for the
//! caller: streaming responses pass through chunk by chunk, everything else
//! relays as-is.

use crate::classify::extract_routing_key;
use crate::client::HttpClient;
use crate::error::ProxyError;
use crate::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderValue, Uri};
use axum::response::Response;
use tracing::{error, info, instrument, warn};

#[instrument(skip_all, fields(method = %req.method(), path = %req.uri().path()))]
pub async fn proxy_handler<T: HttpClient>(
    State(state): State<AppState<T>>,
    mut req: axum::extract::Request,
) -> Result<Response, ProxyError> {
    info!("Received request");

    // JSON payloads only; anything else is rejected before buffering.
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    if content_type != Some("application/json") {
        warn!(content_type, "Invalid Content-Type");
        return Err(ProxyError::InvalidContentType);
    }

    // Snapshot the body: the classifier reads it here and the forwarder
    // reads the identical bytes again below.
    let body_bytes = axum::body::to_bytes(std::mem::take(req.body_mut()), usize::MAX)
        .await
        .map_err(|e| {
            error!("Error reading request body: {}", e);
            ProxyError::BodyRead(e)
        })?;

    let routing_key = extract_routing_key(&body_bytes).map_err(|e| {
        warn!("Error parsing request body: {}", e);
        ProxyError::MalformedBody(e)
    })?;
    match routing_key.as_deref() {
        Some(model) => info!(model, "Extracted model property"),
        None => info!("No 'model' property found in the request body"),
    }

    let base_url = state.table.resolve(routing_key.as_deref().unwrap_or(""));

    // Graft the inbound path and query onto the backend base URL.
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|v| v.as_str())
        .unwrap_or(req.uri().path());
    let upstream_url = base_url
        .join(path_and_query.strip_prefix('/').unwrap_or(path_and_query))
        .map_err(|e| {
            error!("Error building target URL: {}", e);
            ProxyError::TargetUrl
        })?;
    let upstream_uri = Uri::try_from(upstream_url.as_str()).map_err(|e| {
        error!("Error parsing target URL {}: {}", upstream_url, e);
        ProxyError::TargetUrl
    })?;

    info!(target = %base_url, path = %upstream_uri.path(), "Proxying request");

    // Rewrite the authority so virtual-hosted backends accept the request.
    if let Some(host) = upstream_uri.host() {
        let host_value = match upstream_uri.port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&host_value) {
            req.headers_mut().insert(HOST, value);
        }
    }

    *req.uri_mut() = upstream_uri;
    *req.body_mut() = Body::from(body_bytes);

    match state.http_client.request(req).await {
        Ok(response) => Ok(relay_response(response)),
        Err(e) => {
            error!("Proxy error forwarding to {}: {}", upstream_url, e);
            Err(ProxyError::Upstream(e))
        }
    }
}

/// Re-frame the upstream response for the caller.
///
/// Streaming responses are forwarded with chunked framing so bytes reach the
/// caller as the upstream produces them; the content type passes through
/// unmodified. Everything else relays untouched.
fn relay_response(response: Response) -> Response {
    if !is_streaming_response(response.headers()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    parts.headers.remove(CONTENT_LENGTH);
    parts
        .headers
        .insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    Response::from_parts(parts, body)
}

/// A response is streamed when the upstream says so outright, or when it
/// carries a content type that is produced incrementally.
fn is_streaming_response(headers: &HeaderMap) -> bool {
    let header_equals = |name, expected: &str| {
        headers
            .get(name)
            .is_some_and(|value| value.as_bytes() == expected.as_bytes())
    };

    header_equals(TRANSFER_ENCODING, "chunked")
        || header_equals(CONTENT_TYPE, "text/event-stream")
        || header_equals(CONTENT_TYPE, "application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::StatusCode;
    use futures_util::StreamExt;
    use tokio_stream::wrappers::ReceiverStream;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        pairs
            .iter()
            .map(|(name, value)| (name.parse().unwrap(), value.parse().unwrap()))
            .collect()
    }

    #[test]
    fn chunked_transfer_encoding_is_streaming() {
        assert!(is_streaming_response(&headers(&[(
            "transfer-encoding",
            "chunked"
        )])));
    }

    #[test]
    fn streaming_content_types_are_streaming() {
        assert!(is_streaming_response(&headers(&[(
            "content-type",
            "text/event-stream"
        )])));
        assert!(is_streaming_response(&headers(&[(
            "content-type",
            "application/octet-stream"
        )])));
    }

    #[test]
    fn plain_responses_are_not_streaming() {
        assert!(!is_streaming_response(&headers(&[])));
        assert!(!is_streaming_response(&headers(&[(
            "content-type",
            "application/json"
        )])));
        // Matching is exact: parameters disqualify the content type.
        assert!(!is_streaming_response(&headers(&[(
            "content-type",
            "text/event-stream; charset=utf-8"
        )])));
    }

    #[test]
    fn streaming_relay_sets_chunked_and_drops_content_length() {
        let upstream = Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/event-stream")
            .header("content-length", "11")
            .body(Body::from("data: hi\n\n"))
            .unwrap();

        let relayed = relay_response(upstream);

        assert_eq!(
            relayed.headers().get("transfer-encoding").unwrap(),
            "chunked"
        );
        assert_eq!(
            relayed.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        assert!(relayed.headers().get("content-length").is_none());
    }

    #[test]
    fn buffered_relay_passes_response_through_untouched() {
        let upstream = Response::builder()
            .status(StatusCode::CREATED)
            .header("content-type", "application/json")
            .header("content-length", "2")
            .body(Body::from("{}"))
            .unwrap();

        let relayed = relay_response(upstream);

        assert_eq!(relayed.status(), StatusCode::CREATED);
        assert_eq!(relayed.headers().get("content-length").unwrap(), "2");
        assert!(relayed.headers().get("transfer-encoding").is_none());
    }

    #[tokio::test]
    async fn streamed_bytes_arrive_before_the_upstream_finishes() {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(4);
        let upstream = Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/event-stream")
            .body(Body::from_stream(ReceiverStream::new(rx)))
            .unwrap();

        let relayed = relay_response(upstream);
        let mut data = relayed.into_body().into_data_stream();

        tx.send(Ok(Bytes::from_static(b"data: one\n\n")))
            .await
            .unwrap();
        // The sender is still open, so this chunk was relayed without
        // waiting for the end of the upstream response.
        let first = data.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"data: one\n\n"));

        tx.send(Ok(Bytes::from_static(b"data: two\n\n")))
            .await
            .unwrap();
        drop(tx);
        let second = data.next().await.unwrap().unwrap();
        assert_eq!(second, Bytes::from_static(b"data: two\n\n"));
        assert!(data.next().await.is_none());
    }
}
