use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Header name for correlation ID
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Attaches (or propagates) a correlation id to every request and emits one
/// structured span covering the whole handler invocation.
pub async fn tracing_middleware(mut request: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let correlation_id = extract_or_generate_correlation_id(request.headers());

    request.extensions_mut().insert(correlation_id.clone());

    let method = request.method().clone();
    let uri = request.uri().clone();

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id,
        method = %method,
        uri = %uri,
    );
    let _enter = span.enter();

    let response = next.run(request).await;
    let duration = start_time.elapsed();
    let status = response.status().as_u16();

    if status >= 500 {
        tracing::error!(correlation_id = %correlation_id, %method, %uri, status, duration_ms = duration.as_millis() as u64, "request failed");
    } else if status >= 400 {
        tracing::warn!(correlation_id = %correlation_id, %method, %uri, status, duration_ms = duration.as_millis() as u64, "request rejected");
    } else {
        tracing::info!(correlation_id = %correlation_id, %method, %uri, status, duration_ms = duration.as_millis() as u64, "request completed");
    }

    let mut response = response;
    if let Ok(header_value) = HeaderValue::from_str(&correlation_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_ID_HEADER), header_value);
    }
    response
}

fn extract_or_generate_correlation_id(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
