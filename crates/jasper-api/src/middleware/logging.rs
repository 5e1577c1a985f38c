//! Request logging middleware

use std::time::{Duration, Instant};

use axum::{extract::Request, middleware::Next, response::Response};

/// Requests slower than this are logged at warn. Waits are exempt since
/// they last as long as the process does.
const SLOW_REQUEST: Duration = Duration::from_millis(500);

/// Request logging middleware
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed();

    let status = response.status().as_u16();
    if elapsed > SLOW_REQUEST && !path.ends_with("/wait") {
        tracing::warn!(%method, %path, status, elapsed_ms = elapsed.as_millis() as u64, "Slow request");
    } else {
        tracing::debug!(%method, %path, status, elapsed_ms = elapsed.as_millis() as u64, "Request handled");
    }

    response
}
