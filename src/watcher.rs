//! Request watcher middleware
//!
//! Three hooks per request, in the order the host runs them:
//!
//! 1. **before**: start a monotonic timer and stamp the request date
//! 2. **after**: on normal completion, build the full event and log it
//! 3. **teardown**: if the inner service panics, log a minimal event with the
//!    panic message, then resume the panic unchanged
//!
//! A request yields at most one event: the completed one or the failed one.

use crate::event::TrafficEvent;
use crate::traffic::{OnStoreError, Traffic};
use crate::user_agent;
use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Start of a request, stored in the request extensions by the before hook
#[derive(Debug, Clone, Copy)]
pub struct RequestTimer {
    pub started: Instant,
    pub date: DateTime<Utc>,
}

/// Attach to a response to record a handled error in `response_exception`
///
/// ```ignore
/// async fn handler() -> impl IntoResponse {
///     (
///         StatusCode::BAD_GATEWAY,
///         Extension(ResponseException("upstream timed out".into())),
///         "try again later",
///     )
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseException(pub String);

/// Request attributes captured before the request is handed to the inner service
#[derive(Debug, Clone, Default)]
struct RequestSnapshot {
    method: String,
    host_url: Option<String>,
    path: String,
    endpoint: Option<String>,
    remote_address: Option<String>,
    referrer: Option<String>,
    user_agent: Option<String>,
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn host_url(req: &Request) -> Option<String> {
    let headers = req.headers();
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().scheme_str())
        .unwrap_or("http");

    let host = header_str(headers, header::HOST)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))?;

    Some(format!("{}://{}/", scheme, host))
}

impl RequestSnapshot {
    fn capture(req: &Request) -> Self {
        Self {
            method: req.method().to_string(),
            host_url: host_url(req),
            path: req.uri().path().to_string(),
            endpoint: req
                .extensions()
                .get::<MatchedPath>()
                .map(|p| p.as_str().to_string()),
            remote_address: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string()),
            referrer: header_str(req.headers(), header::REFERER),
            user_agent: header_str(req.headers(), header::USER_AGENT),
        }
    }
}

/// Before hook
fn before_request(req: &mut Request) -> RequestTimer {
    let timer = RequestTimer {
        started: Instant::now(),
        date: Utc::now(),
    };
    req.extensions_mut().insert(timer);
    timer
}

fn response_size(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| http_body::Body::size_hint(response.body()).exact())
}

fn response_mimetype(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// After hook: the full event for a completed request
fn after_request(snapshot: RequestSnapshot, timer: RequestTimer, response: &Response) -> TrafficEvent {
    let elapsed = timer.started.elapsed();
    let parsed = snapshot.user_agent.as_deref().map(user_agent::parse);

    TrafficEvent {
        request_date: Some(timer.date),
        request_method: Some(snapshot.method),
        request_host_url: snapshot.host_url,
        request_path: Some(snapshot.path),
        request_endpoint: snapshot.endpoint,
        request_remote_address: snapshot.remote_address,
        request_referrer: snapshot.referrer,
        request_user_agent: snapshot.user_agent,
        request_browser: parsed.as_ref().and_then(|p| p.browser.clone()),
        request_platform: parsed.and_then(|p| p.platform),
        response_time: Some(elapsed.as_millis() as i64),
        response_size: response_size(response),
        response_status_code: Some(response.status().as_u16()),
        response_exception: response
            .extensions()
            .get::<ResponseException>()
            .map(|e| e.0.clone()),
        response_mimetype: response_mimetype(response),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Teardown hook: the minimal event for a request that failed
fn teardown_request(payload: &(dyn Any + Send)) -> TrafficEvent {
    TrafficEvent::failed(Utc::now(), panic_message(payload))
}

/// Axum middleware running the three hooks around the inner service
///
/// Registered through [`Traffic::layer`].
pub async fn watch_request(
    State(traffic): State<Arc<Traffic>>,
    mut req: Request,
    next: Next,
) -> Response {
    let timer = before_request(&mut req);
    let snapshot = RequestSnapshot::capture(&req);

    let response = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let event = teardown_request(payload.as_ref());
            tracing::warn!(
                path = %snapshot.path,
                exception = event.response_exception.as_deref().unwrap_or_default(),
                "Request failed with a panic"
            );
            // Error already reported by dispatch; the panic is what propagates
            let _ = traffic.dispatch(&event).await;
            std::panic::resume_unwind(payload);
        }
    };

    let event = after_request(snapshot, timer, &response);
    match traffic.dispatch(&event).await {
        Ok(()) => response,
        Err(e) => match traffic.on_store_error() {
            OnStoreError::Log => response,
            OnStoreError::Fail => e.into_response(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode};

    #[test]
    fn test_before_request_stores_timer() {
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let timer = before_request(&mut req);
        let stored = req.extensions().get::<RequestTimer>().unwrap();
        assert_eq!(stored.date, timer.date);
    }

    #[test]
    fn test_snapshot_captures_headers() {
        let req = Request::builder()
            .uri("/items?page=2")
            .header(header::HOST, "example.com")
            .header("x-forwarded-proto", "https")
            .header(header::REFERER, "https://example.com/")
            .header(header::USER_AGENT, "curl/8.4.0")
            .body(Body::empty())
            .unwrap();

        let snapshot = RequestSnapshot::capture(&req);
        assert_eq!(snapshot.method, "GET");
        assert_eq!(snapshot.path, "/items");
        assert_eq!(snapshot.host_url.as_deref(), Some("https://example.com/"));
        assert_eq!(snapshot.referrer.as_deref(), Some("https://example.com/"));
        assert_eq!(snapshot.user_agent.as_deref(), Some("curl/8.4.0"));
        assert!(snapshot.remote_address.is_none());
    }

    #[test]
    fn test_after_request_reads_response_metadata() {
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let timer = before_request(&mut req);
        let snapshot = RequestSnapshot::capture(&req);

        let response = (
            StatusCode::CREATED,
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            "{\"ok\":true}",
        )
            .into_response();

        let event = after_request(snapshot, timer, &response);
        assert_eq!(event.response_status_code, Some(201));
        assert_eq!(event.response_mimetype.as_deref(), Some("application/json"));
        assert_eq!(event.response_size, Some(11));
        assert!(event.response_time.unwrap() >= 0);
        assert!(event.response_exception.is_none());
    }

    #[test]
    fn test_after_request_picks_up_response_exception() {
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let timer = before_request(&mut req);
        let snapshot = RequestSnapshot::capture(&req);

        let mut response = StatusCode::BAD_GATEWAY.into_response();
        response
            .extensions_mut()
            .insert(ResponseException("upstream timed out".to_string()));

        let event = after_request(snapshot, timer, &response);
        assert_eq!(event.response_exception.as_deref(), Some("upstream timed out"));
    }

    #[test]
    fn test_teardown_event_is_minimal() {
        let payload: Box<dyn Any + Send> = Box::new("database exploded");
        let event = teardown_request(payload.as_ref());
        assert_eq!(event.response_exception.as_deref(), Some("database exploded"));
        assert!(event.request_date.is_some());
        assert!(event.request_method.is_none());
        assert!(event.response_status_code.is_none());
    }

    #[test]
    fn test_panic_message_formats() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");

        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
