//! HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router around the dispatch pipeline. Every path goes to
//! the pipeline fallback; the resource tree does the routing.
//!
//! # Layers, outermost first
//! - panic boundary: a panic anywhere below becomes a logged `INTERNAL_ERROR`
//! - `http.request` trace span
//! - in-flight accounting for graceful shutdown
use crate::api::error::{ErrorEnvelope, api_internal_message};
use crate::pipeline;
use crate::service::Service;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::{self, Next};
use axum::response::Response;
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(service: Service) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            )
        });

    Router::new()
        .fallback(pipeline::dispatch)
        .layer(middleware::from_fn_with_state(service.clone(), track_in_flight))
        .layer(trace_layer)
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(service)
}

async fn track_in_flight(State(service): State<Service>, request: Request, next: Next) -> Response {
    let _guard = service.lifecycle().enter();
    next.run(request).await
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> axum::http::Response<String> {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else {
        "unknown panic payload"
    };
    tracing::error!(panic = detail, "request processing panicked");
    metrics::counter!("dispatch_requests_total", "outcome" => "panic").increment(1);

    let envelope = ErrorEnvelope {
        error: api_internal_message().body,
    };
    let body = serde_json::to_string(&envelope).unwrap_or_else(|_| {
        r#"{"error":{"code":"INTERNAL_ERROR","message":"internal error"}}"#.to_string()
    });
    let mut response = axum::http::Response::new(body);
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        CONTENT_TYPE,
        axum::http::HeaderValue::from_static("application/json"),
    );
    response
}
