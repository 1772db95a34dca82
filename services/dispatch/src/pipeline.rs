//! Per-request dispatch: authenticate, route, authorize, invoke.
//!
//! # Stages
//! Each stage either hands its output to the next or ends the request with
//! an [`ApiError`]:
//! 1. classify the method into a [`Verb`]; unknown methods continue with no
//!    verb, which no permission set allows
//! 2. authenticate the `Authorization` header (empty means guest)
//! 3. route the path through the resource tree
//! 4. build the resource identifier from the route match
//! 5. resolve effective permissions; a fault here is `INTERNAL_ERROR`
//! 6. check the verb against the permissions
//! 7. look up the handler for the verb
//! 8. enforce the body size limit, then invoke the handler
//!
//! Panics are not handled here; the router's outermost layer turns them
//! into `INTERNAL_ERROR` responses.
use crate::api::error::{
    api_forbidden, api_internal, api_internal_message, api_invalid_token,
    api_method_not_supported, api_payload_too_large,
};
use crate::api::{ApiError, Reply, Request};
use crate::service::Service;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use warden_authz::Verb;

/// Router fallback that runs every request through the pipeline.
pub async fn dispatch(State(service): State<Service>, request: axum::extract::Request) -> Response {
    let (parts, body) = request.into_parts();
    match run(&service, parts, body).await {
        Ok(reply) => {
            metrics::counter!("dispatch_requests_total", "outcome" => "handled").increment(1);
            reply.into_response()
        }
        Err(err) => {
            metrics::counter!("dispatch_requests_total", "outcome" => err.code().to_string())
                .increment(1);
            err.into_response()
        }
    }
}

async fn run(service: &Service, parts: Parts, body: Body) -> Result<Reply, ApiError> {
    let verb = Verb::classify(parts.method.as_str());

    let header = match parts.headers.get(AUTHORIZATION) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| api_invalid_token("invalid access token"))?,
        ),
        None => None,
    };
    let principal = service.authenticate(header)?;

    let tree = service.tree();
    let matched = tree.route(parts.uri.path())?;
    let node = matched.node;
    tracing::debug!(
        resource = node.id(),
        method = %parts.method,
        principal = %principal,
        "route matched"
    );

    let resource = tree
        .identifier(node.id(), &matched.variables)
        .map_err(|err| api_internal("build resource identifier", &err))?;

    let resolution = service
        .resolve_permissions_for(&resource, &principal)
        .await
        .map_err(|err| api_internal("resolve permissions", &err))?;
    if !resolution.permissions.allows_kind(verb) {
        tracing::debug!(
            resource = %resource,
            method = %parts.method,
            principal = %principal,
            "access denied"
        );
        return Err(api_forbidden());
    }

    let Some(handler) = verb.and_then(|verb| node.handler(verb)) else {
        return Err(api_method_not_supported(parts.method.as_str(), node.id()));
    };

    let limit = service.max_upload_size_for(node);
    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    if declared.is_some_and(|length| length > limit as u64) {
        return Err(api_payload_too_large(limit));
    }
    let body = axum::body::to_bytes(body, limit).await.map_err(|err| {
        tracing::debug!(error = %err, resource = %resource, "request body rejected");
        api_payload_too_large(limit)
    })?;

    let request = Request::new(parts.method, parts.uri, parts.headers, body, resource);
    let resource_id = node.id().to_string();
    let method = request.method().clone();
    match handler(principal, request, service.clone()).await {
        Ok(reply) => Ok(reply),
        Err(err) => {
            tracing::error!(
                resource = %resource_id,
                method = %method,
                error = ?err,
                "handler failed"
            );
            Err(api_internal_message())
        }
    }
}
