//! Parsed inbound request handed to handlers.
//!
//! Query parameters and url-encoded form fields are decoded up front. The
//! body arrives already bounded by the resource's upload limit, so the form
//! is decoded from those bytes with no further size cap;
//! [`Request::data`] looks a key up in the form first and the query second.
//! Multipart bodies are not decoded; handlers read [`Request::body`].
use crate::tree::ResourceIdentifier;
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use warden_authz::Verb;

#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    verb: Option<Verb>,
    uri: Uri,
    headers: HeaderMap,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
    body: Bytes,
    resource: ResourceIdentifier,
}

impl Request {
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        resource: ResourceIdentifier,
    ) -> Self {
        let verb = Verb::classify(method.as_str());
        let query = Query::<HashMap<String, String>>::try_from_uri(&uri)
            .map(|Query(query)| query)
            .unwrap_or_default();
        let form = decode_form(&headers, &body);
        Self {
            method,
            verb,
            uri,
            headers,
            query,
            form,
            body,
            resource,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Operation kind, `None` for methods outside the verb set.
    pub fn verb(&self) -> Option<Verb> {
        self.verb
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Resource instance the request addresses.
    pub fn resource(&self) -> &ResourceIdentifier {
        &self.resource
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn form(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(String::as_str)
    }

    /// Form field, falling back to the query parameter of the same name.
    pub fn data(&self, key: &str) -> Option<&str> {
        self.form(key).or_else(|| self.query(key))
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

fn decode_form(headers: &HeaderMap, body: &Bytes) -> HashMap<String, String> {
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));
    if !is_form || body.is_empty() {
        return HashMap::new();
    }
    match serde_urlencoded::from_bytes::<HashMap<String, String>>(body) {
        Ok(form) => form,
        Err(err) => {
            tracing::debug!(error = %err, "ignoring malformed form body");
            HashMap::new()
        }
    }
}
