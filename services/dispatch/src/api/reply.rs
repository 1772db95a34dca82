//! Handler responses.
//!
//! A [`Reply`] is what a handler hands back to the pipeline. JSON replies
//! render as `{"data": {...}}` (an empty object when nothing was added) or,
//! for errors, as the shared error envelope. Text replies are sent as-is.
use super::error::{ApiError, ErrorBody, ErrorEnvelope};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
enum Body {
    Data(Map<String, Value>),
    Error(ErrorBody),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    status: StatusCode,
    body: Body,
}

impl Reply {
    /// Empty `200 {"data":{}}`.
    pub fn json() -> Self {
        Self {
            status: StatusCode::OK,
            body: Body::Data(Map::new()),
        }
    }

    /// Empty `201 {"data":{}}`.
    pub fn created() -> Self {
        Self::json().status(StatusCode::CREATED)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: Body::Text(text.into()),
        }
    }

    pub fn error(status: StatusCode, code: &str, message: &str) -> Self {
        ApiError::new(status, code, message).into()
    }

    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Add `key` to the data object. No effect on error or text replies.
    #[must_use]
    pub fn data(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Body::Data(map) = &mut self.body {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Serialize `value` and add it under `key`.
    pub fn serialized<T: Serialize>(self, key: &str, value: &T) -> anyhow::Result<Self> {
        Ok(self.data(key, serde_json::to_value(value)?))
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, Body::Error(_))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match &self.body {
            Body::Data(map) => map.get(key),
            _ => None,
        }
    }
}

impl From<ApiError> for Reply {
    fn from(err: ApiError) -> Self {
        Self {
            status: err.status,
            body: Body::Error(err.body),
        }
    }
}

#[derive(Serialize)]
struct DataEnvelope {
    data: Map<String, Value>,
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self.body {
            Body::Data(data) => (self.status, Json(DataEnvelope { data })).into_response(),
            Body::Error(error) => (self.status, Json(ErrorEnvelope { error })).into_response(),
            Body::Text(text) => (self.status, text).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;

    #[test]
    fn data_accumulates_keys() {
        let reply = Reply::json().data("a", 1).data("b", "two");
        assert_eq!(reply.get("a"), Some(&Value::from(1)));
        assert_eq!(reply.get("b"), Some(&Value::from("two")));
        assert!(!reply.is_error());
    }

    #[test]
    fn created_sets_status() {
        assert_eq!(Reply::created().status_code(), StatusCode::CREATED);
    }

    #[test]
    fn error_reply_ignores_data() {
        let reply = Reply::error(StatusCode::BAD_REQUEST, "NO_USERNAME", "missing").data("x", 1);
        assert!(reply.is_error());
        assert_eq!(reply.get("x"), None);
    }

    #[test]
    fn serialized_embeds_structs() {
        #[derive(Serialize)]
        struct Item {
            id: u32,
        }
        let reply = Reply::json()
            .serialized("item", &Item { id: 7 })
            .expect("serialize");
        assert_eq!(reply.get("item"), Some(&serde_json::json!({"id": 7})));
    }

    #[test]
    fn content_types_follow_body_kind() {
        let json = Reply::json().into_response();
        assert_eq!(json.headers()[CONTENT_TYPE], "application/json");
        let text = Reply::text("hi").into_response();
        assert!(
            text.headers()[CONTENT_TYPE]
                .to_str()
                .expect("header")
                .starts_with("text/plain")
        );
    }
}
