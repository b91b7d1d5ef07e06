use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};
use serde::Serialize;

use crate::{ApiError, Result};

/// Header carrying the idempotency key of a retried write.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Describes one logical call to the backend.
///
/// `path` is relative to the client's `/api` base path, e.g. `/products`.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            idempotency_key: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Sets a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|err| ApiError::InvalidRequest(format!("body is not serializable: {err}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Adds a header, rejecting names or values that are not valid HTTP.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            ApiError::InvalidRequest(format!("invalid header name '{name}': {err}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|err| {
            ApiError::InvalidRequest(format!("invalid value for header '{name}': {err}"))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Marks a write as safe to retry; the key is sent on every attempt.
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Safe methods may be repeated without side effects.
    pub fn is_safe_method(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// Whether automatic retry may repeat this request.
    pub(crate) fn retry_eligible(&self, retry_non_idempotent: bool) -> bool {
        self.is_safe_method() || self.idempotency_key.is_some() || retry_non_idempotent
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use super::RequestDescriptor;
    use crate::ApiError;

    #[test]
    fn only_safe_methods_retry_by_default() {
        assert!(RequestDescriptor::get("/products").retry_eligible(false));
        assert!(RequestDescriptor::head("/products").retry_eligible(false));
        assert!(RequestDescriptor::new(Method::OPTIONS, "/products").retry_eligible(false));
        for request in [
            RequestDescriptor::post("/orders"),
            RequestDescriptor::put("/orders/1"),
            RequestDescriptor::patch("/orders/1"),
            RequestDescriptor::delete("/orders/1"),
        ] {
            assert!(!request.retry_eligible(false), "{}", request.method);
            assert!(request.retry_eligible(true), "{}", request.method);
        }
    }

    #[test]
    fn idempotency_key_makes_write_retryable() {
        let request = RequestDescriptor::post("/orders").idempotency_key("order-42");
        assert!(request.retry_eligible(false));
    }

    #[test]
    fn json_body_is_stored_as_value() {
        let request = RequestDescriptor::post("/orders")
            .json(&json!({ "sku": "A-1", "qty": 2 }))
            .expect("body must serialize");
        assert_eq!(request.body, Some(json!({ "sku": "A-1", "qty": 2 })));
    }

    #[test]
    fn invalid_header_is_rejected() {
        let err = RequestDescriptor::get("/stats")
            .header("x-trace", "line\nbreak")
            .expect_err("newline is not a valid header value");
        assert!(matches!(err, ApiError::InvalidRequest(_)));

        let err = RequestDescriptor::get("/stats")
            .header("bad header", "v")
            .expect_err("space is not a valid header name");
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }
}
