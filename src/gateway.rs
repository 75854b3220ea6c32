//! HTTP client for the upstream services.
//!
//! One [`ApiClient`] per host. Handlers scope it to the caller's session with
//! [`ApiClient::with_token`], which attaches `Authorization: Bearer <token>` to
//! every request. No retries, refresh or timeouts: a failure is returned to the
//! caller as a [`GatewayError`] and surfaced by the handler.

use reqwest::{Client, Method, RequestBuilder, multipart};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("upstream responded {status}: {}", .message.as_deref().unwrap_or("<no message>"))]
    Status { status: u16, message: Option<String> },

    /// A 2xx response whose body reports a failure (the document service does this).
    #[error("upstream rejected the request: {0}")]
    Rejected(String),

    #[error("upstream unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected upstream payload: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The backend-supplied message if there is one, else `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            GatewayError::Status { message: Some(m), .. } => m.clone(),
            GatewayError::Rejected(m) => m.clone(),
            _ => fallback.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            token: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A copy that authenticates as the given upstream bearer token.
    pub fn with_token(&self, token: &str) -> Self {
        let token = token.trim();
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: (!token.is_empty()).then(|| token.to_string()),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        tracing::debug!(%method, %url, "upstream request");
        let rb = self.http.request(method, url);
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        send(self.request(Method::GET, path)).await
    }

    pub async fn get_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        send(self.request(Method::GET, path).query(query)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        send(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        send(self.request(Method::PATCH, path).json(body)).await
    }

    /// PATCH without a body, used for status transitions (`/cancel`, `/accept`).
    pub async fn patch_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        send(self.request(Method::PATCH, path)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        send(self.request(Method::DELETE, path)).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: multipart::Form,
    ) -> Result<T, GatewayError> {
        send(self.request(Method::POST, path).multipart(form)).await
    }
}

async fn send<T: DeserializeOwned>(rb: RequestBuilder) -> Result<T, GatewayError> {
    let resp = rb.send().await?;
    let status = resp.status();
    let url = resp.url().path().to_string();
    let bytes = resp.bytes().await?;

    if !status.is_success() {
        let message = serde_json::from_slice::<Value>(&bytes)
            .ok()
            .and_then(|v| extract_message(&v));
        tracing::warn!(status = status.as_u16(), path = %url, ?message, "upstream error");
        return Err(GatewayError::Status {
            status: status.as_u16(),
            message,
        });
    }

    // Empty 2xx bodies (DELETE, some PATCHes) decode as JSON null.
    let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &bytes
    };
    serde_json::from_slice(body).map_err(|e| GatewayError::Decode(format!("{url}: {e}")))
}

/// Pull a human-readable message out of an error payload.
///
/// Handles the shapes the clinic backend and the document service produce:
/// `{"message": "..."}`, `{"message": ["a", "b"]}`, `{"detail": {"message": "..."}}`,
/// `{"detail": "..."}` and `{"error": "..."}`.
pub fn extract_message(v: &Value) -> Option<String> {
    match v.get("message") {
        Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.clone()),
        Some(Value::Array(items)) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if !parts.is_empty() {
                return Some(parts.join(", "));
            }
        }
        _ => {}
    }
    match v.get("detail") {
        Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.clone()),
        Some(detail @ Value::Object(_)) => {
            if let Some(m) = extract_message(detail) {
                return Some(m);
            }
        }
        _ => {}
    }
    match v.get("error") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockBackend;
    use axum::http::Method;
    use serde_json::json;

    #[test]
    fn test_extract_message_shapes() {
        assert_eq!(extract_message(&json!({"message": "Slot taken"})).as_deref(), Some("Slot taken"));
        assert_eq!(
            extract_message(&json!({"message": ["email must be an email", "password too short"]})).as_deref(),
            Some("email must be an email, password too short")
        );
        assert_eq!(
            extract_message(&json!({"detail": {"error": "No document loaded", "message": "upload first"}})).as_deref(),
            Some("upload first")
        );
        assert_eq!(extract_message(&json!({"detail": "Not Found"})).as_deref(), Some("Not Found"));
        assert_eq!(extract_message(&json!({"error": "Invalid file type"})).as_deref(), Some("Invalid file type"));
        assert_eq!(extract_message(&json!({"statusCode": 500})), None);
        assert_eq!(extract_message(&json!({"message": "  "})), None);
    }

    #[test]
    fn test_user_message_fallback() {
        let e = GatewayError::Status { status: 500, message: None };
        assert_eq!(e.user_message("Unable to create appointment"), "Unable to create appointment");
        let e = GatewayError::Decode("bad".into());
        assert_eq!(e.user_message("fallback"), "fallback");
        let e = GatewayError::Rejected("Only .pdf files".into());
        assert_eq!(e.user_message("fallback"), "Only .pdf files");
    }

    #[tokio::test]
    async fn test_bearer_token_is_attached_when_present() {
        let mock = MockBackend::start().await;
        mock.respond(Method::GET, "/clinics", 200, json!([{"id": "c1"}]));

        let client = ApiClient::new(format!("{}/", mock.url()));
        let _: Value = client.get("/clinics").await.unwrap();
        let _: Value = client.with_token("upstream-abc").get("clinics").await.unwrap();
        let _: Value = client.with_token("   ").get("/clinics").await.unwrap();

        let seen = mock.requests_to(Method::GET, "/clinics");
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].authorization, None);
        assert_eq!(seen[1].authorization.as_deref(), Some("Bearer upstream-abc"));
        assert_eq!(seen[2].authorization, None);
    }

    #[tokio::test]
    async fn test_error_status_carries_backend_message() {
        let mock = MockBackend::start().await;
        mock.respond(Method::POST, "/appointments", 409, json!({"message": "Doctor is not available"}));

        let client = ApiClient::new(mock.url()).with_token("t");
        let err = client
            .post::<_, Value>("/appointments", &json!({"clinicId": "c1"}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.user_message("x"), "Doctor is not available");

        let seen = mock.requests_to(Method::POST, "/appointments");
        assert_eq!(seen[0].body, json!({"clinicId": "c1"}));
    }

    #[tokio::test]
    async fn test_query_and_empty_body() {
        let mock = MockBackend::start().await;
        mock.respond(Method::PATCH, "/appointments/a1/cancel", 200, Value::Null);
        mock.respond(Method::GET, "/auth/verify-email", 200, json!({"message": "ok"}));

        let client = ApiClient::new(mock.url());
        let unit: () = client.patch_empty("/appointments/a1/cancel").await.unwrap();
        assert_eq!(unit, ());

        let v: Value = client
            .get_query("/auth/verify-email", &[("token", "t0k")])
            .await
            .unwrap();
        assert_eq!(v["message"], "ok");
        let seen = mock.requests_to(Method::GET, "/auth/verify-email");
        assert_eq!(seen[0].query.as_deref(), Some("token=t0k"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = ApiClient::new("http://127.0.0.1:1");
        let err = client.get::<Value>("/clinics").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
        assert_eq!(err.status(), None);
    }
}
