/// Failure of a single Mealie API request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No response was received (connection refused, DNS, timeout)
    #[error("no connection to {url}: {message}")]
    NoConnection { url: String, message: String },

    /// The server answered with a non-success status
    #[error("request to {url} failed with status {status}")]
    Status {
        url: String,
        status: u16,
        /// `detail` or `message` from the error payload, when it decodes
        detail: Option<String>,
    },

    /// A success response whose body did not match the expected shape
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ApiError {
    /// Short error code: the service's own error string, the HTTP status, or
    /// `no_connection`
    pub fn code(&self) -> String {
        match self {
            ApiError::NoConnection { .. } => "no_connection".to_string(),
            ApiError::Status {
                detail: Some(detail),
                ..
            } => detail.clone(),
            ApiError::Status { status, .. } => status.to_string(),
            ApiError::Decode { .. } => "decode_error".to_string(),
        }
    }

    /// Whether the server rejected our credentials
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Status { status: 401 | 403, .. })
    }
}

/// Pull a human-readable error out of a Mealie error body
///
/// Mealie answers either `{"detail": "..."}`, `{"detail": {"message": "..."}}`
/// or `{"message": "..."}`.
pub(super) fn error_detail(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let detail = value.get("detail").or_else(|| value.get("message"))?;
    match detail {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(o) => o
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    }
}
