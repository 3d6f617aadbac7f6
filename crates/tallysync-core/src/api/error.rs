use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - session may have expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// How a failure is recovered and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transport failure or non-auth HTTP error: keep stale data, offer a retry.
    Network,
    /// 401: the session is gone; clear cached data and ask for a new login.
    Auth,
    /// The response did not have the expected shape; handled like `Network`.
    Validation,
    /// Enrichment data failed; never escalates to the primary content.
    Secondary,
    /// Local snapshot could not be read or written; never surfaced.
    Persistence,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Unauthorized => ErrorClass::Auth,
            ApiError::InvalidResponse(_) => ErrorClass::Validation,
            _ => ErrorClass::Network,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_auth_and_server_errors() {
        assert!(ApiError::from_status(401, "expired").is_unauthorized());
        assert!(matches!(ApiError::from_status(404, "nope"), ApiError::NotFound(_)));
        assert!(matches!(ApiError::from_status(503, "down"), ApiError::ServerError(_)));
        assert!(matches!(ApiError::from_status(418, ""), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_class_follows_error_taxonomy() {
        assert_eq!(ApiError::Unauthorized.class(), ErrorClass::Auth);
        assert_eq!(ApiError::InvalidResponse("x".into()).class(), ErrorClass::Validation);
        assert_eq!(ApiError::Transport("reset".into()).class(), ErrorClass::Network);
        assert_eq!(ApiError::ServerError("x".into()).class(), ErrorClass::Network);
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(400);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.contains("truncated, 800 total bytes"));
        assert_eq!(ApiError::truncate_body("short"), "short");
    }
}
