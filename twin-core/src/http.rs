//! Status handling shared by the collaborator HTTP clients

use reqwest::{Response, StatusCode};
use std::fmt;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Non-success reply from a collaborator service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFailure {
    pub status: StatusCode,
    /// Response body, truncated
    pub body: String,
}

impl ServiceFailure {
    pub fn new(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}): {}", self.status, self.body)
    }
}

/// Pass a 2xx response through, otherwise read its error body.
pub async fn check_status(response: Response) -> Result<Response, ServiceFailure> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ServiceFailure::new(status, &body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_body_truncated() {
        let failure = ServiceFailure::new(StatusCode::BAD_GATEWAY, &"x".repeat(2000));
        assert_eq!(failure.body.len(), MAX_ERROR_BODY_CHARS);
        assert!(failure.to_string().starts_with("(502 Bad Gateway): xxx"));
        assert!(!failure.is_not_found());
        assert!(ServiceFailure::new(StatusCode::NOT_FOUND, "").is_not_found());
    }
}
