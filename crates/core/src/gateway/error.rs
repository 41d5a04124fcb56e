use thiserror::Error;

/// Errors returned by a messaging gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The edit would not change the message; callers treat this as success.
    #[error("message is not modified")]
    NotModified,

    #[error("gateway request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("gateway API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("gateway is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn is_not_modified(&self) -> bool {
        matches!(self, GatewayError::NotModified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = GatewayError::Api {
            code: 400,
            description: "Bad Request: chat not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "gateway API error 400: Bad Request: chat not found"
        );
        assert!(GatewayError::NotModified.is_not_modified());
        assert!(!GatewayError::Closed.is_not_modified());
    }
}
