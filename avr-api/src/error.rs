use http_client::HttpError;
use thiserror::Error;

/// High-level API errors for receiver operations
///
/// This enum follows the error taxonomy of the adapter layer: network and
/// parse failures are recoverable and only leave cached state stale, while
/// configuration errors are raised before any request is attempted.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network communication error
    ///
    /// The receiver is unreachable, the request timed out or the connection
    /// was reset.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Response parsing error
    ///
    /// The receiver answered with a body that is not valid XML.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The receiver reported the feature or zone as unsupported
    #[error("Feature unsupported: {0}")]
    FeatureUnsupported(String),

    /// Invalid device configuration
    ///
    /// Raised at registration time, e.g. for a missing IP address.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Invalid parameter value
    ///
    /// Unknown commands or missing command options.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;

/// Convert from HttpError to ApiError
impl From<HttpError> for ApiError {
    fn from(error: HttpError) -> Self {
        match error {
            HttpError::Network(msg) => ApiError::NetworkError(msg),
            HttpError::Parse(msg) => ApiError::ParseError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_conversion() {
        let api_error: ApiError = HttpError::Network("connection timeout".to_string()).into();
        assert!(matches!(api_error, ApiError::NetworkError(_)));

        let api_error: ApiError = HttpError::Parse("invalid XML".to_string()).into();
        assert!(matches!(api_error, ApiError::ParseError(_)));
    }

    #[test]
    fn test_error_display() {
        let network_err = ApiError::NetworkError("connection failed".to_string());
        assert_eq!(format!("{}", network_err), "Network error: connection failed");

        let config_err = ApiError::ConfigurationError("IP address is empty".to_string());
        assert_eq!(format!("{}", config_err), "Configuration error: IP address is empty");
    }
}
