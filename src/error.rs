//! Error types for chatloop.
//!
//! One error type covers the completion backend, the template classifier, the
//! external mailbox, the validation endpoint, and local configuration defects.
//! HTTP failures are classified by status so callers can tell a rate limit
//! from an outage without looking at the text.

use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;
use std::sync::Arc;

/// Shared, cloneable underlying cause.
pub type Source = Arc<dyn error::Error + Send + Sync>;

/// The main error type for chatloop.
#[derive(Clone, Debug)]
pub enum Error {
    /// The server answered with a status that has no dedicated variant.
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error type string from the response body.
        error_type: Option<String>,
        /// Human-readable error message.
        message: String,
        /// Request ID for correlating with server logs.
        request_id: Option<String>,
    },

    /// The server refused the credentials (401) or the action (403).
    Unauthorized {
        /// HTTP status code.
        status_code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// The route or resource does not exist.
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Rate limit exceeded.
    RateLimit {
        /// Human-readable error message.
        message: String,
        /// Time to wait before retrying, in seconds.
        retry_after: Option<u64>,
    },

    /// The server rejected the request body.
    BadRequest {
        /// Human-readable error message.
        message: String,
        /// Parameter that caused the error.
        param: Option<String>,
    },

    /// The request or the server timed out.
    Timeout {
        /// Human-readable error message.
        message: String,
        /// Duration of the timeout in seconds.
        duration: Option<f64>,
    },

    /// The connection could not be established.
    Connection {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Source>,
    },

    /// The server failed or is overloaded (5xx).
    Unavailable {
        /// HTTP status code.
        status_code: u16,
        /// Human-readable error message.
        message: String,
        /// Time to wait before retrying, in seconds.
        retry_after: Option<u64>,
    },

    /// JSON or YAML could not be read or written.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Source>,
    },

    /// Local file I/O failed.
    Io {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Arc<io::Error>,
    },

    /// The HTTP client failed outside of the cases above.
    HttpClient {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Source>,
    },

    /// Local input was rejected before anything was sent.
    Validation {
        /// Human-readable error message.
        message: String,
        /// Parameter that failed validation.
        param: Option<String>,
    },

    /// A URL could not be parsed.
    Url {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<url::ParseError>,
    },

    /// The stream broke or carried an error frame.
    Streaming {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Source>,
    },

    /// Bytes on the wire were not valid UTF-8.
    Encoding {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Source>,
    },

    /// A configuration defect, such as a reference to an unknown prompt id.
    ///
    /// These are raised at the call site and never retried.
    Configuration {
        /// Human-readable error message.
        message: String,
    },
}

impl Error {
    /// Creates a new API error.
    pub fn api(
        status_code: u16,
        error_type: Option<String>,
        message: String,
        request_id: Option<String>,
    ) -> Self {
        Error::Api {
            status_code,
            error_type,
            message,
            request_id,
        }
    }

    /// Creates a new unauthorized error for a 401 or 403 answer.
    pub fn unauthorized(status_code: u16, message: impl Into<String>) -> Self {
        Error::Unauthorized {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a new not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new rate limit error.
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new bad request error.
    pub fn bad_request(message: impl Into<String>, param: Option<String>) -> Self {
        Error::BadRequest {
            message: message.into(),
            param,
        }
    }

    /// Creates a new timeout error.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// Creates a new connection error.
    pub fn connection(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new unavailable error for a 5xx answer.
    pub fn unavailable(
        status_code: u16,
        message: impl Into<String>,
        retry_after: Option<u64>,
    ) -> Self {
        Error::Unavailable {
            status_code,
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a new HTTP client error.
    pub fn http_client(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>, param: Option<String>) -> Self {
        Error::Validation {
            message: message.into(),
            param,
        }
    }

    /// Creates a new URL error.
    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    /// Creates a new streaming error.
    pub fn streaming(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Streaming {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Returns true if this error is related to rate limiting.
    ///
    /// Besides the dedicated variant this also matches 429 API errors and any
    /// error whose text mentions a rate limit, since classifier backends tend to
    /// relay upstream provider failures as plain messages.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Error::RateLimit { .. }
            | Error::Api {
                status_code: 429, ..
            } => true,
            _ => self.to_string().to_ascii_lowercase().contains("rate limit"),
        }
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if this error is a configuration defect.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }

    /// Returns the HTTP status behind this error, if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status_code, .. }
            | Error::Unauthorized { status_code, .. }
            | Error::Unavailable { status_code, .. } => Some(*status_code),
            Error::NotFound { .. } => Some(404),
            Error::RateLimit { .. } => Some(429),
            Error::BadRequest { .. } => Some(400),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Api {
                message,
                error_type,
                request_id,
                ..
            } => {
                match error_type {
                    Some(error_type) => write!(f, "{error_type}: {message}")?,
                    None => write!(f, "API error: {message}")?,
                }
                if let Some(request_id) = request_id {
                    write!(f, " (Request ID: {request_id})")?;
                }
                Ok(())
            }
            Error::Unauthorized {
                status_code: 403,
                message,
            } => write!(f, "Permission denied: {message}"),
            Error::Unauthorized { message, .. } => write!(f, "Unauthorized: {message}"),
            Error::NotFound { message } => write!(f, "Not found: {message}"),
            Error::RateLimit {
                message,
                retry_after: Some(secs),
            } => write!(f, "Rate limit exceeded: {message} (retry after {secs} seconds)"),
            Error::RateLimit { message, .. } => write!(f, "Rate limit exceeded: {message}"),
            Error::BadRequest {
                message,
                param: Some(param),
            } => write!(f, "Bad request: {message} (parameter: {param})"),
            Error::BadRequest { message, .. } => write!(f, "Bad request: {message}"),
            Error::Timeout {
                message,
                duration: Some(secs),
            } => write!(f, "Timeout error: {message} ({secs} seconds)"),
            Error::Timeout { message, .. } => write!(f, "Timeout error: {message}"),
            Error::Connection { message, .. } => write!(f, "Connection error: {message}"),
            Error::Unavailable {
                status_code,
                message,
                ..
            } => write!(f, "Server unavailable ({status_code}): {message}"),
            Error::Serialization { message, .. } => write!(f, "Serialization error: {message}"),
            Error::Io { message, .. } => write!(f, "I/O error: {message}"),
            Error::HttpClient { message, .. } => write!(f, "HTTP client error: {message}"),
            Error::Validation {
                message,
                param: Some(param),
            } => write!(f, "Validation error: {message} (parameter: {param})"),
            Error::Validation { message, .. } => write!(f, "Validation error: {message}"),
            Error::Url { message, .. } => write!(f, "URL error: {message}"),
            Error::Streaming { message, .. } => write!(f, "Streaming error: {message}"),
            Error::Encoding { message, .. } => write!(f, "Encoding error: {message}"),
            Error::Configuration { message } => write!(f, "Configuration error: {message}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Connection { source, .. }
            | Error::Serialization { source, .. }
            | Error::HttpClient { source, .. }
            | Error::Streaming { source, .. }
            | Error::Encoding { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source),
            Error::Url { source, .. } => source.as_ref().map(|e| e as &(dyn error::Error + 'static)),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(format!("YAML error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("URL parse error: {err}"), Some(err))
    }
}

impl From<Utf8Error> for Error {
    fn from(err: Utf8Error) -> Self {
        Error::Encoding {
            message: format!("UTF-8 error: {err}"),
            source: Some(Arc::new(err)),
        }
    }
}

/// A specialized Result type for chatloop operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detection() {
        assert!(Error::rate_limit("slow down", Some(3)).is_rate_limit());
        assert!(Error::api(429, None, "too many".to_string(), None).is_rate_limit());
        assert!(Error::unavailable(500, "upstream said: Rate Limit exceeded", None).is_rate_limit());
        assert!(!Error::not_found("template").is_rate_limit());
        assert!(!Error::connection("refused", None).is_rate_limit());
    }

    #[test]
    fn display_includes_detail() {
        let err = Error::rate_limit("quota", Some(12));
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded: quota (retry after 12 seconds)"
        );
        let err = Error::configuration("prompt `nope` not found");
        assert_eq!(err.to_string(), "Configuration error: prompt `nope` not found");
        let err = Error::api(
            418,
            Some("teapot".to_string()),
            "short and stout".to_string(),
            Some("req-1".to_string()),
        );
        assert_eq!(err.to_string(), "teapot: short and stout (Request ID: req-1)");
        assert_eq!(
            Error::unauthorized(403, "read only").to_string(),
            "Permission denied: read only"
        );
        assert_eq!(
            Error::unavailable(504, "gateway", Some(5)).to_string(),
            "Server unavailable (504): gateway"
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(Error::unauthorized(401, "x").status_code(), Some(401));
        assert_eq!(Error::not_found("x").status_code(), Some(404));
        assert_eq!(Error::connection("x", None).status_code(), None);
    }

    #[test]
    fn sources_are_preserved() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::from(json_err);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("Serialization error: JSON error"));
    }
}
