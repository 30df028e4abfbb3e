use std::{borrow::Cow, error, fmt, sync::Arc};

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The error type every procedure result is normalised into.
pub type BoxError = Box<dyn error::Error + Send + Sync>;

/// Reduce an error code into the `0..=999` range of an HTTP status line.
///
/// Codes with more than three digits are divided by ten until they fit, so `15004` becomes `150`
/// and `1040` becomes `104`. Codes that already fit are returned unchanged.
pub const fn reduce_status(mut code: u32) -> u32 {
    while code > 999 {
        code /= 10;
    }
    code
}

/// A problem with the calling convention of a function given to [`Procedure`](crate::Procedure).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("expected a function with 1 .. 2 parameters but found {0}")]
    ParamCount(usize),
    #[error("expected a function with 1 .. 2 results but found {0}")]
    ReturnCount(usize),
    #[error("parameter {position} must be `{expected}` but is `{found}`")]
    Param {
        position: usize,
        expected: &'static str,
        found: String,
    },
    #[error("result {position} must be `{expected}` but is `{found}`")]
    Return {
        position: usize,
        expected: &'static str,
        found: String,
    },
}

/// Constructing a [`Procedure`](crate::Procedure) failed.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid procedure signature: {0}")]
    Signature(#[from] SignatureError),
    #[error("error applying procedure option: {0}")]
    Option(#[source] BoxError),
}

/// The request could not be decoded into the procedure's input.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("unsupported 'Content-Type' header: {0:?}")]
    UnsupportedContentType(String),
    #[error("can not read request body: {0}")]
    Body(#[source] axum::Error),
    #[error("can not unmarshal request body: {0}")]
    Json(#[source] serde_json::Error),
    #[error("can not unmarshal request values: {0}")]
    Input(#[source] serde_json::Error),
}

impl DecodeError {
    pub fn code(&self) -> u32 {
        match self {
            DecodeError::UnsupportedContentType(_) => 415,
            _ => 400,
        }
    }
}

/// Serialising a response failed.
#[derive(Error, Debug)]
#[error("can not encode response: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);

/// A type-erased input did not hold the type the callable declared.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("procedure input is missing or is not of type `{expected}`")]
pub struct InputMismatch {
    pub expected: &'static str,
}

/// Returned from a procedure to answer with an HTTP redirect instead of a body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("redirect ({status}) to {location:?}")]
pub struct Redirect {
    pub(crate) location: String,
    pub(crate) status: StatusCode,
}

impl Redirect {
    pub fn to(location: impl Into<String>, status: StatusCode) -> Self {
        Self {
            location: location.into(),
            status,
        }
    }

    /// `302 Found`
    pub fn found(location: impl Into<String>) -> Self {
        Self::to(location, StatusCode::FOUND)
    }

    /// `303 See Other`
    pub fn see_other(location: impl Into<String>) -> Self {
        Self::to(location, StatusCode::SEE_OTHER)
    }

    /// `307 Temporary Redirect`
    pub fn temporary(location: impl Into<String>) -> Self {
        Self::to(location, StatusCode::TEMPORARY_REDIRECT)
    }

    /// `308 Permanent Redirect`
    pub fn permanent(location: impl Into<String>) -> Self {
        Self::to(location, StatusCode::PERMANENT_REDIRECT)
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// The JSON body sent to the client for any failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorEnvelope>>,
}

impl ErrorEnvelope {
    /// The envelope sent in place of every error that is not safe to show.
    pub fn internal() -> Self {
        Self {
            code: 500,
            message: "internal server error".into(),
            detail: None,
            cause: None,
        }
    }

    /// The HTTP status this envelope is sent with.
    ///
    /// Codes which don't reduce to a valid status line are sent as `500`.
    pub fn status(&self) -> StatusCode {
        u16::try_from(reduce_status(self.code))
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// A rich application error.
///
/// Errors built with [`Error::new`] (or the shorthand constructors) are *safe*: their code,
/// message and detail are sent to the client. [`Error::internal`] and [`Error::private`] produce
/// errors that are only ever logged, together with any safe error they wrap.
#[derive(Debug, Clone)]
pub struct Error {
    code: u32,
    message: Cow<'static, str>,
    detail: Option<String>,
    // `Arc` over `Box` so the error stays `Clone`.
    cause: Option<Arc<dyn error::Error + Send + Sync>>,
    safe: bool,
}

impl Error {
    pub fn new(code: u32, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            cause: None,
            safe: true,
        }
    }

    pub fn internal(cause: impl Into<BoxError>) -> Self {
        Self::new(500, "internal server error")
            .with_cause(cause)
            .private()
    }

    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(400, message)
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(401, message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(403, message)
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(404, message)
    }

    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(409, message)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(Arc::from(cause.into()));
        self
    }

    /// Mark this error as not fit for the client.
    pub fn private(mut self) -> Self {
        self.safe = false;
        self
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    /// The client-visible form of this error.
    ///
    /// The cause is only included when it is itself a safe [`Error`].
    pub fn envelope(&self) -> ErrorEnvelope {
        let cause = self
            .cause
            .as_deref()
            .and_then(|cause| cause.downcast_ref::<Error>())
            .filter(|cause| cause.safe)
            .map(|cause| Box::new(cause.envelope()));

        ErrorEnvelope {
            code: self.code,
            message: self.message.to_string(),
            detail: self.detail.clone(),
            cause,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn error::Error + 'static))
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        let message = err.to_string();
        Error::new(err.code(), message).with_cause(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_codes_into_status_range() {
        assert_eq!(reduce_status(15004), 150);
        assert_eq!(reduce_status(1040), 104);
        assert_eq!(reduce_status(1000), 100);
        assert_eq!(reduce_status(999), 999);
        assert_eq!(reduce_status(404), 404);
        assert_eq!(reduce_status(0), 0);
        assert_eq!(reduce_status(u32::MAX), 429);

        for code in [0, 7, 404, 4041, 15004, 999_999, u32::MAX] {
            let reduced = reduce_status(code);
            assert!(reduced <= 999);
            assert_eq!(reduce_status(reduced), reduced);
        }
    }

    #[test]
    fn envelope_status() {
        let envelope = Error::new(40401, "no such user").envelope();
        assert_eq!(envelope.status(), StatusCode::NOT_FOUND);

        // `41` is not a valid status line
        let envelope = Error::new(41, "odd").envelope();
        assert_eq!(envelope.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn decode_errors_are_safe() {
        let err = Error::from(DecodeError::UnsupportedContentType("text/plain".into()));
        assert!(err.is_safe());
        assert_eq!(err.code(), 415);
        assert_eq!(err.message(), "unsupported 'Content-Type' header: \"text/plain\"");

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::from(DecodeError::Json(json));
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn envelope_includes_safe_causes_only() {
        let err = Error::bad_request("invalid order")
            .with_detail("quantity must be positive")
            .with_cause(Error::new(4221, "quantity"));
        assert_eq!(
            serde_json::to_string(&err.envelope()).unwrap(),
            r#"{"code":400,"message":"invalid order","detail":"quantity must be positive","cause":{"code":4221,"message":"quantity"}}"#
        );

        let err = Error::bad_request("invalid order").with_cause(Error::internal("db down"));
        assert_eq!(err.envelope().cause, None);
    }

    #[test]
    fn internal_errors_are_private() {
        let err = Error::internal("connection reset");
        assert!(!err.is_safe());
        assert_eq!(err.code(), 500);
        assert_eq!(
            error::Error::source(&err).map(ToString::to_string),
            Some("connection reset".to_string())
        );
    }
}
