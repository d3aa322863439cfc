use std::io;

use aws_smithy_runtime_api::client::result::SdkError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Backing errors for all AWS operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed API (message: {message:?}, retryable: {retryable:?})")]
    API { message: String, retryable: bool },
    #[error("failed for other reasons (message: {message:?}, retryable: {retryable:?})")]
    Other { message: String, retryable: bool },
}

impl Error {
    /// Returns the error message in "String".
    #[inline]
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Error::API { message, .. } | Error::Other { message, .. } => message.clone(),
        }
    }

    /// Returns if the error is retryable.
    #[inline]
    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            Error::API { retryable, .. } | Error::Other { retryable, .. } => *retryable,
        }
    }

    /// Wraps a non-retryable local failure (IO, configuration, parsing).
    pub fn other(message: impl Into<String>) -> Self {
        Error::Other {
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        io::Error::new(io::ErrorKind::Other, e.to_string())
    }
}

#[inline]
pub fn is_sdk_err_retryable<E, R>(e: &SdkError<E, R>) -> bool {
    match e {
        SdkError::TimeoutError(_) | SdkError::ResponseError(_) => true,
        SdkError::DispatchFailure(e) => e.is_timeout() || e.is_io(),
        _ => false,
    }
}

#[test]
fn test_error_accessors() {
    let e = Error::API {
        message: String::from("failed create_stack"),
        retryable: true,
    };
    assert_eq!(e.message(), "failed create_stack");
    assert!(e.retryable());

    let e = Error::other("missing output");
    assert_eq!(e.message(), "missing output");
    assert!(!e.retryable());

    let ioe: io::Error = e.into();
    assert_eq!(ioe.kind(), io::ErrorKind::Other);
    assert!(ioe.to_string().contains("missing output"));
}

/// Returns an empty raw response for building service errors in tests.
#[cfg(test)]
pub(crate) fn test_http_response(
    status: u16,
) -> aws_smithy_runtime_api::client::orchestrator::HttpResponse {
    use aws_smithy_runtime_api::{client::orchestrator::HttpResponse, http::StatusCode};
    use aws_smithy_types::body::SdkBody;

    HttpResponse::new(StatusCode::try_from(status).unwrap(), SdkBody::empty())
}

#[test]
fn test_is_sdk_err_retryable() {
    use aws_smithy_runtime_api::client::orchestrator::HttpResponse;

    let e: SdkError<io::Error, HttpResponse> = SdkError::timeout_error("timed out");
    assert!(is_sdk_err_retryable(&e));

    let e: SdkError<io::Error, HttpResponse> = SdkError::service_error(
        io::Error::new(io::ErrorKind::Other, "ValidationError"),
        test_http_response(400),
    );
    assert!(!is_sdk_err_retryable(&e));
}
