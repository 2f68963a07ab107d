//! API handler modules

use std::any::Any;

use axum::{body::Body, http::Response, response::IntoResponse};
use tracing::error;

use super::errors::ApiError;

pub mod v1;

/// Message returned for requests that panicked
pub const PANIC_MESSAGE: &str = "An unknown error occurred, please try again";

/// Logs the panic of a request and answers with a generic 500 error
pub fn panic_handler(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let details = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");

    error!("request handler panicked: {details}");

    ApiError::new_500(PANIC_MESSAGE).into_response()
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use axum::{body::to_bytes, http::StatusCode};
    use testresult::TestResult;

    use super::*;
    use crate::infrastructure::http::errors::ErrorResponse;

    fn panic_payload(message: &'static str) -> Box<dyn Any + Send + 'static> {
        match panic::catch_unwind(AssertUnwindSafe(|| panic!("{message}"))) {
            Err(payload) => payload,
            Ok(()) => unreachable!("the closure always panics"),
        }
    }

    #[tokio::test]
    async fn test_panics_do_not_leak_details() -> TestResult {
        let response = panic_handler(panic_payload("template cache poisoned"));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let error = serde_json::from_slice::<ErrorResponse>(&body)?;

        assert_eq!(error.error, PANIC_MESSAGE);

        Ok(())
    }
}
