//! Queue dispatch handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::{
    domain::messaging::{
        composer::MessageFactory, dispatcher::DispatchReport, queue::QueueService,
    },
    infrastructure::http::{errors::ApiError, state::AppState},
};

/// Send queue request body
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SendQueueBody {
    /// Queued emails to send right away, manual ones included. All pending
    /// emails are sent when omitted.
    #[schema(example = json!([1, 2]))]
    pub ids: Option<Vec<i64>>,
}

/// Send queue response body
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SendQueueResponse {
    /// Emails handed to the transport
    #[schema(example = 2)]
    pub sent: usize,

    /// Emails whose send attempt failed
    #[schema(example = 0)]
    pub failed: usize,
}

impl From<DispatchReport> for SendQueueResponse {
    fn from(report: DispatchReport) -> Self {
        Self {
            sent: report.sent,
            failed: report.failed,
        }
    }
}

/// Send queued emails
#[utoipa::path(
    post,
    operation_id = "send_queue",
    tag = "Queue",
    path = "/api/v1/queue/send",
    request_body = SendQueueBody,
    responses(
        (status = StatusCode::OK, description = "Queue processed", body = SendQueueResponse),
        (status = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error", body = ErrorResponse),
    )
)]
pub async fn handler<F: MessageFactory, Q: QueueService>(
    State(state): State<AppState<F, Q>>,
    request: Result<Json<SendQueueBody>, JsonRejection>,
) -> Result<Json<SendQueueResponse>, ApiError> {
    let Json(request) = request?;
    let cancel = CancellationToken::new();

    let report = match request.ids {
        Some(ids) => state.queue.send_now(&ids, &cancel).await?,
        None => state.queue.send_pending(&cancel).await?,
    };

    Ok(Json(report.into()))
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use testresult::TestResult;

    use super::*;
    use crate::{
        domain::messaging::{errors::DispatchError, queue::MockQueueService},
        infrastructure::http::{router, state::tests::test_state},
    };

    #[tokio::test]
    async fn test_send_pending() -> TestResult {
        let mut queue = MockQueueService::new();
        queue.expect_send_now().never();
        queue.expect_send_pending().times(1).returning(|_| {
            Ok(DispatchReport {
                sent: 3,
                failed: 1,
                slices: 1,
                cancelled: false,
            })
        });

        let response = TestServer::new(router(test_state(None, Some(queue))))?
            .post("/api/v1/queue/send")
            .json(&json!({}))
            .await;

        response.assert_status_ok();
        assert_eq!(
            response.json::<SendQueueResponse>(),
            SendQueueResponse { sent: 3, failed: 1 }
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_send_now() -> TestResult {
        let mut queue = MockQueueService::new();
        queue
            .expect_send_now()
            .withf(|ids, _| ids == [4, 5])
            .times(1)
            .returning(|ids, _| {
                Ok(DispatchReport {
                    sent: ids.len(),
                    ..Default::default()
                })
            });

        let response = TestServer::new(router(test_state(None, Some(queue))))?
            .post("/api/v1/queue/send")
            .json(&json!({ "ids": [4, 5] }))
            .await;

        assert_eq!(response.json::<SendQueueResponse>().sent, 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_an_internal_error() -> TestResult {
        let mut queue = MockQueueService::new();
        queue
            .expect_send_pending()
            .returning(|_| Err(DispatchError::UnknownError(anyhow!("database unavailable"))));

        let response = TestServer::new(router(test_state(None, Some(queue))))?
            .post("/api/v1/queue/send")
            .json(&json!({}))
            .await;

        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        Ok(())
    }
}
