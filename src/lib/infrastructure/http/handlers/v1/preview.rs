//! Template preview handlers

use askama::Template;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    domain::messaging::{
        composer::{CreatedMessage, MessageFactory},
        context::MessageContext,
        queue::QueueService,
    },
    infrastructure::http::{errors::ApiError, state::AppState},
};

/// Where a preview is composed for
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PreviewParams {
    /// Store to compose for. Defaults to the current store.
    #[schema(example = 1)]
    pub store_id: Option<i64>,

    /// Language to compose in. Defaults to the store language.
    #[schema(example = 1)]
    pub language_id: Option<i64>,
}

impl PreviewParams {
    fn context(&self, name: String) -> MessageContext {
        let mut ctx = MessageContext::new(name);

        if let Some(store_id) = self.store_id {
            ctx = ctx.with_store_id(store_id);
        }

        if let Some(language_id) = self.language_id {
            ctx = ctx.with_language_id(language_id);
        }

        ctx
    }
}

/// A rendered preview
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PreviewResponse {
    /// Sender mailbox
    #[schema(example = "Demo Store <shop@example.com>")]
    pub from: String,

    /// Rendered recipients
    #[schema(example = "Jane Roe <jane@example.com>")]
    pub to: String,

    /// Rendered reply-to address
    pub reply_to: Option<String>,

    /// BCC addresses
    pub bcc: Option<String>,

    /// Rendered subject
    #[schema(example = "Order 42 at Demo Store")]
    pub subject: String,

    /// Rendered HTML body
    pub body: String,
}

impl From<CreatedMessage> for PreviewResponse {
    fn from(created: CreatedMessage) -> Self {
        let email = created.email;

        Self {
            from: email.from,
            to: email.to,
            reply_to: email.reply_to,
            bcc: email.bcc,
            subject: email.subject,
            body: email.body,
        }
    }
}

/// HTML preview page
#[derive(Debug, Template)]
#[template(path = "preview.html")]
pub struct PreviewPage {
    name: String,
    from: String,
    to: String,
    reply_to: Option<String>,
    subject: String,
    body: String,
}

async fn compose<F: MessageFactory, Q: QueueService>(
    state: &AppState<F, Q>,
    name: String,
    params: &PreviewParams,
) -> Result<PreviewResponse, ApiError> {
    state
        .messages
        .preview(params.context(name.clone()), Vec::new())
        .await?
        .map(PreviewResponse::from)
        .ok_or_else(|| ApiError::new_422(&format!("No preview available for \"{name}\"")))
}

/// Preview a message template
#[utoipa::path(
    post,
    operation_id = "preview_template",
    tag = "Templates",
    path = "/api/v1/templates/{name}/preview",
    params(
        ("name" = String, Path, description = "System name of the template", example = "OrderPlaced.CustomerNotification"),
    ),
    request_body = PreviewParams,
    responses(
        (status = StatusCode::OK, description = "Preview rendered", body = PreviewResponse),
        (status = StatusCode::NOT_FOUND, description = "Template or store not found", body = ErrorResponse),
        (status = StatusCode::UNPROCESSABLE_ENTITY, description = "Template could not be rendered", body = ErrorResponse),
    )
)]
pub async fn handler<F: MessageFactory, Q: QueueService>(
    State(state): State<AppState<F, Q>>,
    Path(name): Path<String>,
    request: Result<Json<PreviewParams>, JsonRejection>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let Json(params) = request?;

    Ok(Json(compose(&state, name, &params).await?))
}

/// Preview a message template as an HTML page
#[utoipa::path(
    get,
    operation_id = "preview_template_page",
    tag = "Templates",
    path = "/api/v1/templates/{name}/preview",
    params(
        ("name" = String, Path, description = "System name of the template", example = "OrderPlaced.CustomerNotification"),
        PreviewParams,
    ),
    responses(
        (status = StatusCode::OK, description = "Preview page", content_type = "text/html"),
        (status = StatusCode::NOT_FOUND, description = "Template or store not found", body = ErrorResponse),
    )
)]
pub async fn page_handler<F: MessageFactory, Q: QueueService>(
    State(state): State<AppState<F, Q>>,
    Path(name): Path<String>,
    Query(params): Query<PreviewParams>,
) -> Result<PreviewPage, ApiError> {
    let preview = compose(&state, name.clone(), &params).await?;

    Ok(PreviewPage {
        name,
        from: preview.from,
        to: preview.to,
        reply_to: preview.reply_to,
        subject: preview.subject,
        body: preview.body,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use testresult::TestResult;

    use super::*;
    use crate::{
        domain::messaging::{
            composer::MockMessageFactory, errors::ComposeError, fixtures, model::TemplateModel,
        },
        infrastructure::http::{errors::ErrorResponse, router, state::tests::test_state},
    };

    fn preview() -> CreatedMessage {
        let mut email = fixtures::queued_email(0, 1);
        email.subject = "Order 42 at Demo Store".to_string();
        email.body = "<p>Hello \"Jane\"</p>".to_string();

        CreatedMessage {
            email,
            model: TemplateModel::new(),
            queued: false,
        }
    }

    #[tokio::test]
    async fn test_preview_returns_the_rendered_message() -> TestResult {
        let mut messages = MockMessageFactory::new();
        messages
            .expect_preview()
            .withf(|ctx, parts| {
                ctx.template_name.as_deref() == Some("OrderPlaced.CustomerNotification")
                    && ctx.store_id == Some(2)
                    && ctx.language_id.is_none()
                    && parts.is_empty()
            })
            .times(1)
            .returning(|_, _| Ok(Some(preview())));

        let response = TestServer::new(router(test_state(Some(messages), None)))?
            .post("/api/v1/templates/OrderPlaced.CustomerNotification/preview")
            .json(&json!({ "store_id": 2 }))
            .await;

        response.assert_status_ok();

        let json = response.json::<PreviewResponse>();

        assert_eq!(json.subject, "Order 42 at Demo Store");
        assert_eq!(json.to, "customer0@example.com");

        Ok(())
    }

    #[tokio::test]
    async fn test_preview_of_unknown_template_is_not_found() -> TestResult {
        let mut messages = MockMessageFactory::new();
        messages
            .expect_preview()
            .returning(|ctx, _| Err(ComposeError::TemplateNotFound(ctx.template_name.unwrap_or_default())));

        let response = TestServer::new(router(test_state(Some(messages), None)))?
            .post("/api/v1/templates/Missing/preview")
            .json(&json!({}))
            .await;

        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.json::<ErrorResponse>().error,
            "Message template \"Missing\" not found"
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_skipped_preview_is_unprocessable() -> TestResult {
        let mut messages = MockMessageFactory::new();
        messages.expect_preview().returning(|_, _| Ok(None));

        let response = TestServer::new(router(test_state(Some(messages), None)))?
            .post("/api/v1/templates/Welcome/preview")
            .json(&json!({}))
            .await;

        assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        Ok(())
    }

    #[tokio::test]
    async fn test_preview_page_embeds_the_escaped_body() -> TestResult {
        let mut messages = MockMessageFactory::new();
        messages
            .expect_preview()
            .withf(|ctx, _| ctx.language_id == Some(3))
            .returning(|_, _| Ok(Some(preview())));

        let response = TestServer::new(router(test_state(Some(messages), None)))?
            .get("/api/v1/templates/Welcome/preview")
            .add_query_param("language_id", 3)
            .await;

        response.assert_status_ok();

        let html = response.text();

        assert!(html.contains("<title>Preview: Welcome</title>"));
        assert!(html.contains("Order 42 at Demo Store"));
        assert!(html.contains("srcdoc=\"&lt;p&gt;Hello "));
        assert!(!html.contains("<p>Hello"));

        Ok(())
    }
}
