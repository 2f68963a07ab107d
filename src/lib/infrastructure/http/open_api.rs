//! OpenAPI module

use utoipa::OpenApi;

use crate::infrastructure::http::{errors::ErrorResponse, handlers::v1::*};

#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "Courier"),
    paths(
        preview::handler,
        preview::page_handler,
        queue::handler,
        uptime::handler
    ),
    components(schemas(
        preview::PreviewParams,
        preview::PreviewResponse,
        queue::SendQueueBody,
        queue::SendQueueResponse,
        uptime::UptimeResponse,
        ErrorResponse,
    ))
)]
pub struct ApiDocs;
