//! Version 1 of the API

use axum::{
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;

use crate::{
    domain::messaging::{composer::MessageFactory, queue::QueueService},
    infrastructure::http::{open_api::ApiDocs, state::AppState},
};

pub mod preview;
pub mod queue;
pub mod stoplight;
pub mod uptime;

/// Routes of version 1 of the API
pub fn router<F: MessageFactory, Q: QueueService>() -> Router<AppState<F, Q>> {
    Router::new()
        .route("/", get(stoplight::handler))
        .route("/openapi.json", get(Json(ApiDocs::openapi())))
        .route("/uptime", get(uptime::handler))
        .route(
            "/templates/:name/preview",
            get(preview::page_handler).post(preview::handler),
        )
        .route("/queue/send", post(queue::handler))
}
