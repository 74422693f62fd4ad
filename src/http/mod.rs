mod routes;
mod types;

use crate::ai::Generator;
use crate::config::DeliveryConfig;
use crate::delivery::{self, CallbackSender};
use crate::http::routes::*;
use crate::queue::QueueClient;
use crate::TracingReloadHandle;
use axum::http::{HeaderName, HeaderValue};
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

#[derive(Clone)]
pub struct HttpState {
    pub generator: Generator,
    pub callbacks: CallbackSender,
    pub callback_client: reqwest::Client,
    pub queue: Option<QueueClient>,
    pub delivery: DeliveryConfig,
    pub tracing_reload: TracingReloadHandle,
}

pub fn create_app(
    delivery_config: DeliveryConfig,
    generator: Generator,
    callbacks: CallbackSender,
    queue: Option<QueueClient>,
    tracing_reload: TracingReloadHandle,
) -> axum::Router {
    let router = axum::Router::new()
        .route("/", get(health))
        .route("/skill", post(skill))
        .route("/api/process-job", post(process_job))
        .route("/sys/set-log-level", post(sys_set_log_level))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-version"),
            HeaderValue::from_static(crate::VERSION),
        ))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let state = HttpState {
        generator,
        callbacks,
        callback_client: delivery::callback_client(),
        queue,
        delivery: delivery_config,
        tracing_reload,
    };
    router.with_state(state)
}
