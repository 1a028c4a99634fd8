use axum::{routing::IntoMakeService, Router, Server};
use hyper::server::conn::AddrIncoming;
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::{AllowHeaders, Any, CorsLayer},
    timeout::TimeoutLayer,
};

mod cfg;
pub use cfg::*;
mod telemetry;
pub use telemetry::*;
mod middleware;
pub use middleware::*;
mod db;
pub use db::*;
mod openai;
pub use openai::*;
mod embeddings;
pub use embeddings::*;

pub mod assistant;
pub mod auth;
pub mod errors;
pub mod pipeline;
pub mod presenter;
pub mod ratelimit;
mod routes;
pub mod tinyvector;
pub mod types;

use assistant::ContractAssistant;
use auth::JwtService;
use pipeline::{drafter::Drafter, retriever::Retriever, Workflow};
use presenter::Presenter;
use ratelimit::RateLimits;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cfg: Config,
    pub workflow: Arc<Workflow>,
    pub assistant: Arc<ContractAssistant>,
    pub presenter: Presenter,
    pub jwt: Arc<JwtService>,
    pub limits: RateLimits,
}

impl AppState {
    pub fn new(cfg: Config, db: Db, workflow: Workflow, assistant: ContractAssistant) -> Self {
        Self {
            presenter: Presenter::new(cfg.output_dir.clone()),
            jwt: Arc::new(JwtService::new(&cfg.jwt_secret, cfg.access_token_ttl)),
            limits: RateLimits::new(cfg.generate_per_minute, cfg.chat_per_minute),
            workflow: Arc::new(workflow),
            assistant: Arc::new(assistant),
            db,
            cfg,
        }
    }

    /// Wires the pipeline and the assistant to one completion backend and
    /// one embedding backend.
    pub fn with_backends(
        cfg: Config,
        db: Db,
        llm: Arc<dyn Completion>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let workflow = Workflow::new(Retriever::new(embedder), Drafter::new(llm.clone()));
        Self::new(cfg, db, workflow, ContractAssistant::new(llm))
    }
}

pub fn app(state: AppState) -> Router {
    let trace_layer = telemetry::trace_layer();
    let (req_headers_layer, resp_headers_layer) = telemetry::sensitive_headers_layers();

    let request_id_layer = middleware::request_id_layer();
    let propagate_request_id_layer = middleware::propagate_request_id_layer();

    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(AllowHeaders::mirror_request())
        .max_age(Duration::from_secs(600));

    let timeout_layer = TimeoutLayer::new(state.cfg.request_timeout);

    Router::new()
        .merge(routes::router(&state.cfg.output_dir))
        .layer(cors_layer)
        .layer(timeout_layer)
        .layer(resp_headers_layer)
        .layer(propagate_request_id_layer)
        .layer(trace_layer)
        .layer(req_headers_layer)
        .layer(request_id_layer)
        .with_state(state)
}

pub fn run(state: AppState) -> Server<AddrIncoming, IntoMakeService<Router>> {
    let addr = state.cfg.listen_address;
    axum::Server::bind(&addr).serve(app(state).into_make_service())
}
