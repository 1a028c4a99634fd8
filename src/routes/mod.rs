use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::path::Path;
use tower_http::services::ServeDir;

mod auth;
mod chat;
mod contracts;
mod health_check;

use crate::AppState;

pub fn router(output_dir: &Path) -> Router<AppState> {
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health_check::health_check_handler))
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::routes())
                .merge(contracts::routes())
                .merge(chat::routes()),
        )
        .nest_service("/generated_contracts", ServeDir::new(output_dir))
}

async fn welcome() -> Json<Value> {
    Json(json!({ "message": "Welcome to the lexdraft contract drafting API" }))
}
