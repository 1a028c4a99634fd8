use anyhow::Context;
use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{errors::ServerError, AppState};

pub async fn health_check_handler(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    state
        .db
        .ping()
        .await
        .context("Database ping failed")
        .map_err(ServerError::DbError)?;
    Ok(Json(json!({ "status": "ok" })))
}
