use anyhow::anyhow;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tokio::time::Instant;
use tracing::instrument;

use crate::{
    auth::AuthUser, errors::ServerError, pipeline::ContractRequest, ratelimit, AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/contracts/generate", post(generate_contract))
}

#[derive(Serialize)]
pub struct GenerateResp {
    pub id: i64,
    pub final_contract: String,
    pub pdf_file: String,
    pub completed: bool,
}

/// Runs the drafting pipeline, renders the PDF and stores the contract.
#[instrument(name = "Generating contract", skip_all, fields(user_id = auth.0.id))]
pub async fn generate_contract(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<ContractRequest>, JsonRejection>,
) -> Result<Json<GenerateResp>, ServerError> {
    let AuthUser(user) = auth;
    let Json(request) =
        payload.map_err(|err| ServerError::ValidationError(anyhow!(err.body_text())))?;
    request
        .validate()
        .map_err(|msg| ServerError::ValidationError(anyhow!(msg)))?;
    // Rejected bodies do not count against the quota
    ratelimit::check(&state.limits.generate, user.id)?;

    tracing::info!(contract_type = %request.contract_type, "Contract generation requested");
    let instant = Instant::now();

    let generated = state
        .workflow
        .run(request)
        .await
        .map_err(ServerError::Pipeline)?;

    let pdf_path = state
        .presenter
        .render(&generated.text)
        .await
        .map_err(ServerError::Internal)?;
    let pdf_file = pdf_path.display().to_string();

    let contract = match state
        .db
        .insert_contract(
            user.id,
            generated.contract_type,
            &generated.text,
            Some(&pdf_file),
        )
        .await
    {
        Ok(contract) => contract,
        Err(err) => {
            state.presenter.discard(&pdf_path).await;
            return Err(ServerError::DbError(anyhow!(
                "Failed to save contract: {}",
                err
            )));
        }
    };

    tracing::info!(
        contract_id = contract.id,
        references = generated.references.len(),
        "Contract generation completed, elapsed {:?}",
        instant.elapsed()
    );

    Ok(Json(GenerateResp {
        id: contract.id,
        final_contract: contract.content,
        pdf_file,
        completed: true,
    }))
}
