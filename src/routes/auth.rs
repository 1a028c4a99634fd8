use anyhow::{anyhow, Context};
use axum::{
    extract::{rejection::FormRejection, rejection::JsonRejection, State},
    routing::post,
    Form, Json, Router,
};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    auth::{hash_password, validate_signup, verify_password},
    errors::ServerError,
    types::User,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().nest(
        "/auth",
        Router::new()
            .route("/signup", post(signup))
            .route("/token", post(login)),
    )
}

#[derive(Deserialize)]
pub struct SignupReq {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResp {
    pub access_token: String,
    pub token_type: &'static str,
}

#[instrument(name = "Signing up", skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupReq>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenResp>), ServerError> {
    let Json(payload) = payload.map_err(|err| ServerError::ValidationError(anyhow!(err.body_text())))?;
    let username = payload.username.trim();
    let email = payload.email.trim();
    validate_signup(username, email, &payload.password)
        .map_err(|msg| ServerError::ValidationError(anyhow!(msg)))?;

    let taken = state
        .db
        .select_user_by_username(username)
        .await
        .context("Failed to select user")
        .map_err(ServerError::DbError)?;
    if taken.is_some() {
        return Err(username_taken());
    }

    let hash = hash_password(payload.password, state.cfg.bcrypt_cost)
        .await
        .map_err(ServerError::Internal)?;

    // The unique index still guards against a concurrent signup
    let user = state
        .db
        .insert_user(username, email, &hash)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => username_taken(),
            other => ServerError::DbError(anyhow!("Failed to insert user: {}", other)),
        })?;
    tracing::info!(user_id = user.id, "User signed up");

    Ok((StatusCode::CREATED, Json(token_for(&state, &user)?)))
}

#[instrument(name = "Issuing token", skip_all)]
pub async fn login(
    State(state): State<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Json<TokenResp>, ServerError> {
    let Form(form) = form.map_err(|err| ServerError::ValidationError(anyhow!(err.body_text())))?;

    let user = state
        .db
        .select_user_by_username(form.username.trim())
        .await
        .context("Failed to select user")
        .map_err(ServerError::DbError)?;
    let Some(user) = user else {
        return Err(bad_credentials());
    };

    let valid = verify_password(form.password, user.password_hash.clone())
        .await
        .map_err(ServerError::Internal)?;
    if !valid {
        return Err(bad_credentials());
    }
    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(token_for(&state, &user)?))
}

fn token_for(state: &AppState, user: &User) -> Result<TokenResp, ServerError> {
    let access_token = state.jwt.issue(user).map_err(ServerError::Internal)?;
    Ok(TokenResp {
        access_token,
        token_type: "bearer",
    })
}

fn username_taken() -> ServerError {
    ServerError::Conflict(anyhow!("Username already registered"))
}

fn bad_credentials() -> ServerError {
    ServerError::Unauthorized(anyhow!("Incorrect username or password"))
}
