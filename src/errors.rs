use anyhow::{anyhow, Error};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::pipeline::{StageError, StageErrorKind};

#[derive(Debug)]
pub enum ServerError {
    DbError(Error),
    ValidationError(Error),
    Unauthorized(Error),
    NotFound(Error),
    Conflict(Error),
    RateLimited,
    Pipeline(StageError),
    OpenAIAPIError(Error),
    Internal(Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::DbError(err) | ServerError::Internal(err) => {
                tracing::error!("{:?}", err);
                HTTPError::internal_error().into_response()
            }
            ServerError::ValidationError(err) => {
                tracing::error!("{:?}", err);
                HTTPError::new(err)
                    .with_status(StatusCode::BAD_REQUEST)
                    .into_response()
            }
            ServerError::Unauthorized(err) => {
                tracing::error!("{:?}", err);
                let mut response = HTTPError::new(err)
                    .with_status(StatusCode::UNAUTHORIZED)
                    .into_response();
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer"),
                );
                response
            }
            ServerError::NotFound(err) => {
                tracing::error!("{:?}", err);
                HTTPError::new(err)
                    .with_status(StatusCode::NOT_FOUND)
                    .into_response()
            }
            ServerError::Conflict(err) => {
                tracing::error!("{:?}", err);
                HTTPError::new(err)
                    .with_status(StatusCode::CONFLICT)
                    .into_response()
            }
            ServerError::RateLimited => {
                tracing::warn!("Rate limit exceeded");
                HTTPError::new(anyhow!("Rate limit exceeded."))
                    .with_status(StatusCode::TOO_MANY_REQUESTS)
                    .into_response()
            }
            ServerError::Pipeline(err) => {
                tracing::error!(stage = ?err.stage, "{}", err);
                let status = match err.kind {
                    StageErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
                    StageErrorKind::Validation => StatusCode::BAD_REQUEST,
                    StageErrorKind::External => StatusCode::BAD_GATEWAY,
                };
                HTTPError::new(anyhow!(err.message))
                    .with_status(status)
                    .into_response()
            }
            ServerError::OpenAIAPIError(err) => {
                tracing::error!("{:?}", err);
                HTTPError::new(anyhow!("Upstream model request failed"))
                    .with_status(StatusCode::BAD_GATEWAY)
                    .into_response()
            }
        }
    }
}

#[derive(Debug)]
struct HTTPError {
    error: Error,
    status_code: StatusCode,
}

impl HTTPError {
    fn new(error: Error) -> Self {
        Self {
            error,
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn with_status(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        self
    }

    fn internal_error() -> Self {
        Self {
            error: anyhow!("Internal error"),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HTTPError {
    fn into_response(self) -> Response {
        (
            self.status_code,
            Json(json!({ "error": self.error.to_string() })),
        )
            .into_response()
    }
}
