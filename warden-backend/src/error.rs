use axum::{
  Json,
  extract::rejection::{JsonRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use warden_store::StoreError;

use crate::manager::ManagerError;

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub success: bool,
  pub error: String,
}

impl ErrorResponse {
  pub fn new(error: impl Into<String>) -> Self {
    Self {
      success: false,
      error: error.into(),
    }
  }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
  Manager(ManagerError),
  Store(StoreError),
  ValidationError(String),
  Unauthorized,
}

fn store_failure(err: &StoreError) -> (StatusCode, &'static str) {
  match err {
    StoreError::ServerNotFound => (StatusCode::NOT_FOUND, "Server not found"),
    StoreError::Sqlite(_) | StoreError::Connection(_) => {
      // Don't expose internal database errors
      tracing::error!("Internal database error: {:?}", err);
      (
        StatusCode::INTERNAL_SERVER_ERROR,
        "An internal error occurred. Please try again later.",
      )
    }
    _ => {
      tracing::error!(error = %err, "Panel request failed");
      (StatusCode::BAD_GATEWAY, "Failed to reach the server files")
    }
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      AppError::Manager(ManagerError::Store(err)) | AppError::Store(err) => {
        let (status, message) = store_failure(&err);
        (status, message.to_string())
      }
      AppError::Manager(err) => {
        tracing::debug!(error = %err, "Request rejected");
        (StatusCode::BAD_REQUEST, err.to_string())
      }
      AppError::ValidationError(msg) => {
        tracing::warn!(validation_error = %msg, "Validation failed");
        (StatusCode::BAD_REQUEST, msg)
      }
      AppError::Unauthorized => (
        StatusCode::UNAUTHORIZED,
        "Invalid or missing API token".to_string(),
      ),
    };

    (status, Json(ErrorResponse::new(message))).into_response()
  }
}

impl From<ManagerError> for AppError {
  fn from(err: ManagerError) -> Self {
    AppError::Manager(err)
  }
}

impl From<StoreError> for AppError {
  fn from(err: StoreError) -> Self {
    AppError::Store(err)
  }
}

impl From<crate::validation::ValidationError> for AppError {
  fn from(err: crate::validation::ValidationError) -> Self {
    AppError::ValidationError(err.to_string())
  }
}

impl From<JsonRejection> for AppError {
  fn from(err: JsonRejection) -> Self {
    AppError::ValidationError(err.body_text())
  }
}

impl From<QueryRejection> for AppError {
  fn from(err: QueryRejection) -> Self {
    AppError::ValidationError(err.body_text())
  }
}
