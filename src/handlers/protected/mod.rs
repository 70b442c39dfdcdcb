// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Route Prefix: /api/*
// Every handler reads the caller from the `AuthUser` extension and hands the id
// to the workflow engine as an explicit argument.
pub mod notifications;
pub mod property;

use axum::extract::{rejection::PathRejection, Path};

use crate::error::ApiError;

/// Unwrap a path extraction, reporting malformed ids as 400 in the API envelope
pub(crate) fn path_params<T>(path: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    path.map(|Path(params)| params)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}
