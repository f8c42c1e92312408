use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use minijinja::context;
use thiserror::Error;
use tracing::{error, warn};

use crate::{users::StoreError, views};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("That username is already taken")]
    UsernameTaken,
    #[error("{0}")]
    Validation(String),
    #[error("external login failed: {0}")]
    OAuth(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::UsernameTaken => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::OAuth(_) => StatusCode::SEE_OTHER,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show in a page. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Something went wrong on our side. Please try again.".into(),
            AppError::OAuth(_) => "Sign-in with Google failed.".into(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(_) => AppError::UsernameTaken,
            StoreError::Backend(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::OAuth(reason) => {
                warn!(%reason, "oauth login failed");
                return Redirect::to("/login").into_response();
            }
            AppError::Internal(e) => error!(error = ?e, "request failed"),
            other => warn!(error = %other, "request rejected"),
        }

        let status = self.status();
        let message = self.public_message();
        match views::render(
            "error.html",
            context! { status => status.as_u16(), message => message },
        ) {
            Ok(page) => (status, page).into_response(),
            Err(_) => (status, message).into_response(),
        }
    }
}
