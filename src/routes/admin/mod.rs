//! Back-office endpoints. Every handler takes an [`AdminUser`] so the
//! request is rejected before any work when the credentials are wrong.
//!
//! [`AdminUser`]: crate::authentication::AdminUser

mod contact_messages;
mod newsletters;
mod subscribers;

pub use contact_messages::*;
pub use newsletters::*;
pub use subscribers::*;

use actix_web::http::StatusCode;
use actix_web::ResponseError;

use crate::routes::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum AdminError {
    #[error("{0}")]
    ValidationError(String),
    #[error("{0} was not found.")]
    NotFound(&'static str),
    #[error("The newsletter has already been sent.")]
    AlreadySent,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for AdminError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for AdminError {
    fn status_code(&self) -> StatusCode {
        match self {
            AdminError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::AlreadySent => StatusCode::CONFLICT,
            AdminError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
