use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;

use crate::domain::subscriber::ConfirmationError;
use crate::domain::subscription_token::SubscriptionToken;
use crate::routes::error_chain_fmt;
use crate::store::{ConfirmationOutcome, Store};

#[derive(Deserialize, Debug)]
pub struct TokenParameters {
    pub token: Option<String>,
}

#[derive(thiserror::Error)]
pub enum ConfirmError {
    #[error("The request has no confirmation token.")]
    MissingToken,
    #[error("The confirmation token is unknown or was already used.")]
    UnknownToken,
    #[error("The confirmation token has expired.")]
    ExpiredToken,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for ConfirmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for ConfirmError {
    fn status_code(&self) -> StatusCode {
        match self {
            ConfirmError::MissingToken => StatusCode::BAD_REQUEST,
            ConfirmError::UnknownToken => StatusCode::UNAUTHORIZED,
            ConfirmError::ExpiredToken => StatusCode::GONE,
            ConfirmError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ConfirmationError> for ConfirmError {
    fn from(err: ConfirmationError) -> Self {
        match err {
            ConfirmationError::UnknownToken => ConfirmError::UnknownToken,
            ConfirmationError::Expired => ConfirmError::ExpiredToken,
        }
    }
}

#[tracing::instrument(name = "Confirm a pending subscriber", skip(parameters, store))]
pub async fn handle_confirm_subscription(
    parameters: web::Query<TokenParameters>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ConfirmError> {
    let raw_token = match parameters.into_inner().token {
        Some(token) if !token.trim().is_empty() => token,
        _ => return Err(ConfirmError::MissingToken),
    };
    // A malformed token can never match a stored one.
    let token = SubscriptionToken::parse(raw_token).map_err(|_| ConfirmError::UnknownToken)?;

    let outcome = store
        .confirm_subscriber(&token, Utc::now())
        .await
        .context("Failed to confirm the subscriber.")?;

    match outcome {
        ConfirmationOutcome::Confirmed(subscriber) => {
            tracing::info!(subscriber_id = %subscriber.id, "Subscriber confirmed");
            Ok(HttpResponse::Ok()
                .content_type("text/plain; charset=utf-8")
                .body("Your subscription is confirmed. Thank you!"))
        }
        ConfirmationOutcome::Rejected(err) => Err(err.into()),
    }
}
