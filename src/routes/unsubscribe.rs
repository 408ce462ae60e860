use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use anyhow::Context;
use chrono::Utc;

use crate::domain::subscription_token::SubscriptionToken;
use crate::routes::error_chain_fmt;
use crate::routes::TokenParameters;
use crate::store::Store;

#[derive(thiserror::Error)]
pub enum UnsubscribeError {
    #[error("The request has no unsubscribe token.")]
    MissingToken,
    #[error("The unsubscribe token is not associated with any subscriber.")]
    UnknownToken,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for UnsubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for UnsubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            UnsubscribeError::MissingToken => StatusCode::BAD_REQUEST,
            UnsubscribeError::UnknownToken => StatusCode::UNAUTHORIZED,
            UnsubscribeError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Follows the link from a newsletter footer. Using it twice is fine.
#[tracing::instrument(name = "Unsubscribe a subscriber", skip(parameters, store))]
pub async fn handle_unsubscribe(
    parameters: web::Query<TokenParameters>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, UnsubscribeError> {
    let raw_token = match parameters.into_inner().token {
        Some(token) if !token.trim().is_empty() => token,
        _ => return Err(UnsubscribeError::MissingToken),
    };
    let token = SubscriptionToken::parse(raw_token).map_err(|_| UnsubscribeError::UnknownToken)?;

    let subscriber = store
        .unsubscribe_by_token(&token, Utc::now())
        .await
        .context("Failed to unsubscribe the subscriber.")?
        .ok_or(UnsubscribeError::UnknownToken)?;

    tracing::info!(subscriber_id = %subscriber.id, "Subscriber unsubscribed");

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("You have been unsubscribed."))
}
