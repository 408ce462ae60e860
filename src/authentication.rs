use actix_web::dev::Payload;
use actix_web::http::header::{self, HeaderMap};
use actix_web::http::StatusCode;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use anyhow::{anyhow, Context};
use secrecy::{ExposeSecret, Secret};
use std::future::{ready, Ready};

use crate::routes::error_chain_fmt;

/// Credentials the admin endpoints are checked against.
pub struct AdminCredentials {
    pub username: String,
    pub password: Secret<String>,
}

struct BasicCredentials {
    username: String,
    password: Secret<String>,
}

/// Extractor for admin handlers. Resolves only when the request carries
/// `Basic` credentials matching [`AdminCredentials`].
#[derive(Debug)]
pub struct AdminUser {
    pub username: String,
}

#[derive(thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials.")]
    InvalidCredentials(#[source] anyhow::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            AuthError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());

        if let AuthError::InvalidCredentials(_) = self {
            response.insert_header((header::WWW_AUTHENTICATE, r#"Basic realm="admin""#));
        }

        response.finish()
    }
}

impl FromRequest for AdminUser {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(request: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(request))
    }
}

fn authenticate(request: &HttpRequest) -> Result<AdminUser, AuthError> {
    let expected = request
        .app_data::<web::Data<AdminCredentials>>()
        .context("Admin credentials are not registered in the application state.")?;
    let candidate = basic_authentication(request.headers()).map_err(AuthError::InvalidCredentials)?;

    if candidate.username != expected.username
        || candidate.password.expose_secret() != expected.password.expose_secret()
    {
        tracing::warn!(username = %candidate.username, "Rejected admin credentials");
        return Err(AuthError::InvalidCredentials(anyhow!(
            "Unknown username or wrong password."
        )));
    }

    Ok(AdminUser {
        username: candidate.username,
    })
}

fn basic_authentication(headers: &HeaderMap) -> Result<BasicCredentials, anyhow::Error> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .context("The 'Authorization' header was missing.")?
        .to_str()
        .context("The 'Authorization' header was not a valid UTF8 string.")?;

    let base64encoded_segment = header_value
        .strip_prefix("Basic ")
        .context("The authorization scheme was not 'Basic'.")?;

    let decoded_bytes = base64::decode_config(base64encoded_segment, base64::STANDARD)
        .context("Failed to base64-decode 'Basic' credentials.")?;

    let decoded_credentials = String::from_utf8(decoded_bytes)
        .context("The decoded credential string is not valid UTF8.")?;

    let (username, password) = decoded_credentials
        .split_once(':')
        .ok_or_else(|| anyhow!("A password must be provided in 'Basic' auth."))?;

    Ok(BasicCredentials {
        username: username.to_string(),
        password: Secret::new(password.to_string()),
    })
}
