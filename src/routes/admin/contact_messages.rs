use actix_web::{web, HttpResponse};
use anyhow::Context;

use super::AdminError;
use crate::authentication::AdminUser;
use crate::store::Store;

#[tracing::instrument(name = "Admin: list contact messages", skip(store))]
pub async fn admin_list_contact_messages(
    admin: AdminUser,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AdminError> {
    let messages = store
        .list_contact_messages()
        .await
        .context("Failed to list the contact messages.")?;

    Ok(HttpResponse::Ok().json(messages))
}
