use actix_web::web;
use serde::Deserialize;

use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_name::SubscriberName;

#[derive(Clone)]
pub struct NewSubscriber {
    pub email: SubscriberEmail,
    pub name: Option<SubscriberName>,
}

#[derive(Deserialize)]
pub struct NewSubscriberBody {
    pub email: String,
    pub name: Option<String>,
}

impl TryFrom<web::Json<NewSubscriberBody>> for NewSubscriber {
    type Error = String;

    fn try_from(body: web::Json<NewSubscriberBody>) -> Result<Self, Self::Error> {
        let body = body.into_inner();
        let email = SubscriberEmail::parse(body.email)?;
        let name = SubscriberName::parse_optional(body.name)?;

        Ok(NewSubscriber { email, name })
    }
}
