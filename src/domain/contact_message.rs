use actix_web::web;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_name::SubscriberName;

const MAX_MESSAGE_LENGTH: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContactMessageBody(String);

impl ContactMessageBody {
    pub fn parse(message: String) -> Result<ContactMessageBody, String> {
        let trimmed = message.trim();

        if trimmed.is_empty() {
            return Err("Contact message cannot be empty".to_string());
        }
        if trimmed.graphemes(true).count() > MAX_MESSAGE_LENGTH {
            return Err(format!(
                "Contact message is longer than {} characters",
                MAX_MESSAGE_LENGTH
            ));
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for ContactMessageBody {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Deserialize)]
pub struct ContactFormBody {
    pub name: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ContactMessage {
    pub id: Uuid,
    pub name: SubscriberName,
    pub email: SubscriberEmail,
    pub message: ContactMessageBody,
    pub created_at: DateTime<Utc>,
}

impl ContactMessage {
    pub fn parse(body: web::Json<ContactFormBody>, now: DateTime<Utc>) -> Result<ContactMessage, String> {
        let body = body.into_inner();

        Ok(Self {
            id: Uuid::new_v4(),
            name: SubscriberName::parse(body.name)?,
            email: SubscriberEmail::parse(body.email)?,
            message: ContactMessageBody::parse(body.message)?,
            created_at: now,
        })
    }
}
