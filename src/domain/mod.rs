pub mod contact_message;
pub mod new_subscriber;
pub mod newsletter;
pub mod newsletter_tracking;
pub mod subscriber;
pub mod subscriber_email;
pub mod subscriber_name;
pub mod subscriber_status;
pub mod subscription_token;
