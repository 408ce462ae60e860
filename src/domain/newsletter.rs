use chrono::{DateTime, Utc};
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

const MAX_SUBJECT_LENGTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsletterStatus {
    Draft,
    Scheduled,
    Sent,
}

impl NewsletterStatus {
    pub fn is_sent(&self) -> bool {
        matches!(self, NewsletterStatus::Sent)
    }

    pub fn parse(status: String) -> Result<NewsletterStatus, String> {
        match status.as_str() {
            "draft" => Ok(NewsletterStatus::Draft),
            "scheduled" => Ok(NewsletterStatus::Scheduled),
            "sent" => Ok(NewsletterStatus::Sent),
            _ => Err(format!("{} is not a valid newsletter status", status)),
        }
    }
}

impl AsRef<str> for NewsletterStatus {
    fn as_ref(&self) -> &str {
        match self {
            NewsletterStatus::Draft => "draft",
            NewsletterStatus::Scheduled => "scheduled",
            NewsletterStatus::Sent => "sent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NewsletterSubject(String);

impl NewsletterSubject {
    pub fn parse(subject: String) -> Result<NewsletterSubject, String> {
        let trimmed = subject.trim();

        if trimmed.is_empty() || trimmed.graphemes(true).count() > MAX_SUBJECT_LENGTH {
            return Err(format!("{} is not a valid newsletter subject", subject));
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for NewsletterSubject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// HTML body of a newsletter issue.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NewsletterContent(String);

impl NewsletterContent {
    pub fn parse(content: String) -> Result<NewsletterContent, String> {
        if content.trim().is_empty() {
            return Err("Newsletter content cannot be empty".to_string());
        }

        Ok(Self(content))
    }
}

impl AsRef<str> for NewsletterContent {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validated admin input for creating or editing a newsletter.
#[derive(Debug)]
pub struct NewsletterDraft {
    pub subject: NewsletterSubject,
    pub content: NewsletterContent,
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl NewsletterDraft {
    pub fn parse(
        subject: String,
        content: String,
        scheduled_for: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<NewsletterDraft, String> {
        let subject = NewsletterSubject::parse(subject)?;
        let content = NewsletterContent::parse(content)?;

        if let Some(scheduled_for) = scheduled_for {
            if scheduled_for <= now {
                return Err(format!("{} is not in the future", scheduled_for));
            }
        }

        Ok(Self {
            subject,
            content,
            scheduled_for,
        })
    }

    fn status(&self) -> NewsletterStatus {
        if self.scheduled_for.is_some() {
            NewsletterStatus::Scheduled
        } else {
            NewsletterStatus::Draft
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Newsletter {
    pub id: Uuid,
    pub subject: NewsletterSubject,
    pub content: NewsletterContent,
    pub status: NewsletterStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("The newsletter has already been sent.")]
pub struct AlreadySentError;

impl Newsletter {
    pub fn create(draft: NewsletterDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: draft.status(),
            subject: draft.subject,
            content: draft.content,
            scheduled_for: draft.scheduled_for,
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn revise(&mut self, draft: NewsletterDraft, now: DateTime<Utc>) -> Result<(), AlreadySentError> {
        if self.status.is_sent() {
            return Err(AlreadySentError);
        }

        self.status = draft.status();
        self.subject = draft.subject;
        self.content = draft.content;
        self.scheduled_for = draft.scheduled_for;
        self.updated_at = now;

        Ok(())
    }

    /// Moves a draft or scheduled issue to sent. Fails when it already was.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) -> Result<(), AlreadySentError> {
        if self.status.is_sent() {
            return Err(AlreadySentError);
        }

        self.status = NewsletterStatus::Sent;
        self.sent_at = Some(now);
        self.updated_at = now;

        Ok(())
    }
}
