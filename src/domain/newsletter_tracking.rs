use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Delivery and engagement of one newsletter issue for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NewsletterTracking {
    pub newsletter_id: Uuid,
    pub subscriber_id: Uuid,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened: bool,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked: bool,
    pub clicked_at: Option<DateTime<Utc>>,
}

impl NewsletterTracking {
    pub fn new(newsletter_id: Uuid, subscriber_id: Uuid) -> Self {
        Self {
            newsletter_id,
            subscriber_id,
            sent: false,
            sent_at: None,
            opened: false,
            opened_at: None,
            clicked: false,
            clicked_at: None,
        }
    }

    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.sent = true;
        self.sent_at.get_or_insert(now);
    }

    pub fn record_open(&mut self, now: DateTime<Utc>) {
        self.opened = true;
        self.opened_at.get_or_insert(now);
    }

    /// A click implies the email was opened, even when images were blocked.
    pub fn record_click(&mut self, now: DateTime<Utc>) {
        self.record_open(now);
        self.clicked = true;
        self.clicked_at.get_or_insert(now);
    }
}

/// Aggregated engagement numbers for a newsletter issue.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TrackingStats {
    pub recipients: usize,
    pub sent: usize,
    pub opened: usize,
    pub clicked: usize,
}

impl<'a> FromIterator<&'a NewsletterTracking> for TrackingStats {
    fn from_iter<I: IntoIterator<Item = &'a NewsletterTracking>>(rows: I) -> Self {
        rows.into_iter().fold(TrackingStats::default(), |mut stats, row| {
            stats.recipients += 1;
            stats.sent += usize::from(row.sent);
            stats.opened += usize::from(row.opened);
            stats.clicked += usize::from(row.clicked);
            stats
        })
    }
}
