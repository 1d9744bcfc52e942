use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

pub const MAX_REPORT_DESCRIPTION_LENGTH: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    Harassment,
    HateSpeech,
    Misinformation,
    OffTopic,
    Other,
}

impl ReportReason {
    pub const ALL: [ReportReason; 6] = [
        ReportReason::Spam,
        ReportReason::Harassment,
        ReportReason::HateSpeech,
        ReportReason::Misinformation,
        ReportReason::OffTopic,
        ReportReason::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportReason::Spam => "spam",
            ReportReason::Harassment => "harassment",
            ReportReason::HateSpeech => "hate_speech",
            ReportReason::Misinformation => "misinformation",
            ReportReason::OffTopic => "off_topic",
            ReportReason::Other => "other",
        }
    }
}

impl fmt::Display for ReportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ReportReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == normalized)
            .ok_or_else(|| format!("unknown report reason: {}", s.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewReport {
    #[validate(length(min = 1))]
    pub comment_id: String,
    #[validate(length(min = 1))]
    pub reporter_id: String,
    pub reason: ReportReason,
    #[validate(length(max = 500, message = "Report description cannot exceed 500 characters"))]
    pub description: Option<String>,
}

/// A stored moderation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentReport {
    pub id: String,
    pub comment_id: String,
    pub reporter_id: String,
    pub reason: ReportReason,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}
