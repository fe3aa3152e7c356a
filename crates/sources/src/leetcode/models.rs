//! LeetCode GraphQL response models.

use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// GraphQL envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
}

impl<T> GraphQlResponse<T> {
    pub(crate) fn into_data(self) -> Result<T, SourceError> {
        if let Some(first) = self.errors.first() {
            return Err(SourceError::malformed(format!(
                "graphql error: {}",
                first.message
            )));
        }
        self.data
            .ok_or_else(|| SourceError::malformed("graphql response without data"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecentAcSubmissionsData {
    pub recent_ac_submission_list: Option<Vec<SubmissionItem>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionData {
    pub question: Option<QuestionModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionModel {
    pub title: String,
    pub title_slug: String,
    pub difficulty: String,
    /// JSON document encoded as a string.
    pub stats: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionStats {
    ac_rate: String,
}

/// One accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionItem {
    /// Submission id, stable across polls.
    pub id: String,
    pub title: String,
    pub title_slug: String,
    /// Unix seconds; the API sends it as a string.
    #[serde(deserialize_with = "de_timestamp")]
    pub timestamp: i64,
}

impl SubmissionItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, title_slug: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            title_slug: title_slug.into(),
            timestamp: 0,
        }
    }

    /// Public URL of the problem.
    pub fn problem_url(&self) -> String {
        format!("https://leetcode.com/problems/{}/", self.title_slug)
    }
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Result of one poll: the most recent items, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    items: Vec<SubmissionItem>,
}

impl Snapshot {
    /// Build a snapshot from items ordered newest first.
    pub fn new(items: Vec<SubmissionItem>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn newest(&self) -> Option<&SubmissionItem> {
        self.items.first()
    }

    /// Items newest first.
    pub fn items(&self) -> &[SubmissionItem] {
        &self.items
    }
}

impl From<Vec<SubmissionItem>> for Snapshot {
    fn from(items: Vec<SubmissionItem>) -> Self {
        Self::new(items)
    }
}

/// Problem difficulty tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Other(String),
}

impl Difficulty {
    pub fn parse(s: &str) -> Self {
        match s {
            "Easy" => Self::Easy,
            "Medium" => Self::Medium,
            "Hard" => Self::Hard,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Easy => "\u{1f7e2}",   // 🟢
            Self::Medium => "\u{1f7e1}", // 🟡
            Self::Hard => "\u{1f534}",   // 🔴
            Self::Other(_) => "\u{26aa}", // ⚪
        }
    }
}

/// Enrichment metadata for one problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDetail {
    pub title: String,
    pub title_slug: String,
    pub difficulty: Difficulty,
    /// Acceptance ratio as reported by the site, e.g. `"49.1%"`.
    pub acceptance: String,
}

pub(crate) fn parse_recent_submissions(body: &str) -> Result<Snapshot, SourceError> {
    let response: GraphQlResponse<RecentAcSubmissionsData> = serde_json::from_str(body)?;
    let list = response
        .into_data()?
        .recent_ac_submission_list
        .ok_or_else(|| SourceError::malformed("recentAcSubmissionList is null"))?;
    Ok(Snapshot::new(list))
}

pub(crate) fn parse_question_detail(body: &str) -> Result<QuestionDetail, SourceError> {
    let response: GraphQlResponse<QuestionData> = serde_json::from_str(body)?;
    let question = response
        .into_data()?
        .question
        .ok_or_else(|| SourceError::malformed("question not found"))?;

    let stats: QuestionStats = serde_json::from_str(&question.stats)?;

    Ok(QuestionDetail {
        title: question.title,
        title_slug: question.title_slug,
        difficulty: Difficulty::parse(&question.difficulty),
        acceptance: stats.ac_rate,
    })
}
