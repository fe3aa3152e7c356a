//! LeetCode GraphQL client.

mod models;

pub use models::{Difficulty, QuestionDetail, Snapshot, SubmissionItem};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, REFERER};
use serde_json::json;
use tracing::debug;

use crate::error::SourceError;
use crate::source::SubmissionSource;

pub const LEETCODE_GQL_URL: &str = "https://leetcode.com/graphql/";

/// Number of submissions fetched per poll.
pub const DEFAULT_SNAPSHOT_DEPTH: u32 = 5;

const RECENT_AC_SUBMISSIONS_QUERY: &str = r#"
query recentAcSubmissions($username: String!, $limit: Int!) {
    recentAcSubmissionList(username: $username, limit: $limit) {
        id
        title
        titleSlug
        timestamp
    }
}"#;

const QUESTION_DATA_QUERY: &str = r#"
query questionData($titleSlug: String!) {
    question(titleSlug: $titleSlug) {
        title
        titleSlug
        difficulty
        stats
    }
}"#;

pub struct LeetCodeClient {
    client: Client,
    endpoint: String,
    snapshot_depth: u32,
}

impl LeetCodeClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            endpoint: LEETCODE_GQL_URL.to_string(),
            snapshot_depth: DEFAULT_SNAPSHOT_DEPTH,
        }
    }

    pub fn with_snapshot_depth(mut self, depth: u32) -> Self {
        self.snapshot_depth = depth.max(1);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn post_query(
        &self,
        referer: &str,
        body: serde_json::Value,
    ) -> Result<String, SourceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(REFERER, referer)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::http_status(status, &self.endpoint));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl SubmissionSource for LeetCodeClient {
    async fn fetch_recent_items(&self, account: &str) -> Result<Snapshot, SourceError> {
        debug!("Fetching recent submissions for {}", account);

        let body = json!({
            "query": RECENT_AC_SUBMISSIONS_QUERY,
            "variables": {
                "username": account,
                "limit": self.snapshot_depth,
            },
        });
        let referer = format!("https://leetcode.com/{}/", account);

        let text = self.post_query(&referer, body).await?;
        models::parse_recent_submissions(&text)
    }

    async fn fetch_item_detail(&self, title_slug: &str) -> Result<QuestionDetail, SourceError> {
        debug!("Fetching question detail for {}", title_slug);

        let body = json!({
            "query": QUESTION_DATA_QUERY,
            "variables": {
                "titleSlug": title_slug,
            },
        });
        let referer = format!("https://leetcode.com/problems/{}/", title_slug);

        let text = self.post_query(&referer, body).await?;
        models::parse_question_detail(&text)
    }
}
