//! Lichess REST client.

mod models;

pub use models::{ActivityResult, FinishedGame, Participant};

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use tracing::debug;

use crate::error::SourceError;
use crate::source::GameSource;

pub const LICHESS_BASE_URL: &str = "https://lichess.org";

pub struct LichessClient {
    client: Client,
    base_url: String,
}

impl LichessClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: LICHESS_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Public URL of a game.
    pub fn game_url(game_id: &str) -> String {
        format!("{}/{}", LICHESS_BASE_URL, game_id)
    }

    async fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
        accept_json: bool,
    ) -> Result<String, SourceError> {
        let mut request = self.client.get(url).query(query);
        if accept_json {
            request = request.header(ACCEPT, "application/json");
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::http_status(status, url));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl GameSource for LichessClient {
    async fn fetch_entity_status(
        &self,
        accounts: &[String],
    ) -> Result<HashMap<String, Option<String>>, SourceError> {
        if accounts.is_empty() {
            return Ok(HashMap::new());
        }

        debug!("Fetching lichess status for {:?}", accounts);

        let url = format!("{}/api/users/status", self.base_url);
        let ids = accounts.join(",");
        let text = self
            .get_text(&url, &[("ids", ids.as_str()), ("withGameIds", "true")], false)
            .await?;

        models::parse_user_status(&text, accounts)
    }

    async fn fetch_activity_detail(&self, game_id: &str) -> Result<ActivityResult, SourceError> {
        debug!("Fetching lichess game {}", game_id);

        let url = format!("{}/game/export/{}", self.base_url, game_id);
        let text = self
            .get_text(&url, &[("pgnInJson", "true"), ("moves", "false")], true)
            .await?;

        models::parse_game_export(&text)
    }
}
