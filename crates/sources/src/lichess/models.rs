//! Lichess REST response models.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SourceError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserStatus {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub playing_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GameExport {
    pub status: String,
    pub players: GamePlayers,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GamePlayers {
    pub white: GamePlayer,
    pub black: GamePlayer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GamePlayer {
    #[serde(default)]
    pub user: Option<GameUser>,
    #[serde(default)]
    pub rating: Option<u32>,
    #[serde(default)]
    pub rating_diff: Option<i32>,
    #[serde(default)]
    pub ai_level: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GameUser {
    pub name: String,
}

/// One side of a finished game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub rating: Option<u32>,
    /// Absent for aborted or unrated games.
    pub rating_diff: Option<i32>,
}

impl Participant {
    pub fn new(name: impl Into<String>, rating: Option<u32>, rating_diff: Option<i32>) -> Self {
        Self {
            name: name.into(),
            rating,
            rating_diff,
        }
    }
}

impl From<GamePlayer> for Participant {
    fn from(player: GamePlayer) -> Self {
        let name = match (player.user, player.ai_level) {
            (Some(user), _) => user.name,
            (None, Some(level)) => format!("AI level {}", level),
            (None, None) => "Anonymous".to_string(),
        };
        Self {
            name,
            rating: player.rating,
            rating_diff: player.rating_diff,
        }
    }
}

/// Terminal state of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedGame {
    /// Lichess status string (`mate`, `resign`, `aborted`, `draw`, ...).
    pub status: String,
    pub white: Participant,
    pub black: Participant,
}

/// Observed state of one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityResult {
    InProgress,
    Finished(FinishedGame),
}

/// Statuses of a game that has not concluded yet.
const IN_PROGRESS_STATUSES: [&str; 2] = ["created", "started"];

pub(crate) fn parse_user_status(
    body: &str,
    requested: &[String],
) -> Result<HashMap<String, Option<String>>, SourceError> {
    let statuses: Vec<UserStatus> = serde_json::from_str(body)?;

    let mut result = HashMap::with_capacity(statuses.len());
    for status in statuses {
        let Some(name) = status.name.filter(|n| !n.is_empty()) else {
            continue;
        };
        // Report under the spelling the caller asked for.
        let key = requested
            .iter()
            .find(|r| r.eq_ignore_ascii_case(&name))
            .cloned()
            .unwrap_or(name);
        result.insert(key, status.playing_id);
    }

    Ok(result)
}

pub(crate) fn parse_game_export(body: &str) -> Result<ActivityResult, SourceError> {
    let game: GameExport = serde_json::from_str(body)?;

    if IN_PROGRESS_STATUSES.contains(&game.status.as_str()) {
        return Ok(ActivityResult::InProgress);
    }

    Ok(ActivityResult::Finished(FinishedGame {
        status: game.status,
        white: game.players.white.into(),
        black: game.players.black.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_status() {
        let body = r#"[
            {"id": "magnus", "name": "Magnus", "online": true, "playing": true, "playingId": "g123"},
            {"id": "hikaru", "name": "Hikaru", "online": true}
        ]"#;
        let requested = vec!["magnus".to_string(), "Hikaru".to_string(), "ghost".to_string()];

        let result = parse_user_status(body, &requested).unwrap();
        assert_eq!(result.get("magnus"), Some(&Some("g123".to_string())));
        assert_eq!(result.get("Hikaru"), Some(&None));
        assert!(!result.contains_key("ghost"));
    }

    #[test]
    fn test_parse_user_status_skips_nameless_entries() {
        let body = r#"[{"id": "x", "name": ""}, {"id": "y"}]"#;
        let result = parse_user_status(body, &["x".to_string()]).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_parse_game_in_progress() {
        let body = r#"{"id": "g123", "status": "started", "players": {"white": {"user": {"name": "A"}, "rating": 1500}, "black": {"user": {"name": "B"}, "rating": 1490}}}"#;
        assert_eq!(parse_game_export(body).unwrap(), ActivityResult::InProgress);
    }

    #[test]
    fn test_parse_game_finished() {
        let body = r#"{
            "id": "g123",
            "status": "mate",
            "winner": "white",
            "players": {
                "white": {"user": {"name": "Magnus"}, "rating": 2900, "ratingDiff": 8},
                "black": {"user": {"name": "Hikaru"}, "rating": 2880, "ratingDiff": -8}
            }
        }"#;

        let ActivityResult::Finished(game) = parse_game_export(body).unwrap() else {
            panic!("expected finished game");
        };
        assert_eq!(game.status, "mate");
        assert_eq!(game.white, Participant::new("Magnus", Some(2900), Some(8)));
        assert_eq!(game.black, Participant::new("Hikaru", Some(2880), Some(-8)));
    }

    #[test]
    fn test_parse_game_aborted_against_ai() {
        let body = r#"{
            "status": "aborted",
            "players": {
                "white": {"user": {"name": "Magnus"}, "rating": 2900},
                "black": {"aiLevel": 8}
            }
        }"#;

        let ActivityResult::Finished(game) = parse_game_export(body).unwrap() else {
            panic!("expected finished game");
        };
        assert_eq!(game.white.rating_diff, None);
        assert_eq!(game.black.name, "AI level 8");
        assert_eq!(game.black.rating, None);
    }

    #[test]
    fn test_parse_game_missing_players_is_malformed() {
        let err = parse_game_export(r#"{"status": "mate"}"#).unwrap_err();
        assert!(err.is_malformed());
    }
}
