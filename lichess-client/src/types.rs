//! Domain types exchanged with the Lichess Board API

use chess::{PieceColor, Variant};

/// The account the token belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Lowercase user id, used to tell which side we play
    pub id: String,
    pub username: String,
}

/// Which side to request when challenging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorChoice {
    White,
    Black,
    #[default]
    Random,
}

impl ColorChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            ColorChoice::White => "white",
            ColorChoice::Black => "black",
            ColorChoice::Random => "random",
        }
    }
}

impl std::str::FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "white" => Ok(ColorChoice::White),
            "black" => Ok(ColorChoice::Black),
            "random" => Ok(ColorChoice::Random),
            other => Err(format!("unknown color: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeControl {
    Realtime { limit_secs: u32, increment_secs: u32 },
    Correspondence { days: u32 },
    Unlimited,
}

/// Everything needed to open a challenge against one opponent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRequest {
    pub opponent: String,
    pub color: ColorChoice,
    pub variant: Variant,
    pub time_control: TimeControl,
    pub rated: bool,
    /// Start from this position instead of the variant's initial one
    pub fen: Option<String>,
}

impl ChallengeRequest {
    /// Form fields for `POST /api/challenge/{username}`.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("rated", self.rated.to_string()),
            ("color", self.color.as_str().to_string()),
            ("variant", self.variant.as_key().to_string()),
        ];
        match self.time_control {
            TimeControl::Realtime {
                limit_secs,
                increment_secs,
            } => {
                fields.push(("clock.limit", limit_secs.to_string()));
                fields.push(("clock.increment", increment_secs.to_string()));
            }
            TimeControl::Correspondence { days } => fields.push(("days", days.to_string())),
            TimeControl::Unlimited => {}
        }
        if let Some(fen) = &self.fen {
            fields.push(("fen", fen.clone()));
        }
        fields
    }
}

/// A game found for a challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInfo {
    pub game_id: String,
    /// The account's color, when the lookup could tell
    pub color: Option<PieceColor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameStatus {
    Ongoing,
    Aborted,
    Ended {
        status: String,
        winner: Option<PieceColor>,
    },
}

impl GameStatus {
    /// Map a Lichess status name to a status.
    pub fn from_lichess(status: &str, winner: Option<PieceColor>) -> Self {
        match status {
            "created" | "started" => GameStatus::Ongoing,
            "aborted" => GameStatus::Aborted,
            other => GameStatus::Ended {
                status: other.to_string(),
                winner,
            },
        }
    }

    pub fn is_over(&self) -> bool {
        !matches!(self, GameStatus::Ongoing)
    }

    /// UCI-style result text, e.g. `1-0 (mate)`.
    pub fn describe(&self) -> String {
        match self {
            GameStatus::Ongoing => "ongoing".to_string(),
            GameStatus::Aborted => "aborted".to_string(),
            GameStatus::Ended { status, winner } => {
                let score = match winner {
                    Some(PieceColor::White) => "1-0",
                    Some(PieceColor::Black) => "0-1",
                    None => "1/2-1/2",
                };
                format!("{} ({})", score, status)
            }
        }
    }
}

/// State of a remote game after one stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    pub game_id: String,
    /// Every move played on the server, in UCI notation
    pub moves: Vec<String>,
    pub turn: PieceColor,
    pub status: GameStatus,
    pub white_id: Option<String>,
    pub black_id: Option<String>,
}

impl GameSnapshot {
    /// The color `account_id` plays in this game, if either.
    pub fn color_of(&self, account_id: &str) -> Option<PieceColor> {
        let matches = |id: &Option<String>| {
            id.as_deref()
                .is_some_and(|id| id.eq_ignore_ascii_case(account_id))
        };
        if matches(&self.white_id) {
            Some(PieceColor::White)
        } else if matches(&self.black_id) {
            Some(PieceColor::Black)
        } else {
            None
        }
    }
}
