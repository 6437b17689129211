use std::fmt;

use lichess_client::ChallengeRequest;

/// A unit of remote work handed from the dispatcher to the worker.
/// Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    StartGame(StartGame),
    /// The GUI played `mv`; send it once it is the account's turn
    SendMove { game_id: String, mv: String },
    /// Leave the game, resigning or aborting as the server allows
    Abort { game_id: String },
    /// A `go` with no new GUI move; re-check the latest snapshot
    Resync { game_id: String },
}

#[derive(Clone, PartialEq, Eq)]
pub struct StartGame {
    pub request: ChallengeRequest,
    pub token: String,
    /// GUI moves already played when the game was requested. The remote
    /// game starts after them.
    pub base_moves: Vec<String>,
}

impl fmt::Debug for StartGame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartGame")
            .field("request", &self.request)
            .field("token", &"<redacted>")
            .field("base_moves", &self.base_moves)
            .finish()
    }
}
