use chess::BoardPosition;

use crate::options::Options;

/// Where the session is in the remote game lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// `go` arrived before a token or opponent was configured
    AwaitingOpponentConfig,
    ChallengePending,
    GameActive,
    GameEnded,
    Stopping,
    Terminated,
}

impl Phase {
    /// Options can only change while no game is being set up or played.
    pub fn accepts_options(self) -> bool {
        matches!(self, Phase::Idle | Phase::AwaitingOpponentConfig)
    }

    /// A `go` here starts a new game lifecycle.
    pub fn can_start_game(self) -> bool {
        matches!(
            self,
            Phase::Idle | Phase::GameEnded | Phase::AwaitingOpponentConfig
        )
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub phase: Phase,
    pub options: Options,
    pub current_game_id: Option<String>,
    /// Position from the latest `position` command
    pub board_position: BoardPosition,
    /// Latest remote move list, counted from the GUI's start position
    pub remote_moves: Vec<String>,
    /// A `go` is waiting for its `bestmove`
    pub awaiting_bestmove: bool,
    /// A `go` arrived while the previous game was stopping; the worker
    /// starts it once the stop is acknowledged
    pub deferred_go: bool,
    /// Echo worker progress as `info string`
    pub debug: bool,
}

impl Session {
    pub fn new(options: Options) -> Self {
        let board_position = BoardPosition::new(options.variant);
        Self {
            phase: Phase::Idle,
            options,
            current_game_id: None,
            board_position,
            remote_moves: Vec::new(),
            awaiting_bestmove: false,
            deferred_go: false,
            debug: false,
        }
    }

    /// Forget the current game and go back to the initial position.
    pub fn reset_game(&mut self) {
        self.current_game_id = None;
        self.remote_moves.clear();
        self.awaiting_bestmove = false;
        self.deferred_go = false;
        self.board_position = BoardPosition::new(self.options.variant);
    }

    /// Acknowledge a cancellation: back to Idle unless `quit` already moved
    /// us to Terminated.
    pub fn settle_after_cancel(&mut self) {
        self.current_game_id = None;
        self.remote_moves.clear();
        self.awaiting_bestmove = false;
        if self.phase != Phase::Terminated {
            self.phase = Phase::Idle;
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Options::default())
    }
}
