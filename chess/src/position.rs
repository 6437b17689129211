use cozy_chess::{Board, GameStatus, Move};

use crate::fen::{self, FenError};
use crate::types::{PieceColor, Variant};
use crate::uci::{convert_uci_castling_to_cozy, parse_uci_move};

/// Starting position of the game
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPosition {
    Standard,
    Fen(String),
}

/// The position the GUI last told us about: a start position plus the
/// moves played from it.
///
/// The move list is the source of truth. The cozy-chess board is only a
/// replay of it, and is absent for variants whose rules cozy-chess does not
/// know; for those we track the move text and turn parity only.
#[derive(Debug, Clone)]
pub struct BoardPosition {
    variant: Variant,
    start: StartPosition,
    start_side: PieceColor,
    moves: Vec<String>,
    board: Option<Board>,
}

impl BoardPosition {
    /// The initial position for a variant.
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            start: StartPosition::Standard,
            start_side: PieceColor::White,
            moves: Vec::new(),
            board: variant.validates_moves().then(Board::default),
        }
    }

    /// Rebuild a position from a start position and a move list, as sent in
    /// a UCI `position` command.
    pub fn from_uci<S: AsRef<str>>(
        start: StartPosition,
        moves: &[S],
        variant: Variant,
    ) -> Result<Self, BoardError> {
        let (board, start_side) = match &start {
            StartPosition::Standard => (
                variant.validates_moves().then(Board::default),
                PieceColor::White,
            ),
            StartPosition::Fen(fen) => {
                if variant.validates_moves() {
                    let board = fen::parse_fen(fen, variant.is_chess960())?;
                    let side = PieceColor::from(board.side_to_move());
                    (Some(board), side)
                } else {
                    (None, fen::side_to_move(fen)?)
                }
            }
        };

        let mut position = Self {
            variant,
            start,
            start_side,
            moves: Vec::with_capacity(moves.len()),
            board,
        };
        for mv in moves {
            position.push_uci(mv.as_ref())?;
        }
        Ok(position)
    }

    /// Apply one move in UCI long-algebraic notation.
    ///
    /// On error the position is left unchanged.
    pub fn push_uci(&mut self, mv: &str) -> Result<(), BoardError> {
        match self.board.as_mut() {
            Some(board) => {
                if board.status() != GameStatus::Ongoing {
                    return Err(BoardError::GameOver(mv.to_string()));
                }
                let parsed = parse_uci_move(mv)?;
                let parsed = if self.variant.is_chess960() {
                    parsed
                } else {
                    convert_uci_castling_to_cozy(parsed, &legal_moves(board))
                };
                board
                    .try_play(parsed)
                    .map_err(|_| BoardError::IllegalMove(mv.to_string()))?;
            }
            None => {
                if parse_uci_move(mv).is_err() && !is_drop(mv) {
                    return Err(BoardError::InvalidMove(mv.to_string()));
                }
            }
        }
        self.moves.push(mv.to_string());
        Ok(())
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn start(&self) -> &StartPosition {
        &self.start
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn side_to_move(&self) -> PieceColor {
        match &self.board {
            Some(board) => board.side_to_move().into(),
            None if self.moves.len() % 2 == 0 => self.start_side,
            None => self.start_side.opposite(),
        }
    }

    /// Current FEN, when the variant is tracked with full rules.
    pub fn fen(&self) -> Option<String> {
        self.board.as_ref().map(fen::format_fen)
    }

    /// True when a tracked board has reached mate or a draw. Untracked
    /// variants are never considered over.
    pub fn is_game_over(&self) -> bool {
        self.board
            .as_ref()
            .is_some_and(|board| board.status() != GameStatus::Ongoing)
    }

    /// True for the standard start position with no moves played.
    pub fn is_initial(&self) -> bool {
        self.start == StartPosition::Standard && self.moves.is_empty()
    }

    /// The moves this position has beyond `prefix`, or None when `prefix` is
    /// not a prefix of our move list.
    pub fn moves_after(&self, prefix: &[String]) -> Option<&[String]> {
        self.moves.strip_prefix(prefix)
    }
}

impl PartialEq for BoardPosition {
    fn eq(&self, other: &Self) -> bool {
        self.variant == other.variant && self.start == other.start && self.moves == other.moves
    }
}

impl Eq for BoardPosition {}

impl Default for BoardPosition {
    fn default() -> Self {
        Self::new(Variant::Standard)
    }
}

fn legal_moves(board: &Board) -> Vec<Move> {
    let mut moves = Vec::new();
    board.generate_moves(|mvs| {
        moves.extend(mvs);
        false
    });
    moves
}

/// Crazyhouse drop notation, e.g. `P@e4`.
fn is_drop(mv: &str) -> bool {
    let bytes = mv.as_bytes();
    bytes.len() == 4
        && matches!(bytes[0], b'P' | b'N' | b'B' | b'R' | b'Q')
        && bytes[1] == b'@'
        && (b'a'..=b'h').contains(&bytes[2])
        && (b'1'..=b'8').contains(&bytes[3])
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("Invalid move: {0}")]
    InvalidMove(String),
    #[error("Illegal move: {0}")]
    IllegalMove(String),
    #[error("Move after game end: {0}")]
    GameOver(String),
    #[error("FEN parse error: {0}")]
    Fen(#[from] FenError),
}
