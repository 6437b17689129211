use cozy_chess::Board;

use crate::types::PieceColor;

/// FEN of the standard starting position.
pub const STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Parse a FEN string into a Board.
///
/// `shredder` selects Shredder-FEN castling rights (file letters), which
/// Chess960 GUIs send.
pub fn parse_fen(fen: &str, shredder: bool) -> Result<Board, FenError> {
    if fen.split_whitespace().next().is_none() {
        return Err(FenError::InvalidFormat);
    }

    Board::from_fen(fen, shredder).map_err(|_| FenError::InvalidFormat)
}

/// Format a Board as a FEN string
pub fn format_fen(board: &Board) -> String {
    board.to_string()
}

/// Read the side to move out of a FEN without validating the rest.
///
/// Used for variants whose positions cozy-chess cannot represent
/// (crazyhouse pockets, horde pawn counts, ...).
pub fn side_to_move(fen: &str) -> Result<PieceColor, FenError> {
    match fen.split_whitespace().nth(1) {
        Some("w") => Ok(PieceColor::White),
        Some("b") => Ok(PieceColor::Black),
        Some(_) => Err(FenError::InvalidSideToMove),
        None => Err(FenError::InvalidFormat),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenError {
    #[error("Invalid FEN format")]
    InvalidFormat,
    #[error("Invalid side to move")]
    InvalidSideToMove,
}
