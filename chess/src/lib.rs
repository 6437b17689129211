//! Board state tracking for the bridge.
//!
//! Wraps cozy-chess with the pieces the bridge needs: rebuilding a position
//! from a UCI `position` command, parsing long-algebraic moves, and knowing
//! which variants we can actually validate.

pub mod fen;
pub mod position;
pub mod types;
pub mod uci;

pub use fen::{FenError, STARTPOS_FEN};
pub use position::{BoardError, BoardPosition, StartPosition};
pub use types::{PieceColor, Variant};
pub use uci::{convert_uci_castling_to_cozy, format_uci_move, parse_uci_move};
