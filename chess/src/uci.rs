//! UCI long-algebraic move notation

use cozy_chess::{File, Move, Piece, Rank, Square};

use crate::position::BoardError;

/// Parse UCI move format (e2e4, e7e8q)
pub fn parse_uci_move(s: &str) -> Result<Move, BoardError> {
    if !s.is_ascii() || !(4..=5).contains(&s.len()) {
        return Err(BoardError::InvalidMove(s.to_string()));
    }

    let from = parse_square(&s[0..2]).ok_or_else(|| BoardError::InvalidMove(s.to_string()))?;
    let to = parse_square(&s[2..4]).ok_or_else(|| BoardError::InvalidMove(s.to_string()))?;

    let promotion = match s.get(4..5) {
        None => None,
        Some("q") => Some(Piece::Queen),
        Some("r") => Some(Piece::Rook),
        Some("b") => Some(Piece::Bishop),
        Some("n") => Some(Piece::Knight),
        // Antichess allows promoting to a king.
        Some("k") => Some(Piece::King),
        Some(_) => return Err(BoardError::InvalidMove(s.to_string())),
    };

    Ok(Move {
        from,
        to,
        promotion,
    })
}

fn parse_square(s: &str) -> Option<Square> {
    let mut chars = s.chars();
    let file = match chars.next()? {
        'a' => File::A,
        'b' => File::B,
        'c' => File::C,
        'd' => File::D,
        'e' => File::E,
        'f' => File::F,
        'g' => File::G,
        'h' => File::H,
        _ => return None,
    };
    let rank = match chars.next()? {
        '1' => Rank::First,
        '2' => Rank::Second,
        '3' => Rank::Third,
        '4' => Rank::Fourth,
        '5' => Rank::Fifth,
        '6' => Rank::Sixth,
        '7' => Rank::Seventh,
        '8' => Rank::Eighth,
        _ => return None,
    };
    Some(Square::new(file, rank))
}

/// Format a move in UCI notation (e.g., "e2e4", "e7e8q")
pub fn format_uci_move(mv: Move) -> String {
    let mut s = format!("{}{}", mv.from, mv.to);
    if let Some(promo) = mv.promotion {
        s.push(match promo {
            Piece::Queen => 'q',
            Piece::Rook => 'r',
            Piece::Bishop => 'b',
            Piece::Knight => 'n',
            Piece::King => 'k',
            Piece::Pawn => 'p',
        });
    }
    s
}

/// Convert UCI castling notation to cozy_chess notation
///
/// UCI uses standard notation (king moves 2 squares): e1g1, e1c1, e8g8, e8c8
/// cozy_chess uses king-to-rook notation: e1h1, e1a1, e8h8, e8a8
///
/// The conversion only happens when the king-to-rook move is legal, so plain
/// king moves that happen to start on e1/e8 pass through untouched.
pub fn convert_uci_castling_to_cozy(mv: Move, legal_moves: &[Move]) -> Move {
    let is_back_rank = matches!(mv.from.rank(), Rank::First | Rank::Eighth);
    let is_e_file = matches!(mv.from.file(), File::E);
    let is_g_or_c_file = matches!(mv.to.file(), File::G | File::C);

    if !(is_back_rank && is_e_file && is_g_or_c_file && mv.promotion.is_none())
        || mv.from.rank() != mv.to.rank()
    {
        return mv;
    }

    let rook_file = match mv.to.file() {
        File::G => File::H,
        _ => File::A,
    };
    let converted = Move {
        from: mv.from,
        to: Square::new(rook_file, mv.from.rank()),
        promotion: None,
    };

    if legal_moves.contains(&converted) {
        converted
    } else {
        mv
    }
}
