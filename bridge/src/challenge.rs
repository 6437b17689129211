//! Turning the GUI's position and the options into a challenge

use chess::{PieceColor, StartPosition, Variant};
use lichess_client::{ChallengeRequest, ColorChoice};

use crate::cancel::CancelSignal;
use crate::error::BridgeError;
use crate::output::OutputHandle;
use crate::session::{Phase, Session};
use crate::work::StartGame;

/// Check that a game can start and move the session to ChallengePending.
///
/// Returns the work for the worker, or `None` after telling the GUI why no
/// game was started.
pub(crate) fn begin_game(
    session: &mut Session,
    cancel: &CancelSignal,
    out: &OutputHandle,
) -> Option<StartGame> {
    if let Some(missing) = session.options.missing_for_challenge() {
        tracing::warn!("Cannot start a game: {} is not set", missing);
        session.phase = Phase::AwaitingOpponentConfig;
        out.info(format!("set the {} option to start a game", missing));
        return None;
    }
    if session.board_position.is_game_over() {
        tracing::warn!("Cannot start a game from a finished position");
        out.info("ERROR: the position is already decided");
        return None;
    }

    let start = match challenge_for(session) {
        Ok(start) => start,
        Err(e) => {
            tracing::warn!("Cannot start a game: {}", e);
            out.info(format!("ERROR: {}", e));
            return None;
        }
    };
    if session.options.rated && !start.request.rated {
        tracing::warn!("Rated is ignored for a game from a set-up position");
        out.info("games from a set-up position are played casual");
    }

    session.phase = Phase::ChallengePending;
    session.current_game_id = None;
    session.remote_moves.clear();
    session.awaiting_bestmove = true;
    session.deferred_go = false;
    cancel.reset();

    let opponent = &start.request.opponent;
    tracing::info!(opponent = %opponent, "Starting game");
    out.info(format!("challenging {}", opponent));
    Some(start)
}

/// Build the challenge for the GUI's current position.
///
/// The engine moves for the side to move, so the account takes the other
/// side. The remote game starts where the GUI's game started, in the
/// configured variant; a single GUI move already on the board is the
/// account's opening move and is sent once the game exists. Lichess cannot
/// replay a longer line, so one is played on from its current FEN and its
/// moves become the base of the remote move list.
pub(crate) fn challenge_for(session: &Session) -> Result<StartGame, BridgeError> {
    let options = &session.options;
    let board = &session.board_position;
    let account_side = board.side_to_move().opposite();

    let color = match (options.play_as, account_side) {
        (ColorChoice::Random, PieceColor::White) => ColorChoice::White,
        (ColorChoice::Random, PieceColor::Black) => ColorChoice::Black,
        (chosen, side) => {
            if chosen.as_str() != side.as_str() {
                tracing::warn!(
                    "PlayAs is {} but the GUI expects the engine to play {}",
                    chosen.as_str(),
                    side.opposite()
                );
            }
            chosen
        }
    };

    let (fen, base_moves) = match (board.start(), board.moves()) {
        (StartPosition::Standard, [] | [_]) => (None, Vec::new()),
        (StartPosition::Fen(fen), [] | [_]) => (Some(fen.clone()), Vec::new()),
        (_, moves) => match board.fen() {
            Some(fen) => (Some(fen), moves.to_vec()),
            None => {
                return Err(BridgeError::Config(format!(
                    "cannot start a {} game from the middle of a move list",
                    options.variant
                )))
            }
        },
    };

    let variant = match (options.variant, &fen) {
        (Variant::Standard, Some(_)) => Variant::FromPosition,
        (variant, _) => variant,
    };
    // Lichess only plays set-up positions casual.
    let rated = options.rated && fen.is_none();

    Ok(StartGame {
        request: ChallengeRequest {
            opponent: options.opponent.trim().to_string(),
            color,
            variant,
            time_control: options.time_control(),
            rated,
            fen,
        },
        token: options.token.trim().to_string(),
        base_moves,
    })
}
