//! Deciding what to do with a remote game snapshot

/// What the worker should do after comparing the GUI's move list with the
/// remote one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RelayAction {
    /// Nothing new on either side
    Wait,
    /// The bot replied; answer the pending `go`
    BestMove(String),
    /// The GUI played a move the server has not seen
    SendMove(String),
    /// It is the account's turn but the GUI asked the engine to move
    SideMismatch,
    /// The move lists disagree
    Diverged,
}

/// Compare move lists, both counted from the GUI's start position.
///
/// `account_to_move` comes from the remote snapshot. A bot move is only
/// reported while a `go` is waiting, and GUI moves are only sent on the
/// account's turn.
pub(crate) fn decide(
    gui: &[String],
    remote: &[String],
    account_to_move: bool,
    awaiting_bestmove: bool,
) -> RelayAction {
    if let Some(unseen) = remote.strip_prefix(gui) {
        return match unseen {
            [] if account_to_move && awaiting_bestmove => RelayAction::SideMismatch,
            [] => RelayAction::Wait,
            [bot_move] if account_to_move && awaiting_bestmove => {
                RelayAction::BestMove(bot_move.clone())
            }
            // The GUI has not caught up with our own earlier moves yet, or
            // no `go` is waiting for the reply.
            [_] => RelayAction::Wait,
            _ => RelayAction::Diverged,
        };
    }

    match gui.strip_prefix(remote) {
        Some([mv]) if account_to_move => RelayAction::SendMove(mv.clone()),
        Some([_]) => RelayAction::Wait,
        _ => RelayAction::Diverged,
    }
}
