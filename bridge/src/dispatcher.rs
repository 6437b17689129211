//! Applies GUI commands to the session.
//!
//! Every command is handled synchronously under a short session lock and
//! answered at once. Anything that needs the network is handed to the worker
//! as a [`WorkItem`], so `uci` and `isready` are never held up by a game.

use chess::{BoardPosition, StartPosition};
use tokio::sync::mpsc;
use tracing::Instrument;
use uci::{GoParams, UciCommand, UciResponse};

use crate::cancel::CancelSignal;
use crate::challenge::begin_game;
use crate::config::{ENGINE_AUTHOR, ENGINE_NAME};
use crate::init::WarmUp;
use crate::options::{option_specs, OptionError};
use crate::output::OutputHandle;
use crate::session::{self, Phase, Session, SharedSession};
use crate::work::WorkItem;

/// Whether the command loop keeps going after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Dispatcher {
    session: SharedSession,
    cancel: CancelSignal,
    out: OutputHandle,
    work_tx: mpsc::UnboundedSender<WorkItem>,
    warm_up: WarmUp,
}

impl Dispatcher {
    pub fn new(
        session: SharedSession,
        cancel: CancelSignal,
        out: OutputHandle,
        work_tx: mpsc::UnboundedSender<WorkItem>,
        warm_up: WarmUp,
    ) -> Self {
        Self {
            session,
            cancel,
            out,
            work_tx,
            warm_up,
        }
    }

    /// Handle commands until `quit`. A closed channel counts as `quit`.
    pub async fn run(self, cmd_rx: mpsc::Receiver<UciCommand>) {
        self.run_inner(cmd_rx)
            .instrument(tracing::info_span!("dispatcher"))
            .await
    }

    async fn run_inner(self, mut cmd_rx: mpsc::Receiver<UciCommand>) {
        while let Some(cmd) = cmd_rx.recv().await {
            if self.handle(cmd) == Flow::Quit {
                return;
            }
        }
        self.handle(UciCommand::Quit);
    }

    pub fn handle(&self, cmd: UciCommand) -> Flow {
        match &cmd {
            // The value may be the token.
            UciCommand::SetOption { name, .. } => tracing::debug!(option = %name, "Handling setoption"),
            other => tracing::debug!("Handling {:?}", other),
        }
        match cmd {
            UciCommand::Uci => self.identify(),
            UciCommand::IsReady => {
                self.warm_up.trigger();
                self.out.send(UciResponse::ReadyOk);
            }
            UciCommand::Debug(on) => session::lock(&self.session).debug = on,
            UciCommand::SetOption { name, value } => self.set_option(&name, value.as_deref()),
            UciCommand::Position { start, moves } => self.set_position(start, &moves),
            UciCommand::Go(params) => self.go(params),
            UciCommand::Stop => self.stop(),
            UciCommand::UciNewGame => {
                self.stop();
                let mut session = session::lock(&self.session);
                session.reset_game();
                if session.phase == Phase::GameEnded {
                    session.phase = Phase::Idle;
                }
            }
            UciCommand::PonderHit => tracing::debug!("Ignoring ponderhit"),
            UciCommand::Quit => {
                self.quit();
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    fn identify(&self) {
        self.out.send(UciResponse::IdName(ENGINE_NAME.to_string()));
        self.out.send(UciResponse::IdAuthor(ENGINE_AUTHOR.to_string()));
        for spec in option_specs() {
            self.out.send(UciResponse::Option(spec));
        }
        self.out.send(UciResponse::UciOk);
    }

    fn set_option(&self, name: &str, value: Option<&str>) {
        let mut session = session::lock(&self.session);
        if !session.phase.accepts_options() {
            // No value here: it may be the token.
            tracing::warn!(option = %name, phase = ?session.phase, "Ignoring setoption during a game");
            return;
        }

        let variant = session.options.variant;
        match session.options.apply(name, value) {
            Ok(()) => {
                tracing::debug!(option = %name, "Option set");
                let new_variant = session.options.variant;
                if new_variant != variant && session.board_position.is_initial() {
                    session.board_position = BoardPosition::new(new_variant);
                }
            }
            Err(OptionError::Unknown(name)) => tracing::debug!("Ignoring unknown option {}", name),
            Err(e) => tracing::warn!("{}", e),
        }
    }

    fn set_position(&self, start: StartPosition, moves: &[String]) {
        let mut session = session::lock(&self.session);
        match BoardPosition::from_uci(start, moves, session.options.variant) {
            Ok(position) => session.board_position = position,
            Err(e) => tracing::warn!("Keeping previous position: {}", e),
        }
    }

    fn go(&self, params: GoParams) {
        if params.ponder {
            tracing::debug!("Ignoring go ponder");
            return;
        }

        let mut session = session::lock(&self.session);
        let phase = session.phase;
        match phase {
            phase if phase.can_start_game() => self.start_game(&mut session),
            Phase::GameActive => self.continue_game(&mut session),
            // GUIs send `stop` or `ucinewgame` and then `go` right away. The
            // worker starts this one when it acknowledges the stop.
            Phase::Stopping if !session.deferred_go => {
                tracing::debug!("Deferring go until the previous game has stopped");
                session.deferred_go = true;
            }
            phase => tracing::warn!(?phase, "Ignoring go: a move is already on its way"),
        }
    }

    fn start_game(&self, session: &mut Session) {
        let Some(start) = begin_game(session, &self.cancel, &self.out) else {
            return;
        };
        if self.work_tx.send(WorkItem::StartGame(start)).is_err() {
            tracing::error!("Worker is gone, cannot start a game");
            session.phase = Phase::Idle;
            session.awaiting_bestmove = false;
        }
    }

    /// `go` during a game: pass the GUI's move on, or recheck the latest
    /// snapshot for a bot move the GUI has not seen.
    fn continue_game(&self, session: &mut Session) {
        if session.awaiting_bestmove {
            tracing::warn!("Ignoring go: already waiting for a move");
            return;
        }
        let Some(game_id) = session.current_game_id.clone() else {
            tracing::warn!("Ignoring go: no game id");
            return;
        };

        let item = match session.board_position.moves_after(&session.remote_moves) {
            Some([mv]) => WorkItem::SendMove {
                game_id,
                mv: mv.clone(),
            },
            _ => WorkItem::Resync { game_id },
        };
        session.awaiting_bestmove = true;
        if self.work_tx.send(item).is_err() {
            tracing::error!("Worker is gone");
            session.awaiting_bestmove = false;
        }
    }

    fn stop(&self) {
        let game_id = {
            let mut session = session::lock(&self.session);
            match session.phase {
                Phase::ChallengePending | Phase::GameActive => {}
                Phase::Stopping => {
                    if std::mem::take(&mut session.deferred_go) {
                        tracing::debug!("Dropping deferred go");
                    }
                    return;
                }
                _ => return,
            }
            tracing::info!(phase = ?session.phase, "Stopping");
            session.phase = Phase::Stopping;
            session.awaiting_bestmove = false;
            session.current_game_id.take()
        };
        self.cancel.cancel();
        if let Some(game_id) = game_id {
            let _ = self.work_tx.send(WorkItem::Abort { game_id });
        }
    }

    fn quit(&self) {
        let game_id = {
            let mut session = session::lock(&self.session);
            session.phase = Phase::Terminated;
            session.awaiting_bestmove = false;
            session.current_game_id.take()
        };
        tracing::info!("Quitting");
        self.cancel.cancel();
        if let Some(game_id) = game_id {
            let _ = self.work_tx.send(WorkItem::Abort { game_id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::output::spawn_output_writer;
    use crate::work::StartGame;
    use chess::Variant;
    use lichess_client::{ColorChoice, MockConnector, MockGameService, TimeControl};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines};

    struct Fixture {
        dispatcher: Dispatcher,
        session: SharedSession,
        cancel: CancelSignal,
        work_rx: mpsc::UnboundedReceiver<WorkItem>,
        lines: Lines<BufReader<DuplexStream>>,
    }

    fn fixture() -> Fixture {
        let session = session::shared(Session::new(Options::default()));
        let cancel = CancelSignal::new();
        let (client, server) = tokio::io::duplex(8192);
        let (out, _writer) = spawn_output_writer(client);
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(MockConnector::new(Arc::new(MockGameService::new())));

        let dispatcher = Dispatcher::new(
            session.clone(),
            cancel.clone(),
            out,
            work_tx,
            WarmUp::new(connector),
        );
        Fixture {
            dispatcher,
            session,
            cancel,
            work_rx,
            lines: BufReader::new(server).lines(),
        }
    }

    fn set(f: &Fixture, name: &str, value: &str) {
        f.dispatcher.handle(UciCommand::SetOption {
            name: name.to_string(),
            value: Some(value.to_string()),
        });
    }

    fn position(f: &Fixture, moves: &[&str]) {
        f.dispatcher.handle(UciCommand::Position {
            start: StartPosition::Standard,
            moves: moves.iter().map(|m| m.to_string()).collect(),
        });
    }

    fn go(f: &Fixture) {
        f.dispatcher.handle(UciCommand::Go(GoParams::default()));
    }

    fn started_game(f: &mut Fixture) -> StartGame {
        match f.work_rx.try_recv() {
            Ok(WorkItem::StartGame(start)) => start,
            other => panic!("expected StartGame, got {:?}", other),
        }
    }

    fn activate(f: &Fixture, game_id: &str, remote: &[&str]) {
        let mut session = session::lock(&f.session);
        session.phase = Phase::GameActive;
        session.current_game_id = Some(game_id.to_string());
        session.remote_moves = remote.iter().map(|m| m.to_string()).collect();
        session.awaiting_bestmove = false;
    }

    async fn next_line(f: &mut Fixture) -> String {
        tokio::time::timeout(Duration::from_secs(1), f.lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_uci_identifies_and_lists_options() {
        let mut f = fixture();
        f.dispatcher.handle(UciCommand::Uci);

        assert!(next_line(&mut f).await.starts_with("id name Lichess Bridge"));
        assert!(next_line(&mut f).await.starts_with("id author"));
        for _ in 0..9 {
            assert!(next_line(&mut f).await.starts_with("option name "));
        }
        assert_eq!(next_line(&mut f).await, "uciok");
    }

    #[tokio::test]
    async fn test_go_without_token_waits_for_config() {
        let mut f = fixture();
        go(&f);

        assert_eq!(
            session::lock(&f.session).phase,
            Phase::AwaitingOpponentConfig
        );
        assert_eq!(
            next_line(&mut f).await,
            "info string set the LichessToken option to start a game"
        );
        assert!(f.work_rx.try_recv().is_err());

        // Options are still accepted, and the next go starts the game.
        set(&f, "LichessToken", "lip_abc");
        go(&f);
        assert_eq!(session::lock(&f.session).phase, Phase::ChallengePending);
        assert_eq!(started_game(&mut f).token, "lip_abc");
    }

    #[tokio::test]
    async fn test_go_from_start_position() {
        let mut f = fixture();
        set(&f, "LichessToken", "lip_abc");
        set(&f, "TimeMode", "unlimited");
        f.cancel.cancel();
        position(&f, &[]);
        go(&f);

        let start = started_game(&mut f);
        assert_eq!(start.request.opponent, "maia1");
        // The engine moves for white, so the account plays black.
        assert_eq!(start.request.color, ColorChoice::Black);
        assert_eq!(start.request.variant, Variant::Standard);
        assert_eq!(start.request.time_control, TimeControl::Unlimited);
        assert_eq!(start.request.fen, None);
        assert!(start.base_moves.is_empty());
        assert!(!f.cancel.is_cancelled());

        let session = session::lock(&f.session);
        assert!(session.awaiting_bestmove);
        assert_eq!(session.phase, Phase::ChallengePending);
    }

    #[tokio::test]
    async fn test_go_after_gui_opening_move_keeps_options() {
        let mut f = fixture();
        set(&f, "LichessToken", "lip_abc");
        set(&f, "Rated", "true");
        set(&f, "Variant", "standard");
        position(&f, &["e2e4"]);
        go(&f);

        assert_eq!(next_line(&mut f).await, "info string challenging maia1");
        let start = started_game(&mut f);
        assert_eq!(start.request.variant, Variant::Standard);
        assert_eq!(start.request.fen, None);
        assert!(start.request.rated);
        // The GUI moved for white, so the account plays white and its move
        // goes out once the game exists.
        assert_eq!(start.request.color, ColorChoice::White);
        assert!(start.base_moves.is_empty());
    }

    #[tokio::test]
    async fn test_go_after_moves_challenges_from_position() {
        let mut f = fixture();
        set(&f, "LichessToken", "lip_abc");
        position(&f, &["e2e4", "e7e5"]);
        go(&f);

        let start = started_game(&mut f);
        assert_eq!(start.request.variant, Variant::FromPosition);
        assert_eq!(start.request.color, ColorChoice::Black);
        assert!(start
            .request
            .fen
            .as_deref()
            .unwrap()
            .starts_with("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w"));
        assert_eq!(start.base_moves, vec!["e2e4", "e7e5"]);
    }

    #[tokio::test]
    async fn test_go_on_mated_position_is_refused() {
        let mut f = fixture();
        set(&f, "LichessToken", "lip_abc");
        position(&f, &["f2f3", "e7e5", "g2g4", "d8h4"]);
        go(&f);

        assert_eq!(
            next_line(&mut f).await,
            "info string ERROR: the position is already decided"
        );
        assert!(f.work_rx.try_recv().is_err());
        assert_eq!(session::lock(&f.session).phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_options_locked_during_game() {
        let mut f = fixture();
        set(&f, "LichessToken", "lip_abc");
        go(&f);
        started_game(&mut f);

        set(&f, "Opponent", "someone_else");
        assert_eq!(session::lock(&f.session).options.opponent, "maia1");
    }

    #[tokio::test]
    async fn test_illegal_position_keeps_previous() {
        let f = fixture();
        position(&f, &["e2e4"]);
        position(&f, &["e2e4", "e2e4"]);
        assert_eq!(
            session::lock(&f.session).board_position.moves(),
            &["e2e4".to_string()]
        );
    }

    #[tokio::test]
    async fn test_variant_change_resets_initial_board() {
        let f = fixture();
        set(&f, "Variant", "crazyhouse");
        assert_eq!(
            session::lock(&f.session).board_position.variant(),
            Variant::Crazyhouse
        );
    }

    #[tokio::test]
    async fn test_go_during_game_sends_the_gui_move() {
        let mut f = fixture();
        activate(&f, "game0001", &["e2e4"]);
        position(&f, &["e2e4", "e7e5"]);
        go(&f);

        assert_eq!(
            f.work_rx.try_recv().unwrap(),
            WorkItem::SendMove {
                game_id: "game0001".to_string(),
                mv: "e7e5".to_string(),
            }
        );
        assert!(session::lock(&f.session).awaiting_bestmove);

        // A second go while waiting never starts anything new.
        go(&f);
        assert!(f.work_rx.try_recv().is_err());
        assert_eq!(session::lock(&f.session).phase, Phase::GameActive);
    }

    #[tokio::test]
    async fn test_go_during_game_without_new_move_resyncs() {
        let mut f = fixture();
        activate(&f, "game0001", &["e2e4"]);
        position(&f, &["e2e4"]);
        go(&f);
        assert_eq!(
            f.work_rx.try_recv().unwrap(),
            WorkItem::Resync {
                game_id: "game0001".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_stop_during_challenge() {
        let mut f = fixture();
        set(&f, "LichessToken", "lip_abc");
        go(&f);
        started_game(&mut f);

        f.dispatcher.handle(UciCommand::Stop);
        assert!(f.cancel.is_cancelled());
        let session = session::lock(&f.session);
        assert_eq!(session.phase, Phase::Stopping);
        assert!(!session.awaiting_bestmove);
        drop(session);
        assert!(f.work_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_go_while_stopping_is_deferred() {
        let mut f = fixture();
        set(&f, "LichessToken", "lip_abc");
        go(&f);
        started_game(&mut f);
        f.dispatcher.handle(UciCommand::Stop);

        go(&f);
        go(&f);
        assert!(f.work_rx.try_recv().is_err());
        {
            let session = session::lock(&f.session);
            assert_eq!(session.phase, Phase::Stopping);
            assert!(session.deferred_go);
        }

        // Another stop withdraws the deferred search as well.
        f.dispatcher.handle(UciCommand::Stop);
        assert!(!session::lock(&f.session).deferred_go);
    }

    #[tokio::test]
    async fn test_stop_during_game_aborts_it() {
        let mut f = fixture();
        activate(&f, "game0001", &[]);
        f.dispatcher.handle(UciCommand::Stop);

        assert_eq!(
            f.work_rx.try_recv().unwrap(),
            WorkItem::Abort {
                game_id: "game0001".to_string()
            }
        );
        assert_eq!(session::lock(&f.session).current_game_id, None);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_a_no_op() {
        let f = fixture();
        f.dispatcher.handle(UciCommand::Stop);
        assert!(!f.cancel.is_cancelled());
        assert_eq!(session::lock(&f.session).phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_ucinewgame_resets_board() {
        let f = fixture();
        position(&f, &["e2e4", "e7e5"]);
        session::lock(&f.session).phase = Phase::GameEnded;
        f.dispatcher.handle(UciCommand::UciNewGame);

        let session = session::lock(&f.session);
        assert!(session.board_position.is_initial());
        assert_eq!(session.phase, Phase::Idle);
        assert_eq!(session.current_game_id, None);
    }

    #[tokio::test]
    async fn test_quit_terminates_and_aborts() {
        let mut f = fixture();
        activate(&f, "game0001", &[]);
        assert_eq!(f.dispatcher.handle(UciCommand::Quit), Flow::Quit);

        assert!(f.cancel.is_cancelled());
        assert_eq!(session::lock(&f.session).phase, Phase::Terminated);
        assert_eq!(
            f.work_rx.try_recv().unwrap(),
            WorkItem::Abort {
                game_id: "game0001".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_play_as_overrides_side() {
        let mut f = fixture();
        set(&f, "LichessToken", "lip_abc");
        set(&f, "PlayAs", "white");
        go(&f);
        assert_eq!(started_game(&mut f).request.color, ColorChoice::White);
    }
}
