//! The worker task: every remote call happens here.

mod relay;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chess::PieceColor;
use futures::StreamExt;
use lichess_client::{
    ClientError, Connector, GameInfo, GameService, GameSnapshot, GameStatus, SnapshotStream,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::Instrument;
use uci::UciResponse;

use crate::cancel::CancelSignal;
use crate::challenge::begin_game;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::output::OutputHandle;
use crate::retry::with_retries;
use crate::session::{self, Phase, SharedSession};
use crate::work::{StartGame, WorkItem};
use relay::{decide, RelayAction};

pub struct Worker {
    session: SharedSession,
    connector: Arc<dyn Connector>,
    cancel: CancelSignal,
    out: OutputHandle,
    config: BridgeConfig,
    /// Service from the latest lifecycle, kept for cleanup calls
    service: Option<Arc<dyn GameService>>,
    /// Withdrawals and resignations still in flight. A stop never waits for
    /// them; shutdown does, within the grace period.
    cleanup: JoinSet<()>,
}

/// A game that has been confirmed and published to the session
struct ActiveGame {
    id: String,
    account_id: String,
    color: Option<PieceColor>,
    base_moves: Vec<String>,
    latest: Option<GameSnapshot>,
    /// Remote line length when we last sent a move
    sent_at: Option<usize>,
    /// Remote line length when we last reported a problem
    reported_at: Option<usize>,
}

impl Worker {
    pub fn new(
        session: SharedSession,
        connector: Arc<dyn Connector>,
        cancel: CancelSignal,
        out: OutputHandle,
        config: BridgeConfig,
    ) -> Self {
        Self {
            session,
            connector,
            cancel,
            out,
            config,
            service: None,
            cleanup: JoinSet::new(),
        }
    }

    /// Process work items until the dispatcher drops its sender.
    pub async fn run(self, work_rx: mpsc::UnboundedReceiver<WorkItem>) {
        self.run_inner(work_rx)
            .instrument(tracing::info_span!("worker"))
            .await
    }

    async fn run_inner(mut self, mut work_rx: mpsc::UnboundedReceiver<WorkItem>) {
        tracing::info!("Worker started");

        while let Some(item) = work_rx.recv().await {
            match item {
                WorkItem::StartGame(start) => {
                    let mut next = Some(start);
                    while let Some(start) = next.take() {
                        let result = self.play(start, &mut work_rx).await;
                        next = self.finish(result);
                        if next.is_some() {
                            self.drain_stale_work(&mut work_rx);
                        }
                    }
                }
                WorkItem::Abort { game_id } => self.abort_game(&game_id),
                WorkItem::SendMove { game_id, .. } | WorkItem::Resync { game_id } => {
                    tracing::debug!(game_id = %game_id, "Dropping work for a game that is not running");
                }
            }
        }

        if !self.cleanup.is_empty() {
            tracing::debug!(pending = self.cleanup.len(), "Waiting for cleanup calls");
        }
        while self.cleanup.join_next().await.is_some() {}
        tracing::info!("Worker exited");
    }

    /// Handle what the stopped lifecycle left queued before a deferred `go`
    /// starts the next one.
    fn drain_stale_work(&mut self, work_rx: &mut mpsc::UnboundedReceiver<WorkItem>) {
        while let Ok(item) = work_rx.try_recv() {
            match item {
                WorkItem::Abort { game_id } => self.abort_game(&game_id),
                other => tracing::debug!("Dropping {:?} queued before the stop", other),
            }
        }
    }

    fn spawn_cleanup<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        while self.cleanup.try_join_next().is_some() {}
        self.cleanup.spawn(task.in_current_span());
    }

    /// One game lifecycle, from connecting to the end of the game.
    async fn play(
        &mut self,
        start: StartGame,
        work_rx: &mut mpsc::UnboundedReceiver<WorkItem>,
    ) -> Result<GameStatus, BridgeError> {
        let StartGame {
            request,
            token,
            base_moves,
        } = start;

        let service = self.connect(&token).await?;
        self.service = Some(service.clone());
        let svc = &service;

        let account = with_retries(self.config.retry, Some(&self.cancel), "account", move || {
            svc.account()
        })
        .await?;
        self.progress(format!("logged in as {}", account.username));

        let opponent = request.opponent.clone();
        let challenge_id = self.create_challenge(&service, request).await?;
        self.progress(format!(
            "challenge {} sent, waiting for {}",
            challenge_id, opponent
        ));

        let info = self.detect_game(&service, &challenge_id).await?;

        let mut game = ActiveGame {
            id: info.game_id,
            account_id: account.id,
            color: info.color,
            base_moves,
            latest: None,
            sent_at: None,
            reported_at: None,
        };
        self.publish(&service, &game)?;

        let span = tracing::info_span!("game", id = %game.id);
        self.relay_game(&service, &mut game, work_rx)
            .instrument(span)
            .await
    }

    async fn connect(&self, token: &str) -> Result<Arc<dyn GameService>, BridgeError> {
        let connecting = self.connector.connect(token);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BridgeError::Cancelled),
            result = connecting => result.map_err(|e| BridgeError::remote("connect", e)),
        }
    }

    /// Creating a challenge is never retried, so a slow request cannot open
    /// two games. If a `stop` lands while it is in flight, the challenge is
    /// withdrawn in the background once its id is known.
    async fn create_challenge(
        &mut self,
        service: &Arc<dyn GameService>,
        request: lichess_client::ChallengeRequest,
    ) -> Result<String, BridgeError> {
        let mut create = {
            let service = service.clone();
            tokio::spawn(async move { service.create_challenge(&request).await })
        };

        let created = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            joined = &mut create => Some(joined),
        };

        match created {
            Some(Ok(result)) => result.map_err(|e| BridgeError::remote("create challenge", e)),
            Some(Err(e)) => Err(BridgeError::Internal(e.to_string())),
            None => {
                let service = service.clone();
                self.spawn_cleanup(async move {
                    if let Ok(Ok(challenge_id)) = create.await {
                        tracing::info!(challenge_id = %challenge_id, "Withdrawing challenge created after stop");
                        if let Err(e) = service.cancel_challenge(&challenge_id).await {
                            tracing::warn!("Could not cancel challenge {}: {}", challenge_id, e);
                        }
                    }
                });
                Err(BridgeError::Cancelled)
            }
        }
    }

    /// Poll until the challenge has become a game the server will stream.
    ///
    /// The challenge is withdrawn in the background on every way out except
    /// success.
    async fn detect_game(
        &mut self,
        service: &Arc<dyn GameService>,
        challenge_id: &str,
    ) -> Result<GameInfo, BridgeError> {
        let attempts = self.config.detection_attempts.max(1);
        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        for attempt in 1..=attempts {
            let cancelled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => true,
                _ = ticker.tick() => false,
            };
            if cancelled {
                self.withdraw_challenge(service, challenge_id);
                return Err(BridgeError::Cancelled);
            }

            let lookup = with_retries(
                self.config.retry,
                Some(&self.cancel),
                "game lookup",
                move || service.find_game_by_challenge(challenge_id),
            )
            .await;

            match lookup {
                Ok(Some(info)) => {
                    tracing::info!(game_id = %info.game_id, attempt, "Game found");
                    return Ok(info);
                }
                Ok(None) => {
                    tracing::debug!(attempt, "Challenge still pending");
                }
                Err(BridgeError::Remote {
                    source: ClientError::NotFound(_),
                    ..
                }) => {
                    tracing::debug!(attempt, "Game not queryable yet");
                }
                Err(e) => {
                    self.withdraw_challenge(service, challenge_id);
                    return Err(e);
                }
            }
        }

        self.withdraw_challenge(service, challenge_id);
        Err(BridgeError::GameDetection {
            challenge_id: challenge_id.to_string(),
            attempts,
        })
    }

    fn withdraw_challenge(&mut self, service: &Arc<dyn GameService>, challenge_id: &str) {
        let service = service.clone();
        let challenge_id = challenge_id.to_string();
        self.spawn_cleanup(async move {
            if let Err(e) = service.cancel_challenge(&challenge_id).await {
                tracing::debug!("Could not cancel challenge {}: {}", challenge_id, e);
            }
        });
    }

    /// Make the game visible to the dispatcher, unless a `stop` got there
    /// first, in which case the freshly found game is left in the background.
    fn publish(
        &mut self,
        service: &Arc<dyn GameService>,
        game: &ActiveGame,
    ) -> Result<(), BridgeError> {
        let published = {
            let mut session = session::lock(&self.session);
            if session.phase == Phase::ChallengePending && !self.cancel.is_cancelled() {
                session.phase = Phase::GameActive;
                session.current_game_id = Some(game.id.clone());
                session.remote_moves = game.base_moves.clone();
                true
            } else {
                false
            }
        };

        if !published {
            tracing::info!(game_id = %game.id, "Game found after stop, leaving it");
            let service = service.clone();
            let game_id = game.id.clone();
            self.spawn_cleanup(async move {
                if let Err(e) = service.resign(&game_id).await {
                    tracing::warn!("Could not leave stale game {}: {}", game_id, e);
                }
            });
            return Err(BridgeError::Cancelled);
        }

        let side = match game.color {
            Some(color) => format!(", you play {}", color),
            None => String::new(),
        };
        self.out.info(format!("game {} started{}", game.id, side));
        Ok(())
    }

    async fn relay_game(
        &mut self,
        service: &Arc<dyn GameService>,
        game: &mut ActiveGame,
        work_rx: &mut mpsc::UnboundedReceiver<WorkItem>,
    ) -> Result<GameStatus, BridgeError> {
        let mut stream = self.open_stream(service, &game.id).await?;
        let mut failures = 0;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Err(BridgeError::Cancelled),

                item = work_rx.recv() => match item {
                    None => return Err(BridgeError::Cancelled),
                    Some(WorkItem::SendMove { game_id, mv }) if game_id == game.id => {
                        tracing::debug!(mv = %mv, "GUI move queued");
                        self.relay(service, game).await?;
                    }
                    Some(WorkItem::Resync { game_id }) if game_id == game.id => {
                        self.relay(service, game).await?;
                    }
                    Some(WorkItem::Abort { game_id }) => {
                        self.abort_game(&game_id);
                        if game_id == game.id {
                            return Err(BridgeError::Cancelled);
                        }
                    }
                    Some(other) => {
                        tracing::warn!("Ignoring {:?} while game {} is running", other, game.id);
                    }
                },

                next = stream.next() => match next {
                    Some(Ok(snapshot)) => {
                        failures = 0;
                        let status = snapshot.status.clone();
                        game.latest = Some(snapshot);
                        self.relay(service, game).await?;
                        if status.is_over() {
                            return Ok(status);
                        }
                    }
                    Some(Err(e)) if !e.is_transient() => {
                        return Err(BridgeError::remote("game stream", e));
                    }
                    interrupted => {
                        failures += 1;
                        if failures > self.config.retry.attempts {
                            return Err(BridgeError::StreamLost);
                        }
                        let delay = self.config.retry.delay_for(failures);
                        match interrupted {
                            Some(Err(e)) => tracing::warn!(?delay, "Game stream failed, reconnecting: {}", e),
                            _ => tracing::warn!(?delay, "Game stream closed, reconnecting"),
                        }
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => return Err(BridgeError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                        stream = self.open_stream(service, &game.id).await?;
                    }
                },
            }
        }
    }

    async fn open_stream(
        &self,
        service: &Arc<dyn GameService>,
        game_id: &str,
    ) -> Result<SnapshotStream, BridgeError> {
        with_retries(
            self.config.retry,
            Some(&self.cancel),
            "open game stream",
            move || service.stream_game(game_id),
        )
        .await
    }

    /// Act on the latest snapshot: answer a waiting `go` with the bot's
    /// move, or pass the GUI's move on.
    async fn relay(
        &self,
        service: &Arc<dyn GameService>,
        game: &mut ActiveGame,
    ) -> Result<(), BridgeError> {
        let Some(snapshot) = game.latest.clone() else {
            return Ok(());
        };

        let color = match game.color.or_else(|| snapshot.color_of(&game.account_id)) {
            Some(color) => color,
            None => {
                return Err(BridgeError::NotAPlayer {
                    account: game.account_id.clone(),
                    game_id: game.id.clone(),
                })
            }
        };
        if game.color.is_none() {
            tracing::info!("Playing as {}", color);
            game.color = Some(color);
        }

        let mut remote = game.base_moves.clone();
        remote.extend(snapshot.moves);
        let remote_len = remote.len();

        let action = {
            let mut session = session::lock(&self.session);
            if session.phase != Phase::GameActive {
                return Ok(());
            }
            let action = decide(
                session.board_position.moves(),
                &remote,
                snapshot.turn == color,
                session.awaiting_bestmove,
            );
            if matches!(action, RelayAction::BestMove(_)) {
                session.awaiting_bestmove = false;
            }
            session.remote_moves = remote;
            action
        };

        match action {
            RelayAction::Wait => {}
            RelayAction::BestMove(mv) => {
                tracing::info!(mv = %mv, "Opponent moved");
                self.out.send(UciResponse::BestMove(mv));
            }
            RelayAction::SendMove(mv) => {
                if game.sent_at == Some(remote_len) {
                    return Ok(());
                }
                game.sent_at = Some(remote_len);
                self.progress(format!("sending {}", mv));
                let game_id = game.id.as_str();
                let uci_move = mv.as_str();
                match with_retries(
                    self.config.retry,
                    Some(&self.cancel),
                    "send move",
                    move || service.send_move(game_id, uci_move),
                )
                .await
                {
                    Ok(()) => tracing::info!(mv = %mv, "Move sent"),
                    Err(BridgeError::Cancelled) => return Err(BridgeError::Cancelled),
                    Err(BridgeError::Remote { source, .. }) if !source.is_transient() => {
                        tracing::warn!(mv = %mv, "Move rejected: {}", source);
                        self.out.info(format!("move {} rejected: {}", mv, source));
                    }
                    Err(e) => return Err(e),
                }
            }
            RelayAction::SideMismatch => {
                if game.reported_at != Some(remote_len) {
                    game.reported_at = Some(remote_len);
                    tracing::warn!("GUI asked for a move but it is the account's turn");
                    self.out.info(format!(
                        "you play {} in this game; make your move in the GUI",
                        color
                    ));
                }
            }
            RelayAction::Diverged => {
                if game.reported_at != Some(remote_len) {
                    game.reported_at = Some(remote_len);
                    tracing::warn!("GUI position no longer matches game {}", game.id);
                    self.out
                        .info(format!("GUI position does not match game {}", game.id));
                }
            }
        }
        Ok(())
    }

    /// Leave a game in the background; used for `stop`, `ucinewgame` and
    /// `quit`.
    fn abort_game(&mut self, game_id: &str) {
        let Some(service) = self.service.clone() else {
            return;
        };
        tracing::info!(game_id = %game_id, "Leaving game");
        let policy = self.config.retry;
        let game_id = game_id.to_string();
        self.spawn_cleanup(async move {
            let (svc, id) = (&service, game_id.as_str());
            let result = with_retries(policy, None, "resign", move || svc.resign(id)).await;
            if let Err(e) = result {
                tracing::warn!("Could not leave game {}: {}", game_id, e);
            }
        });
    }

    /// Record how a lifecycle ended and acknowledge any cancellation.
    ///
    /// Returns the next lifecycle when a `go` was deferred behind a stop.
    fn finish(&self, result: Result<GameStatus, BridgeError>) -> Option<StartGame> {
        let mut session = session::lock(&self.session);
        match result {
            Ok(status) => {
                tracing::info!("Game over: {}", status.describe());
                session.current_game_id = None;
                session.awaiting_bestmove = false;
                session.phase = match session.phase {
                    Phase::GameActive => Phase::GameEnded,
                    Phase::Terminated => Phase::Terminated,
                    _ => Phase::Idle,
                };
                self.out.info(format!("game over: {}", status.describe()));
            }
            Err(BridgeError::Cancelled) => {
                tracing::info!("Game lifecycle cancelled");
                session.settle_after_cancel();
                if session.phase != Phase::Terminated {
                    self.cancel.reset();
                }
            }
            Err(e) => {
                tracing::error!("Game lifecycle failed: {}", e);
                session.settle_after_cancel();
                if session.phase != Phase::Terminated {
                    self.cancel.reset();
                }
                self.out.info(format!("ERROR: {}", e));
            }
        }

        if !std::mem::take(&mut session.deferred_go) || !session.phase.can_start_game() {
            return None;
        }
        tracing::info!("Starting the search requested while stopping");
        begin_game(&mut session, &self.cancel, &self.out)
    }

    /// Progress note: always logged, echoed to the GUI under `debug on`.
    fn progress(&self, msg: String) {
        tracing::info!("{}", msg);
        if session::lock(&self.session).debug {
            self.out.info(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::options::Options;
    use crate::output::spawn_output_writer;
    use crate::session::Session;
    use chess::{BoardPosition, StartPosition, Variant};
    use lichess_client::{
        ChallengeRequest, ColorChoice, MockCall, MockConnector, MockGameService, TimeControl,
    };
    use std::time::Instant;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines};

    struct Harness {
        session: SharedSession,
        cancel: CancelSignal,
        work_tx: mpsc::UnboundedSender<WorkItem>,
        lines: Lines<BufReader<DuplexStream>>,
        mock: Arc<MockGameService>,
    }

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            poll_interval: Duration::from_millis(5),
            detection_attempts: 20,
            retry: RetryPolicy {
                attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
            ..BridgeConfig::default()
        }
    }

    fn start_worker(mock: MockGameService) -> Harness {
        start_worker_with(mock, test_config())
    }

    fn start_worker_with(mock: MockGameService, config: BridgeConfig) -> Harness {
        let mock = Arc::new(mock);
        let connector = Arc::new(MockConnector::new(mock.clone()));
        let session = session::shared(Session::new(Options::default()));
        let cancel = CancelSignal::new();
        let (client, server) = tokio::io::duplex(4096);
        let (out, _writer) = spawn_output_writer(client);
        let (work_tx, work_rx) = mpsc::unbounded_channel();

        let worker = Worker::new(
            session.clone(),
            connector,
            cancel.clone(),
            out,
            config,
        );
        tokio::spawn(worker.run(work_rx));

        Harness {
            session,
            cancel,
            work_tx,
            lines: BufReader::new(server).lines(),
            mock,
        }
    }

    fn start_game(harness: &Harness, gui_moves: &[&str]) {
        {
            let mut session = session::lock(&harness.session);
            session.board_position =
                BoardPosition::from_uci(StartPosition::Standard, gui_moves, Variant::Standard)
                    .unwrap();
            session.phase = Phase::ChallengePending;
            session.awaiting_bestmove = true;
        }
        harness
            .work_tx
            .send(WorkItem::StartGame(StartGame {
                request: ChallengeRequest {
                    opponent: "maia1".to_string(),
                    color: ColorChoice::Black,
                    variant: Variant::Standard,
                    time_control: TimeControl::Unlimited,
                    rated: false,
                    fen: None,
                },
                token: "lip_test".to_string(),
                base_moves: Vec::new(),
            }))
            .unwrap();
    }

    fn snapshot(moves: &str, turn: PieceColor, status: GameStatus) -> GameSnapshot {
        GameSnapshot {
            game_id: "chal0001".to_string(),
            moves: moves.split_whitespace().map(str::to_string).collect(),
            turn,
            status,
            white_id: Some("maia1".to_string()),
            black_id: Some("tester".to_string()),
        }
    }

    async fn wait_for_phase(session: &SharedSession, phase: Phase) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while session::lock(session).phase != phase {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("phase never became {:?}", phase));
    }

    async fn next_line(lines: &mut Lines<BufReader<DuplexStream>>) -> String {
        tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_bot_move_becomes_bestmove() {
        let mock = MockGameService::new().with_game_found(GameInfo {
            game_id: "chal0001".to_string(),
            color: Some(PieceColor::Black),
        });
        let feed = mock.game_feed();
        let mut harness = start_worker(mock);

        start_game(&harness, &[]);
        wait_for_phase(&harness.session, Phase::GameActive).await;
        assert_eq!(
            next_line(&mut harness.lines).await,
            "info string game chal0001 started, you play black"
        );

        feed.send(Ok(snapshot("", PieceColor::White, GameStatus::Ongoing)))
            .unwrap();
        feed.send(Ok(snapshot("e2e4", PieceColor::Black, GameStatus::Ongoing)))
            .unwrap();
        assert_eq!(next_line(&mut harness.lines).await, "bestmove e2e4");

        let session = session::lock(&harness.session);
        assert!(!session.awaiting_bestmove);
        assert_eq!(session.remote_moves, vec!["e2e4".to_string()]);
        assert_eq!(session.current_game_id.as_deref(), Some("chal0001"));
    }

    #[tokio::test]
    async fn test_gui_move_is_sent_then_game_ends() {
        let mock = MockGameService::new().with_game_found(GameInfo {
            game_id: "chal0001".to_string(),
            color: None,
        });
        let feed = mock.game_feed();
        let mut harness = start_worker(mock);

        start_game(&harness, &[]);
        wait_for_phase(&harness.session, Phase::GameActive).await;
        next_line(&mut harness.lines).await;

        feed.send(Ok(snapshot("e2e4", PieceColor::Black, GameStatus::Ongoing)))
            .unwrap();
        assert_eq!(next_line(&mut harness.lines).await, "bestmove e2e4");

        // The GUI plays the reply and asks for the next bot move.
        {
            let mut session = session::lock(&harness.session);
            session.board_position.push_uci("e2e4").unwrap();
            session.board_position.push_uci("e7e5").unwrap();
            session.awaiting_bestmove = true;
        }
        harness
            .work_tx
            .send(WorkItem::SendMove {
                game_id: "chal0001".to_string(),
                mv: "e7e5".to_string(),
            })
            .unwrap();
        assert!(
            harness
                .mock
                .wait_for_call(
                    |c| matches!(c, MockCall::SendMove { uci_move, .. } if uci_move == "e7e5"),
                    Duration::from_secs(2),
                )
                .await
        );

        feed.send(Ok(snapshot(
            "e2e4 e7e5",
            PieceColor::White,
            GameStatus::Ended {
                status: "resign".to_string(),
                winner: Some(PieceColor::Black),
            },
        )))
        .unwrap();
        assert_eq!(
            next_line(&mut harness.lines).await,
            "info string game over: 0-1 (resign)"
        );
        wait_for_phase(&harness.session, Phase::GameEnded).await;
        assert_eq!(session::lock(&harness.session).current_game_id, None);
    }

    #[tokio::test]
    async fn test_rejected_gui_move_is_reported() {
        let mock = MockGameService::new()
            .with_account("me", "Me")
            .with_game_found(GameInfo {
                game_id: "chal0001".to_string(),
                color: None,
            })
            .with_send_move_response(Err(ClientError::InvalidRequest("Illegal move".into())));
        let feed = mock.game_feed();
        let mut harness = start_worker(mock);

        start_game(&harness, &[]);
        wait_for_phase(&harness.session, Phase::GameActive).await;
        next_line(&mut harness.lines).await;

        // The side is taken from the player ids, matched against the account.
        let mine = |moves: &str, turn| GameSnapshot {
            black_id: Some("me".to_string()),
            ..snapshot(moves, turn, GameStatus::Ongoing)
        };
        feed.send(Ok(mine("e2e4", PieceColor::Black))).unwrap();
        assert_eq!(next_line(&mut harness.lines).await, "bestmove e2e4");

        {
            let mut session = session::lock(&harness.session);
            session.board_position.push_uci("e2e4").unwrap();
            session.board_position.push_uci("e7e5").unwrap();
            session.awaiting_bestmove = true;
        }
        harness
            .work_tx
            .send(WorkItem::SendMove {
                game_id: "chal0001".to_string(),
                mv: "e7e5".to_string(),
            })
            .unwrap();
        assert_eq!(
            next_line(&mut harness.lines).await,
            "info string move e7e5 rejected: Invalid request: Illegal move"
        );
        assert_eq!(session::lock(&harness.session).phase, Phase::GameActive);
    }

    #[tokio::test]
    async fn test_declined_challenge_returns_to_idle() {
        let mock = MockGameService::new()
            .with_lookup_default(Err(ClientError::ChallengeDeclined("later".into())));
        let mut harness = start_worker(mock);

        start_game(&harness, &[]);
        assert_eq!(
            next_line(&mut harness.lines).await,
            "info string ERROR: Challenge declined: later"
        );
        wait_for_phase(&harness.session, Phase::Idle).await;
        assert!(!session::lock(&harness.session).awaiting_bestmove);
    }

    #[tokio::test]
    async fn test_detection_gives_up_and_withdraws_challenge() {
        let mut harness = start_worker(MockGameService::new());

        start_game(&harness, &[]);
        let line = next_line(&mut harness.lines).await;
        assert!(line.starts_with("info string ERROR: Game for challenge chal0001 not found"));
        let lookups = harness
            .mock
            .get_calls()
            .iter()
            .filter(|c| matches!(c, MockCall::FindGame { .. }))
            .count();
        assert_eq!(lookups, 20);
        assert!(
            harness
                .mock
                .wait_for_call(
                    |c| *c
                        == MockCall::CancelChallenge {
                            challenge_id: "chal0001".to_string()
                        },
                    Duration::from_secs(1)
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_zero_poll_interval_still_polls() {
        let config = BridgeConfig {
            poll_interval: Duration::ZERO,
            detection_attempts: 3,
            ..test_config()
        };
        let mut harness = start_worker_with(MockGameService::new(), config);

        start_game(&harness, &[]);
        let line = next_line(&mut harness.lines).await;
        assert!(line.starts_with("info string ERROR: Game for challenge chal0001 not found"));
        wait_for_phase(&harness.session, Phase::Idle).await;
        let lookups = harness
            .mock
            .get_calls()
            .iter()
            .filter(|c| matches!(c, MockCall::FindGame { .. }))
            .count();
        assert_eq!(lookups, 3);
    }

    #[tokio::test]
    async fn test_stop_during_detection_does_not_wait_for_withdrawal() {
        let mock = MockGameService::new().with_cleanup_delay(Duration::from_secs(1));
        let config = BridgeConfig {
            detection_attempts: 1000,
            ..test_config()
        };
        let harness = start_worker_with(mock, config);

        start_game(&harness, &[]);
        assert!(
            harness
                .mock
                .wait_for_call(
                    |c| matches!(c, MockCall::FindGame { .. }),
                    Duration::from_secs(1)
                )
                .await
        );
        let stopped_at = Instant::now();
        session::lock(&harness.session).phase = Phase::Stopping;
        harness.cancel.cancel();

        wait_for_phase(&harness.session, Phase::Idle).await;
        assert!(stopped_at.elapsed() < Duration::from_millis(500));
        assert!(
            harness
                .mock
                .wait_for_call(
                    |c| matches!(c, MockCall::CancelChallenge { .. }),
                    Duration::from_secs(1)
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_game_found_after_stop_is_left_in_background() {
        let mock = MockGameService::new()
            .with_cleanup_delay(Duration::from_secs(1))
            .with_game_found(GameInfo {
                game_id: "chal0001".to_string(),
                color: None,
            });
        let harness = start_worker(mock);

        // The stop lands before the worker gets to run.
        start_game(&harness, &[]);
        session::lock(&harness.session).phase = Phase::Stopping;
        let stopped_at = Instant::now();

        wait_for_phase(&harness.session, Phase::Idle).await;
        assert!(stopped_at.elapsed() < Duration::from_millis(500));
        assert!(
            harness
                .mock
                .wait_for_call(
                    |c| *c
                        == MockCall::Resign {
                            game_id: "chal0001".to_string()
                        },
                    Duration::from_secs(1)
                )
                .await
        );
        assert_eq!(session::lock(&harness.session).current_game_id, None);
    }

    #[tokio::test]
    async fn test_go_deferred_behind_stop_starts_next_game() {
        let mock = MockGameService::new().with_cleanup_delay(Duration::from_secs(1));
        let config = BridgeConfig {
            detection_attempts: 1000,
            ..test_config()
        };
        let mut harness = start_worker_with(mock, config);
        {
            let mut session = session::lock(&harness.session);
            session.options.token = "lip_test".to_string();
            session.options.opponent = "maia1".to_string();
        }

        start_game(&harness, &[]);
        assert!(
            harness
                .mock
                .wait_for_call(
                    |c| matches!(c, MockCall::FindGame { .. }),
                    Duration::from_secs(1)
                )
                .await
        );
        {
            let mut session = session::lock(&harness.session);
            session.phase = Phase::Stopping;
            session.deferred_go = true;
        }
        harness.cancel.cancel();

        assert_eq!(
            next_line(&mut harness.lines).await,
            "info string challenging maia1"
        );
        {
            let session = session::lock(&harness.session);
            assert_eq!(session.phase, Phase::ChallengePending);
            assert!(session.awaiting_bestmove);
            assert!(!session.deferred_go);
        }
        assert!(!harness.cancel.is_cancelled());

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let challenges = harness
                    .mock
                    .get_calls()
                    .iter()
                    .filter(|c| matches!(c, MockCall::CreateChallenge(_)))
                    .count();
                if challenges == 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_bad_token_reports_authentication_failure() {
        let mock = MockGameService::new()
            .with_account_error(ClientError::Unauthorized("No such token".into()));
        let mut harness = start_worker(mock);

        start_game(&harness, &[]);
        assert_eq!(
            next_line(&mut harness.lines).await,
            "info string ERROR: Authentication failed: Authentication failed: No such token"
        );
        wait_for_phase(&harness.session, Phase::Idle).await;
        assert!(!harness
            .mock
            .get_calls()
            .iter()
            .any(|c| matches!(c, MockCall::CreateChallenge(_))));
    }

    #[tokio::test]
    async fn test_stop_during_challenge_creation_withdraws_it() {
        let mock = MockGameService::new()
            .with_challenge_delay(Duration::from_millis(30))
            .with_game_found(GameInfo {
                game_id: "chal0001".to_string(),
                color: None,
            });
        let harness = start_worker(mock);

        start_game(&harness, &[]);
        assert!(
            harness
                .mock
                .wait_for_call(
                    |c| matches!(c, MockCall::CreateChallenge(_)),
                    Duration::from_secs(1)
                )
                .await
        );
        session::lock(&harness.session).phase = Phase::Stopping;
        harness.cancel.cancel();

        wait_for_phase(&harness.session, Phase::Idle).await;
        assert!(!harness.cancel.is_cancelled());
        // The challenge created after the stop is withdrawn in the background.
        assert!(
            harness
                .mock
                .wait_for_call(
                    |c| matches!(c, MockCall::CancelChallenge { .. }),
                    Duration::from_secs(1)
                )
                .await
        );
    }
}
