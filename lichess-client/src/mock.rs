//! Mock GameService implementation for testing

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{ClientError, ClientResult};
use crate::traits::{Connector, GameService, SnapshotStream};
use crate::types::{Account, ChallengeRequest, GameInfo, GameSnapshot};

/// Sender half of a scripted game stream
pub type GameFeed = mpsc::UnboundedSender<ClientResult<GameSnapshot>>;

/// Mock service for testing - only compiled in test mode or with mock feature
pub struct MockGameService {
    responses: Arc<Mutex<MockResponses>>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
    calls_changed: Arc<Notify>,
}

struct MockResponses {
    account: ClientResult<Account>,
    challenge: ClientResult<String>,
    challenge_delay: Option<Duration>,
    cleanup_delay: Option<Duration>,
    lookups: VecDeque<ClientResult<Option<GameInfo>>>,
    lookup_default: ClientResult<Option<GameInfo>>,
    feeds: VecDeque<mpsc::UnboundedReceiver<ClientResult<GameSnapshot>>>,
    send_move: ClientResult<()>,
}

impl Default for MockResponses {
    fn default() -> Self {
        Self {
            account: Ok(Account {
                id: "tester".to_string(),
                username: "Tester".to_string(),
            }),
            challenge: Ok("chal0001".to_string()),
            challenge_delay: None,
            cleanup_delay: None,
            lookups: VecDeque::new(),
            lookup_default: Ok(None),
            feeds: VecDeque::new(),
            send_move: Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Account,
    CreateChallenge(ChallengeRequest),
    FindGame { challenge_id: String },
    StreamGame { game_id: String },
    SendMove { game_id: String, uci_move: String },
    Resign { game_id: String },
    CancelChallenge { challenge_id: String },
}

impl Default for MockGameService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGameService {
    /// A service whose account is `tester`, whose challenges get the id
    /// `chal0001` and never turn into a game.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(MockResponses::default())),
            call_log: Arc::new(Mutex::new(Vec::new())),
            calls_changed: Arc::new(Notify::new()),
        }
    }

    pub fn with_account(self, id: &str, username: &str) -> Self {
        self.responses.lock().unwrap().account = Ok(Account {
            id: id.to_string(),
            username: username.to_string(),
        });
        self
    }

    pub fn with_account_error(self, error: ClientError) -> Self {
        self.responses.lock().unwrap().account = Err(error);
        self
    }

    pub fn with_challenge_response(self, response: ClientResult<String>) -> Self {
        self.responses.lock().unwrap().challenge = response;
        self
    }

    /// Hold every challenge request for `delay` before answering
    pub fn with_challenge_delay(self, delay: Duration) -> Self {
        self.responses.lock().unwrap().challenge_delay = Some(delay);
        self
    }

    /// Hold every resign and challenge cancellation for `delay` after
    /// recording it
    pub fn with_cleanup_delay(self, delay: Duration) -> Self {
        self.responses.lock().unwrap().cleanup_delay = Some(delay);
        self
    }

    /// Queue answers for the next game lookups, in order
    pub fn with_lookups<I>(self, lookups: I) -> Self
    where
        I: IntoIterator<Item = ClientResult<Option<GameInfo>>>,
    {
        self.responses.lock().unwrap().lookups.extend(lookups);
        self
    }

    /// Answer once the queued lookups are used up
    pub fn with_game_found(self, info: GameInfo) -> Self {
        self.responses.lock().unwrap().lookup_default = Ok(Some(info));
        self
    }

    pub fn with_lookup_default(self, response: ClientResult<Option<GameInfo>>) -> Self {
        self.responses.lock().unwrap().lookup_default = response;
        self
    }

    pub fn with_send_move_response(self, response: ClientResult<()>) -> Self {
        self.responses.lock().unwrap().send_move = response;
        self
    }

    /// Script the next `stream_game` call. Snapshots sent on the returned
    /// feed are delivered in order; dropping it ends the stream.
    pub fn game_feed(&self) -> GameFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.responses.lock().unwrap().feeds.push_back(rx);
        tx
    }

    /// Get recorded calls for verification
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Wait until a recorded call matches `pred`. Returns false on timeout.
    pub async fn wait_for_call<F>(&self, pred: F, timeout: Duration) -> bool
    where
        F: Fn(&MockCall) -> bool,
    {
        let wait = async {
            loop {
                let notified = self.calls_changed.notified();
                if self.call_log.lock().unwrap().iter().any(&pred) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn record(&self, call: MockCall) {
        self.call_log.lock().unwrap().push(call);
        self.calls_changed.notify_waiters();
    }

    async fn cleanup_pause(&self) {
        let delay = self.responses.lock().unwrap().cleanup_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl GameService for MockGameService {
    async fn account(&self) -> ClientResult<Account> {
        self.record(MockCall::Account);
        self.responses.lock().unwrap().account.clone()
    }

    async fn create_challenge(&self, request: &ChallengeRequest) -> ClientResult<String> {
        self.record(MockCall::CreateChallenge(request.clone()));
        let delay = self.responses.lock().unwrap().challenge_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.responses.lock().unwrap().challenge.clone()
    }

    async fn find_game_by_challenge(&self, challenge_id: &str) -> ClientResult<Option<GameInfo>> {
        self.record(MockCall::FindGame {
            challenge_id: challenge_id.to_string(),
        });
        let mut responses = self.responses.lock().unwrap();
        match responses.lookups.pop_front() {
            Some(response) => response,
            None => responses.lookup_default.clone(),
        }
    }

    async fn stream_game(&self, game_id: &str) -> ClientResult<SnapshotStream> {
        self.record(MockCall::StreamGame {
            game_id: game_id.to_string(),
        });
        let feed = self.responses.lock().unwrap().feeds.pop_front();
        match feed {
            Some(rx) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            None => Err(ClientError::NotConfigured("stream_game".to_string())),
        }
    }

    async fn send_move(&self, game_id: &str, uci_move: &str) -> ClientResult<()> {
        self.record(MockCall::SendMove {
            game_id: game_id.to_string(),
            uci_move: uci_move.to_string(),
        });
        self.responses.lock().unwrap().send_move.clone()
    }

    async fn resign(&self, game_id: &str) -> ClientResult<()> {
        self.record(MockCall::Resign {
            game_id: game_id.to_string(),
        });
        self.cleanup_pause().await;
        Ok(())
    }

    async fn cancel_challenge(&self, challenge_id: &str) -> ClientResult<()> {
        self.record(MockCall::CancelChallenge {
            challenge_id: challenge_id.to_string(),
        });
        self.cleanup_pause().await;
        Ok(())
    }
}

/// Connector handing out one shared [`MockGameService`]
pub struct MockConnector {
    service: Arc<MockGameService>,
    valid_token: Option<String>,
    warm_ups: AtomicUsize,
    connects: AtomicUsize,
}

impl MockConnector {
    /// Accepts any non-empty token.
    pub fn new(service: Arc<MockGameService>) -> Self {
        Self {
            service,
            valid_token: None,
            warm_ups: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
        }
    }

    /// Reject every token except `token`.
    pub fn with_valid_token(mut self, token: &str) -> Self {
        self.valid_token = Some(token.to_string());
        self
    }

    pub fn service(&self) -> &Arc<MockGameService> {
        &self.service
    }

    pub fn warm_up_count(&self) -> usize {
        self.warm_ups.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn warm_up(&self) {
        self.warm_ups.fetch_add(1, Ordering::SeqCst);
    }

    async fn connect(&self, token: &str) -> ClientResult<Arc<dyn GameService>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let token = token.trim();
        let accepted = match &self.valid_token {
            Some(valid) => token == valid,
            None => !token.is_empty(),
        };
        if !accepted {
            return Err(ClientError::Unauthorized("invalid token".to_string()));
        }
        let service: Arc<dyn GameService> = self.service.clone();
        Ok(service)
    }
}
