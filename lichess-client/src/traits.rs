//! GameService trait abstraction for client implementations

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ClientResult;
use crate::types::{Account, ChallengeRequest, GameInfo, GameSnapshot};

/// Snapshots of one game, one per server event
pub type SnapshotStream = BoxStream<'static, ClientResult<GameSnapshot>>;

/// Authenticated Board API operations
/// Implemented by both real LichessClient and MockGameService
#[async_trait]
pub trait GameService: Send + Sync {
    /// The account the token belongs to
    async fn account(&self) -> ClientResult<Account>;

    /// Open a challenge and return its id
    async fn create_challenge(&self, request: &ChallengeRequest) -> ClientResult<String>;

    /// Look up the game a challenge turned into.
    ///
    /// `Ok(None)` while the challenge is pending or the game is not listed
    /// yet; `Err(ChallengeDeclined)` once it can never start.
    async fn find_game_by_challenge(&self, challenge_id: &str) -> ClientResult<Option<GameInfo>>;

    /// Follow a game's state
    async fn stream_game(&self, game_id: &str) -> ClientResult<SnapshotStream>;

    /// Play a move in UCI notation
    async fn send_move(&self, game_id: &str, uci_move: &str) -> ClientResult<()>;

    /// Leave a game, resigning or aborting as the game allows
    async fn resign(&self, game_id: &str) -> ClientResult<()>;

    /// Withdraw a challenge that has not been accepted
    async fn cancel_challenge(&self, challenge_id: &str) -> ClientResult<()>;
}

/// Produces authenticated services.
///
/// Shared transport setup happens at most once per connector; `warm_up`
/// only starts it early.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn warm_up(&self);

    async fn connect(&self, token: &str) -> ClientResult<Arc<dyn GameService>>;
}
