use lichess_client::ClientError;

/// Why a game lifecycle ended early.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("Cancelled")]
    Cancelled,
    #[error("Authentication failed: {0}")]
    Authentication(ClientError),
    #[error("Challenge declined: {0}")]
    ChallengeDeclined(String),
    #[error("Game for challenge {challenge_id} not found after {attempts} polls")]
    GameDetection { challenge_id: String, attempts: u32 },
    #[error("{operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: ClientError,
    },
    #[error("Account {account} is not a player in game {game_id}")]
    NotAPlayer { account: String, game_id: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Game stream closed too many times")]
    StreamLost,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Classify a failed remote call.
    pub(crate) fn remote(operation: &'static str, source: ClientError) -> Self {
        match source {
            ClientError::Unauthorized(_) => Self::Authentication(source),
            ClientError::ChallengeDeclined(reason) => Self::ChallengeDeclined(reason),
            source => Self::Remote { operation, source },
        }
    }
}
