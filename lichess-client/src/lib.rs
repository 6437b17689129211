//! Lichess Board API client
//!
//! Provides the [`GameService`] abstraction the bridge talks to, an HTTPS
//! implementation against lichess.org, and (behind the `mock` feature) a
//! scriptable in-memory implementation for tests.
//!
//! # Example
//!
//! ```no_run
//! use lichess_client::{Connector, LichessConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = LichessConnector::new("https://lichess.org");
//!     let service = connector.connect("lip_token").await?;
//!     let account = service.account().await?;
//!     println!("Logged in as {}", account.username);
//!     Ok(())
//! }
//! ```

mod client;
mod error;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod stream;
mod traits;
mod types;

pub use client::{LichessClient, LichessConnector, DEFAULT_BASE_URL};
pub use error::{ClientError, ClientResult};
#[cfg(any(test, feature = "mock"))]
pub use mock::{GameFeed, MockCall, MockConnector, MockGameService};
pub use stream::GameStreamDecoder;
pub use traits::{Connector, GameService, SnapshotStream};
pub use types::{
    Account, ChallengeRequest, ColorChoice, GameInfo, GameSnapshot, GameStatus, TimeControl,
};
