//! UCI engine front end for games played on Lichess
//!
//! A chess GUI talks UCI to the [`Bridge`]. On `go` the bridge challenges a
//! Lichess opponent with the configured account, then relays the GUI's moves
//! to that game and answers each `go` with the opponent's reply.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bridge::{Bridge, BridgeConfig};
//! use lichess_client::{LichessConnector, DEFAULT_BASE_URL};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let connector = Arc::new(LichessConnector::new(DEFAULT_BASE_URL));
//!     Bridge::new(BridgeConfig::default(), connector)
//!         .run(tokio::io::stdin(), tokio::io::stdout())
//!         .await
//! }
//! ```

mod app;
mod cancel;
mod challenge;
mod config;
mod dispatcher;
mod error;
mod init;
mod options;
mod output;
mod reader;
mod retry;
mod session;
mod work;
mod worker;

pub use app::Bridge;
pub use cancel::CancelSignal;
pub use config::{
    BridgeConfig, RetryPolicy, DEFAULT_DETECTION_ATTEMPTS, DEFAULT_POLL_INTERVAL,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_SHUTDOWN_GRACE, ENGINE_AUTHOR, ENGINE_NAME,
};
pub use error::BridgeError;
pub use options::{option_specs, OptionError, Options, TimeMode};
pub use session::{Phase, Session};
