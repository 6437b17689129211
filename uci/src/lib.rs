//! The subset of the Universal Chess Interface the bridge speaks.
//!
//! Commands flow GUI → bridge and are parsed by [`parse_command`];
//! responses flow bridge → GUI and render through `Display`.

pub mod command;
pub mod options;
pub mod response;

pub use command::{parse_command, GoParams, UciCommand};
pub use options::{OptionKind, OptionSpec};
pub use response::UciResponse;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UciError {
    #[error("Empty command")]
    Empty,
    #[error("Malformed UCI command: {0}")]
    MalformedCommand(String),
    #[error("Unknown UCI command: {0}")]
    UnknownCommand(String),
}
