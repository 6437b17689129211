use std::fmt;

use crate::options::OptionSpec;

/// Outgoing line from the bridge to the GUI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciResponse {
    IdName(String),
    IdAuthor(String),
    Option(OptionSpec),
    UciOk,
    ReadyOk,
    BestMove(String),
    InfoString(String),
}

impl UciResponse {
    pub fn info(msg: impl Into<String>) -> Self {
        Self::InfoString(msg.into())
    }
}

impl fmt::Display for UciResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdName(name) => write!(f, "id name {}", name),
            Self::IdAuthor(author) => write!(f, "id author {}", author),
            Self::Option(spec) => write!(f, "{}", spec),
            Self::UciOk => f.write_str("uciok"),
            Self::ReadyOk => f.write_str("readyok"),
            Self::BestMove(mv) => write!(f, "bestmove {}", mv),
            // A newline inside an info string would end the line early.
            Self::InfoString(msg) => write!(f, "info string {}", msg.replace(['\r', '\n'], " ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_lines() {
        assert_eq!(UciResponse::UciOk.to_string(), "uciok");
        assert_eq!(UciResponse::ReadyOk.to_string(), "readyok");
        assert_eq!(
            UciResponse::BestMove("e7e5".into()).to_string(),
            "bestmove e7e5"
        );
        assert_eq!(
            UciResponse::IdName("Lichess Bridge".into()).to_string(),
            "id name Lichess Bridge"
        );
    }

    #[test]
    fn test_info_string_stays_on_one_line() {
        let line = UciResponse::info("challenge failed:\nbad request").to_string();
        assert_eq!(line, "info string challenge failed: bad request");
    }
}
