use chess::StartPosition;

use crate::UciError;

/// Incoming command from the GUI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    Uci,
    Debug(bool),
    IsReady,
    SetOption { name: String, value: Option<String> },
    UciNewGame,
    Position {
        start: StartPosition,
        moves: Vec<String>,
    },
    Go(GoParams),
    Stop,
    PonderHit,
    Quit,
}

/// Parameters for the "go" command.
///
/// The bridge does not search, so only the flags that change what a `go`
/// means are kept; clock fields are accepted and dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoParams {
    pub ponder: bool,
    pub infinite: bool,
    pub movetime: Option<u64>,
    pub depth: Option<u8>,
}

/// Parse a single command line.
pub fn parse_command(line: &str) -> Result<UciCommand, UciError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.as_slice() {
        [] => Err(UciError::Empty),
        ["uci"] => Ok(UciCommand::Uci),
        ["isready"] => Ok(UciCommand::IsReady),
        ["ucinewgame"] => Ok(UciCommand::UciNewGame),
        ["stop"] => Ok(UciCommand::Stop),
        ["ponderhit"] => Ok(UciCommand::PonderHit),
        ["quit"] => Ok(UciCommand::Quit),
        ["debug", "on"] => Ok(UciCommand::Debug(true)),
        ["debug", "off"] => Ok(UciCommand::Debug(false)),
        ["setoption", rest @ ..] => parse_setoption(rest, line),
        ["position", rest @ ..] => parse_position(rest, line),
        ["go", rest @ ..] => Ok(UciCommand::Go(parse_go(rest))),
        _ => Err(UciError::UnknownCommand(line.trim().to_string())),
    }
}

/// `setoption name <id> [value <x>]`; both id and value may contain spaces.
fn parse_setoption(tokens: &[&str], line: &str) -> Result<UciCommand, UciError> {
    let rest = match tokens {
        [kw, rest @ ..] if kw.eq_ignore_ascii_case("name") && !rest.is_empty() => rest,
        _ => return Err(UciError::MalformedCommand(line.trim().to_string())),
    };

    let value_at = rest.iter().position(|t| t.eq_ignore_ascii_case("value"));
    let (name, value) = match value_at {
        Some(0) => return Err(UciError::MalformedCommand(line.trim().to_string())),
        Some(i) => (rest[..i].join(" "), Some(rest[i + 1..].join(" "))),
        None => (rest.join(" "), None),
    };

    Ok(UciCommand::SetOption { name, value })
}

/// `position startpos [moves ...]` or `position fen <fen> [moves ...]`
fn parse_position(tokens: &[&str], line: &str) -> Result<UciCommand, UciError> {
    let moves_at = tokens.iter().position(|t| *t == "moves");
    let (head, moves) = match moves_at {
        Some(i) => (&tokens[..i], &tokens[i + 1..]),
        None => (tokens, &[][..]),
    };

    let start = match head {
        ["startpos"] => StartPosition::Standard,
        ["fen", fen @ ..] if !fen.is_empty() => StartPosition::Fen(fen.join(" ")),
        _ => return Err(UciError::MalformedCommand(line.trim().to_string())),
    };

    Ok(UciCommand::Position {
        start,
        moves: moves.iter().map(|m| m.to_string()).collect(),
    })
}

fn parse_go(tokens: &[&str]) -> GoParams {
    let mut params = GoParams::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "ponder" => params.ponder = true,
            "infinite" => params.infinite = true,
            "movetime" => {
                i += 1;
                params.movetime = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "depth" => {
                i += 1;
                params.depth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "searchmoves" => break,
            _ => {
                // wtime/btime/winc/binc/movestogo/nodes/mate and their values
            }
        }
        i += 1;
    }

    params
}
