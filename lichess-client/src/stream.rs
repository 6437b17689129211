//! Decoding of the Board API game stream (newline-delimited JSON)

use chess::{fen, PieceColor};
use serde::Deserialize;

use crate::error::{ClientError, ClientResult};
use crate::types::{GameSnapshot, GameStatus};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum StreamEvent {
    GameFull {
        #[serde(default)]
        white: Player,
        #[serde(default)]
        black: Player,
        #[serde(rename = "initialFen", default)]
        initial_fen: Option<String>,
        state: StateEvent,
    },
    GameState(StateEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct Player {
    /// Absent for the built-in AI
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StateEvent {
    #[serde(default)]
    moves: String,
    status: String,
    #[serde(default)]
    winner: Option<String>,
}

/// Turns stream bytes into snapshots.
///
/// Chunks may split lines anywhere; partial lines are buffered until their
/// newline arrives. Empty keep-alive lines are skipped.
#[derive(Debug)]
pub struct GameStreamDecoder {
    game_id: String,
    buffer: Vec<u8>,
    initial_turn: PieceColor,
    white_id: Option<String>,
    black_id: Option<String>,
}

impl GameStreamDecoder {
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            buffer: Vec::new(),
            initial_turn: PieceColor::White,
            white_id: None,
            black_id: None,
        }
    }

    /// Feed a chunk and collect the snapshots for every complete line in it.
    pub fn push(&mut self, chunk: &[u8]) -> ClientResult<Vec<GameSnapshot>> {
        self.buffer.extend_from_slice(chunk);

        let mut snapshots = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(snapshot) = self.decode_line(line)? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }

    fn decode_line(&mut self, line: &str) -> ClientResult<Option<GameSnapshot>> {
        let event: StreamEvent = serde_json::from_str(line)
            .map_err(|e| ClientError::InvalidData(format!("game stream: {}", e)))?;

        let state = match event {
            StreamEvent::GameFull {
                white,
                black,
                initial_fen,
                state,
            } => {
                self.white_id = white.id;
                self.black_id = black.id;
                self.initial_turn = match initial_fen.as_deref() {
                    None | Some("startpos") => PieceColor::White,
                    Some(fen) => fen::side_to_move(fen)
                        .map_err(|e| ClientError::InvalidData(e.to_string()))?,
                };
                state
            }
            StreamEvent::GameState(state) => state,
            StreamEvent::Other => return Ok(None),
        };

        Ok(Some(self.snapshot(state)))
    }

    fn snapshot(&self, state: StateEvent) -> GameSnapshot {
        let moves: Vec<String> = state.moves.split_whitespace().map(str::to_string).collect();
        let turn = if moves.len() % 2 == 0 {
            self.initial_turn
        } else {
            self.initial_turn.opposite()
        };
        let winner = state.winner.as_deref().and_then(|w| w.parse().ok());

        GameSnapshot {
            game_id: self.game_id.clone(),
            moves,
            turn,
            status: GameStatus::from_lichess(&state.status, winner),
            white_id: self.white_id.clone(),
            black_id: self.black_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME_FULL: &str = r#"{"type":"gameFull","id":"abcd1234","rated":false,"white":{"id":"alice","name":"Alice"},"black":{"id":"maia1","name":"maia1","title":"BOT"},"initialFen":"startpos","state":{"type":"gameState","moves":"","wtime":300000,"btime":300000,"winc":3000,"binc":3000,"status":"started"}}"#;

    #[test]
    fn test_game_full_then_state() {
        let mut decoder = GameStreamDecoder::new("abcd1234");
        let first = decoder.push(format!("{}\n", GAME_FULL).as_bytes()).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].turn, PieceColor::White);
        assert_eq!(first[0].color_of("alice"), Some(PieceColor::White));
        assert_eq!(first[0].status, GameStatus::Ongoing);

        let state = r#"{"type":"gameState","moves":"e2e4 e7e5 g1f3","wtime":299000,"btime":299000,"winc":3000,"binc":3000,"status":"started"}"#;
        let next = decoder.push(format!("{}\n", state).as_bytes()).unwrap();
        assert_eq!(next[0].moves, vec!["e2e4", "e7e5", "g1f3"]);
        assert_eq!(next[0].turn, PieceColor::Black);
        assert_eq!(next[0].black_id.as_deref(), Some("maia1"));
    }

    #[test]
    fn test_lines_split_across_chunks_and_keepalives() {
        let mut decoder = GameStreamDecoder::new("abcd1234");
        let text = format!("\n{}\n\n", GAME_FULL);
        let (a, b) = text.as_bytes().split_at(40);

        assert!(decoder.push(a).unwrap().is_empty());
        let snapshots = decoder.push(b).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(decoder.push(b"\n").unwrap().is_empty());
    }

    #[test]
    fn test_finished_game_and_other_events() {
        let mut decoder = GameStreamDecoder::new("abcd1234");
        let chat = r#"{"type":"chatLine","username":"maia1","text":"Good game","room":"player"}"#;
        assert!(decoder.push(format!("{}\n", chat).as_bytes()).unwrap().is_empty());

        let end = r#"{"type":"gameState","moves":"f2f3 e7e5 g2g4 d8h4","status":"mate","winner":"black"}"#;
        let snapshots = decoder.push(format!("{}\n", end).as_bytes()).unwrap();
        assert_eq!(
            snapshots[0].status,
            GameStatus::Ended {
                status: "mate".to_string(),
                winner: Some(PieceColor::Black),
            }
        );
    }

    #[test]
    fn test_fen_start_with_black_to_move() {
        let mut decoder = GameStreamDecoder::new("abcd1234");
        let full = r#"{"type":"gameFull","white":{"aiLevel":1},"black":{"id":"alice"},"initialFen":"4k3/8/8/8/8/8/4P3/4K3 b - - 0 1","state":{"type":"gameState","moves":"","status":"started"}}"#;
        let snapshots = decoder.push(format!("{}\n", full).as_bytes()).unwrap();
        assert_eq!(snapshots[0].turn, PieceColor::Black);
        assert_eq!(snapshots[0].white_id, None);
        assert_eq!(snapshots[0].color_of("alice"), Some(PieceColor::Black));
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        let mut decoder = GameStreamDecoder::new("abcd1234");
        assert!(matches!(
            decoder.push(b"{not json\n"),
            Err(ClientError::InvalidData(_))
        ));
    }
}
