use std::borrow::Cow;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use uci::{parse_command, UciCommand, UciError};

/// Read GUI commands line by line. End of input, or a read error, is
/// delivered as `quit`.
pub fn spawn_command_reader<R>(input: R, tx: mpsc::Sender<UciCommand>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(input);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    tracing::info!("Input closed");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    tracing::debug!("<<< {}", redact_token(trimmed));

                    match parse_command(trimmed) {
                        Ok(cmd) => {
                            if tx.send(cmd).await.is_err() {
                                return;
                            }
                        }
                        Err(UciError::UnknownCommand(cmd)) => {
                            tracing::debug!("Ignoring unknown command: {}", cmd);
                        }
                        Err(e) => tracing::warn!("{}", e),
                    }
                }
                Err(e) => {
                    tracing::error!("Error reading input: {}", e);
                    break;
                }
            }
        }

        let _ = tx.send(UciCommand::Quit).await;
    })
}

/// Hide the value of `setoption name LichessToken value ...`.
fn redact_token(line: &str) -> Cow<'_, str> {
    let lower = line.to_ascii_lowercase();
    if lower.starts_with("setoption") && lower.contains("lichesstoken") {
        if let Some(at) = lower.find(" value") {
            return Cow::Owned(format!("{} value <redacted>", &line[..at]));
        }
    }
    Cow::Borrowed(line)
}
