//! The single writer of protocol lines

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use uci::UciResponse;

/// Cloneable sender of whole protocol lines.
#[derive(Debug, Clone)]
pub struct OutputHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl OutputHandle {
    pub fn send(&self, response: UciResponse) {
        self.send_line(response.to_string());
    }

    fn send_line(&self, line: String) {
        // The writer only goes away once every handle is dropped.
        let _ = self.tx.send(line);
    }

    pub fn info(&self, msg: impl Into<String>) {
        self.send(UciResponse::info(msg));
    }
}

/// Spawn the writer task. It ends, after flushing, once every handle has
/// been dropped.
pub fn spawn_output_writer<W>(writer: W) -> (OutputHandle, JoinHandle<std::io::Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_output_writer(writer, rx));
    (OutputHandle { tx }, task)
}

async fn run_output_writer<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<String>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        tracing::debug!(">>> {}", line);
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}
