use std::io;
use std::sync::Arc;

use lichess_client::Connector;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::cancel::CancelSignal;
use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::init::WarmUp;
use crate::options::Options;
use crate::output::spawn_output_writer;
use crate::reader::spawn_command_reader;
use crate::session::{self, Session};
use crate::worker::Worker;

const COMMAND_QUEUE: usize = 64;

/// A UCI engine whose moves come from a Lichess game.
pub struct Bridge {
    config: BridgeConfig,
    connector: Arc<dyn Connector>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    /// Speak UCI over `input`/`output` until `quit` or end of input.
    ///
    /// After `quit` the worker gets `shutdown_grace` to leave the current
    /// game; whatever it has not finished by then is dropped.
    pub async fn run<R, W>(self, input: R, output: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let Bridge { config, connector } = self;
        tracing::info!(?config, "Bridge starting");

        let mut options = Options::default();
        if let Some(token) = &config.default_token {
            options.token = token.clone();
        }
        let mut initial = Session::new(options);
        initial.debug = config.debug;
        let session = session::shared(initial);
        let cancel = CancelSignal::new();

        let (out, writer) = spawn_output_writer(output);
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);

        let worker = Worker::new(
            session.clone(),
            connector.clone(),
            cancel.clone(),
            out.clone(),
            config.clone(),
        );
        let worker = tokio::spawn(worker.run(work_rx));
        let reader = spawn_command_reader(input, cmd_tx);

        let dispatcher = Dispatcher::new(session, cancel, out, work_tx, WarmUp::new(connector));
        // Returns after `quit`, dropping the work sender and our output handle.
        dispatcher.run(cmd_rx).await;
        reader.abort();

        match tokio::time::timeout(config.shutdown_grace, worker).await {
            Ok(Ok(())) => tracing::debug!("Worker finished"),
            Ok(Err(e)) => tracing::error!("Worker task failed: {}", e),
            Err(_) => tracing::warn!(
                "Worker did not finish within {:?}, exiting anyway",
                config.shutdown_grace
            ),
        }

        match tokio::time::timeout(config.shutdown_grace, writer).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(io::Error::other(e)),
            Err(_) => {
                tracing::warn!("Output writer did not finish");
                Ok(())
            }
        }
    }
}
