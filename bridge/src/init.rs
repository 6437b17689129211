//! One-shot background warm-up of the remote client

use std::sync::{Arc, Once};

use lichess_client::Connector;

/// Starts the connector's heavy setup at most once, off the command path.
pub struct WarmUp {
    once: Once,
    connector: Arc<dyn Connector>,
}

impl WarmUp {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            once: Once::new(),
            connector,
        }
    }

    /// Returns immediately; the work runs on a spawned task.
    pub fn trigger(&self) {
        self.once.call_once(|| {
            let connector = self.connector.clone();
            tokio::spawn(async move {
                connector.warm_up().await;
                tracing::debug!("Remote client ready");
            });
        });
    }
}
