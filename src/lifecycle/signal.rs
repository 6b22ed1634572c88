//! Signal subscription for the exit path

use tokio::signal::unix::{signal, Signal, SignalKind};

/// Errors from installing signal handlers
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("failed to register signal handler: {0}")]
    Subscribe(#[from] std::io::Error),
}

/// The conventional daemon shutdown set: SIGINT and SIGTERM
pub fn default_signals() -> Vec<SignalKind> {
    vec![SignalKind::interrupt(), SignalKind::terminate()]
}

/// Subscribed signal streams for a set of signal kinds
pub struct SignalListener {
    streams: Vec<(i32, Signal)>,
}

impl SignalListener {
    /// Subscribe to the given signal kinds
    pub fn subscribe(kinds: &[SignalKind]) -> Result<Self, SignalError> {
        let mut streams = Vec::with_capacity(kinds.len());
        for kind in kinds {
            streams.push((kind.as_raw_value(), signal(*kind)?));
        }
        Ok(Self { streams })
    }

    /// Resolve to the raw number of the first signal delivered
    ///
    /// An empty subscription never resolves: no qualifying signal can
    /// arrive. `None` means every stream closed without delivering.
    pub async fn recv(self) -> Option<i32> {
        if self.streams.is_empty() {
            futures::future::pending::<()>().await;
        }

        let waits: Vec<_> = self
            .streams
            .into_iter()
            .map(|(number, mut stream)| Box::pin(async move { stream.recv().await.map(|_| number) }))
            .collect();

        let (first, _, _) = futures::future::select_all(waits).await;
        first
    }
}
