use tokio::sync::mpsc;
use tracing::{info, warn};

/// Free-text progress feed for an attached front end.
///
/// Every line is logged through `tracing`; when a front end is attached the
/// same line is forwarded over its channel. A closed channel is ignored so a
/// departed front end never fails a run.
#[derive(Clone, Debug, Default)]
pub struct Progress {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl Progress {
    /// Log-only progress.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn line(&self, msg: impl Into<String>) {
        let msg = msg.into();
        info!("{}", msg);
        self.forward(msg);
    }

    pub fn warn(&self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("{}", msg);
        self.forward(msg);
    }

    fn forward(&self, msg: String) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(msg);
        }
    }
}
