//! One-way stop signals between tasks.

use tokio::sync::watch;

/// Sending half of a stop signal. Once fired it cannot be recalled.
#[derive(Debug)]
pub struct ShutdownController(watch::Sender<bool>);

/// Receiving half of a stop signal.
#[derive(Debug, Clone)]
pub struct ShutdownReceiver(watch::Receiver<bool>);

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self(sender)
    }

    pub fn subscribe(&self) -> ShutdownReceiver {
        ShutdownReceiver(self.0.subscribe())
    }

    /// Fires the signal. Dropping the controller has the same effect.
    pub fn shutdown(self) {
        self.0.send_replace(true);
    }
}

impl ShutdownReceiver {
    /// Resolves once the signal has been fired or the controller dropped.
    pub async fn wait(&mut self) {
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn fires_all_receivers() {
        let controller = ShutdownController::new();
        let mut first = controller.subscribe();
        let mut second = first.clone();

        controller.shutdown();

        first.wait().await;
        second.wait().await;
    }

    #[tokio::test]
    async fn dropping_controller_counts_as_shutdown() {
        let controller = ShutdownController::new();
        let mut receiver = controller.subscribe();
        drop(controller);
        receiver.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn waits_until_fired() {
        let controller = ShutdownController::new();
        let mut receiver = controller.subscribe();

        let pending = tokio::time::timeout(Duration::from_secs(1), receiver.wait()).await;
        assert!(pending.is_err());

        controller.shutdown();
        receiver.wait().await;
    }
}
