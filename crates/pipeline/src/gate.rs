use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative pause/resume barrier gating both engine advancement and
/// the pipeline commit point. Cloned handles share one switch; pausing
/// and resuming are idempotent, and resuming releases every waiter
/// (including on shutdown).
#[derive(Clone, Debug)]
pub struct PauseGate {
    running: Arc<watch::Sender<bool>>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(true);
        Self {
            running: Arc::new(tx),
        }
    }

    pub fn pause(&self) {
        self.running.send_replace(false);
    }

    pub fn resume(&self) {
        self.running.send_replace(true);
    }

    pub fn is_paused(&self) -> bool {
        !*self.running.borrow()
    }

    /// Suspends until the gate is open. Returns immediately when not
    /// paused.
    pub async fn wait(&self) {
        let mut rx = self.running.subscribe();
        // The sender lives in self, so the channel cannot close.
        let _ = rx.wait_for(|running| *running).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn open_gate_does_not_block() {
        let gate = PauseGate::new();
        tokio::time::timeout(Duration::from_millis(50), gate.wait())
            .await
            .expect("open gate");
    }

    #[tokio::test]
    async fn paused_gate_blocks_until_resume() {
        let gate = PauseGate::new();
        gate.pause();
        assert!(gate.is_paused());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        gate.resume();
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("resumed")
            .expect("join");
    }

    #[tokio::test]
    async fn pause_and_resume_are_idempotent() {
        let gate = PauseGate::new();
        gate.pause();
        gate.pause();
        gate.resume();
        gate.resume();
        assert!(!gate.is_paused());
        gate.wait().await;
    }
}
