// ── Update coalescer ──
//
// Collapses bursts of configuration-change requests into one flush per
// quiescent window. One timer per bridge: the window starts at the first
// request, later requests only add their endpoint to the pending set.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::endpoint::EndpointId;

/// What happened to an enqueued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Started a new window.
    Scheduled,
    /// Joined the pending window.
    Coalesced,
    /// Updates are gated until the primary endpoint advertises.
    Dropped,
}

#[derive(Debug, Default)]
struct State {
    enabled: bool,
    pending: BTreeSet<EndpointId>,
    timer: Option<JoinHandle<()>>,
}

#[derive(Debug)]
pub struct UpdateCoalescer {
    window: Duration,
    state: Mutex<State>,
    flush_tx: mpsc::UnboundedSender<()>,
}

impl UpdateCoalescer {
    /// The receiver yields one `()` per elapsed window.
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        let coalescer = Self {
            window,
            state: Mutex::new(State::default()),
            flush_tx,
        };
        (coalescer, flush_rx)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn enable(&self) {
        self.state.lock().await.enabled = true;
    }

    /// Gate updates again and forget anything pending.
    pub async fn disable(&self) {
        let mut state = self.state.lock().await;
        state.enabled = false;
        state.pending.clear();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.enabled
    }

    pub async fn enqueue(&self, endpoint: EndpointId) -> Enqueued {
        let mut state = self.state.lock().await;
        if !state.enabled {
            debug!(%endpoint, "update dropped, primary endpoint not advertising");
            return Enqueued::Dropped;
        }

        state.pending.insert(endpoint);
        if state.timer.as_ref().is_some_and(|t| !t.is_finished()) {
            return Enqueued::Coalesced;
        }

        let window = self.window;
        let flush_tx = self.flush_tx.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = flush_tx.send(());
        }));
        debug!(window_ms = window.as_millis(), "update scheduled");
        Enqueued::Scheduled
    }

    /// Drain the pending set when a window elapses.
    pub async fn take_pending(&self) -> BTreeSet<EndpointId> {
        let mut state = self.state.lock().await;
        state.timer = None;
        std::mem::take(&mut state.pending)
    }

    pub async fn is_pending(&self) -> bool {
        !self.state.lock().await.pending.is_empty()
    }
}

impl Drop for UpdateCoalescer {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::AccessoryId;

    const WINDOW: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn dropped_until_enabled() {
        let (coalescer, mut rx) = UpdateCoalescer::new(WINDOW);
        assert_eq!(coalescer.enqueue(EndpointId::Primary).await, Enqueued::Dropped);
        tokio::time::sleep(WINDOW * 2).await;
        assert!(rx.try_recv().is_err());
        assert!(!coalescer.is_pending().await);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_fires_once() {
        let (coalescer, mut rx) = UpdateCoalescer::new(WINDOW);
        coalescer.enable().await;

        assert_eq!(coalescer.enqueue(EndpointId::Primary).await, Enqueued::Scheduled);
        for _ in 0..4 {
            assert_eq!(coalescer.enqueue(EndpointId::Primary).await, Enqueued::Coalesced);
        }
        coalescer
            .enqueue(EndpointId::External(AccessoryId::from("tv")))
            .await;

        rx.recv().await.unwrap();
        let pending = coalescer.take_pending().await;
        assert_eq!(pending.len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn window_measured_from_first_request() {
        let (coalescer, mut rx) = UpdateCoalescer::new(WINDOW);
        coalescer.enable().await;
        coalescer.enqueue(EndpointId::Primary).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        coalescer.enqueue(EndpointId::Primary).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn new_window_after_flush() {
        let (coalescer, mut rx) = UpdateCoalescer::new(WINDOW);
        coalescer.enable().await;
        coalescer.enqueue(EndpointId::Primary).await;
        rx.recv().await.unwrap();
        coalescer.take_pending().await;
        assert_eq!(coalescer.enqueue(EndpointId::Primary).await, Enqueued::Scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_cancels_pending_timer() {
        let (coalescer, mut rx) = UpdateCoalescer::new(WINDOW);
        coalescer.enable().await;
        coalescer.enqueue(EndpointId::Primary).await;
        coalescer.disable().await;
        tokio::time::sleep(WINDOW * 2).await;
        assert!(rx.try_recv().is_err());
        assert!(!coalescer.is_pending().await);
    }
}
