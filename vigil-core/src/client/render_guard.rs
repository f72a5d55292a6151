//! Render guard: keeps renders of one view from overlapping.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

/// Busy flag plus a single pending slot.
///
/// While a render is in flight, newer items are parked; only the most recent
/// parked item survives and is rendered once the current render finishes.
#[derive(Debug)]
pub struct RenderGuard<T> {
    state: Mutex<GuardState<T>>,
}

#[derive(Debug)]
struct GuardState<T> {
    busy: bool,
    pending: Option<T>,
}

impl<T> RenderGuard<T> {
    pub fn new() -> Self {
        Self { state: Mutex::new(GuardState { busy: false, pending: None }) }
    }

    /// Offer a new item.
    ///
    /// Returns the item back when the caller should render it now (the guard
    /// is then busy). Returns `None` when a render is in flight; the item
    /// replaces whatever was parked.
    pub async fn offer(&self, item: T) -> Option<T> {
        let mut state = self.state.lock().await;
        if state.busy {
            state.pending = Some(item);
            None
        } else {
            state.busy = true;
            Some(item)
        }
    }

    /// Mark the current render as done.
    ///
    /// Returns the parked item if there is one; the guard stays busy and the
    /// caller renders it next. Otherwise the guard goes idle.
    pub async fn finish(&self) -> Option<T> {
        let mut state = self.state.lock().await;
        match state.pending.take() {
            Some(next) => Some(next),
            None => {
                state.busy = false;
                None
            }
        }
    }

    pub async fn is_busy(&self) -> bool {
        self.state.lock().await.busy
    }
}

impl<T> Default for RenderGuard<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that draws one item, e.g. a terminal view of a snapshot.
#[async_trait]
pub trait Render<T>: Send + Sync + 'static {
    async fn render(&self, item: T) -> Result<()>;
}

/// Drives a [`Render`] implementation through a [`RenderGuard`].
pub struct ViewWorker<T, R> {
    name: &'static str,
    guard: Arc<RenderGuard<T>>,
    renderer: Arc<R>,
}

impl<T, R> ViewWorker<T, R>
where
    T: Send + 'static,
    R: Render<T>,
{
    pub fn new(name: &'static str, renderer: R) -> Self {
        Self { name, guard: Arc::new(RenderGuard::new()), renderer: Arc::new(renderer) }
    }

    /// Submit an item for rendering.
    ///
    /// Starts a render task when the view is idle and returns its handle. The
    /// task keeps draining the pending slot until nothing is left. Render
    /// failures are logged and do not stop the task.
    pub async fn submit(&self, item: T) -> Option<JoinHandle<()>> {
        let first = self.guard.offer(item).await?;
        let guard = Arc::clone(&self.guard);
        let renderer = Arc::clone(&self.renderer);
        let name = self.name;

        Some(tokio::spawn(async move {
            let mut current = first;
            loop {
                if let Err(e) = renderer.render(current).await {
                    warn!(view = name, error = %e, "Render failed");
                }
                match guard.finish().await {
                    Some(next) => current = next,
                    None => break,
                }
            }
        }))
    }

    pub async fn is_busy(&self) -> bool {
        self.guard.is_busy().await
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VigilError;
    use tokio::sync::Semaphore;

    #[tokio::test]
    async fn test_guard_offer_and_finish() {
        let guard = RenderGuard::new();
        assert_eq!(guard.offer(1).await, Some(1));
        assert!(guard.is_busy().await);

        // parked while busy, latest wins
        assert_eq!(guard.offer(2).await, None);
        assert_eq!(guard.offer(3).await, None);

        assert_eq!(guard.finish().await, Some(3));
        assert!(guard.is_busy().await);
        assert_eq!(guard.finish().await, None);
        assert!(!guard.is_busy().await);

        assert_eq!(guard.offer(4).await, Some(4));
    }

    struct Recorder {
        seen: Mutex<Vec<u32>>,
        gate: Semaphore,
    }

    /// Blocks every render until permits are added.
    fn recorder() -> Recorder {
        Recorder { seen: Mutex::new(Vec::new()), gate: Semaphore::new(0) }
    }

    #[async_trait]
    impl Render<u32> for Recorder {
        async fn render(&self, item: u32) -> Result<()> {
            let _permit = self.gate.acquire().await.map_err(VigilError::internal)?;
            self.seen.lock().await.push(item);
            if item == 13 {
                return Err(VigilError::Internal("bad card".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_worker_renders_latest_pending_once() {
        let worker = ViewWorker::new("test", recorder());

        let handle = worker.submit(1).await.expect("idle view starts a render");
        assert!(worker.submit(2).await.is_none());
        assert!(worker.submit(3).await.is_none());

        worker.renderer().gate.add_permits(10);
        handle.await.unwrap();

        assert_eq!(*worker.renderer().seen.lock().await, vec![1, 3]);
        assert!(!worker.is_busy().await);
    }

    #[tokio::test]
    async fn test_worker_survives_render_error() {
        let worker = ViewWorker::new("test", recorder());

        let handle = worker.submit(13).await.unwrap();
        assert!(worker.submit(14).await.is_none());
        worker.renderer().gate.add_permits(10);
        handle.await.unwrap();

        assert_eq!(*worker.renderer().seen.lock().await, vec![13, 14]);
        assert!(worker.submit(15).await.is_some());
    }
}
