//! Host application activity events
//!
//! Hosts publish foreground/background transitions on a
//! [`LifecycleNotifier`]. A [`LifecycleObserver`] subscribes for as long as
//! it lives and unsubscribes when dropped.

use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{broadcast, oneshot};

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    WillResignActive,
    DidBecomeActive,
}

/// Fan-out source of lifecycle events
#[derive(Debug, Clone)]
pub struct LifecycleNotifier {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Returns the number of observers it reached.
    pub fn notify(&self, event: LifecycleEvent) -> usize {
        log::debug!("Lifecycle event {:?}", event);
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LifecycleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

pub type LifecycleHandler = Arc<dyn Fn(LifecycleEvent) + Send + Sync>;

/// Delivers lifecycle events to a handler on a dedicated thread
pub struct LifecycleObserver {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl LifecycleObserver {
    /// Subscribe immediately; events published after this returns are delivered
    pub fn spawn(notifier: &LifecycleNotifier, handler: LifecycleHandler) -> std::io::Result<Self> {
        let mut events = notifier.subscribe();
        let (shutdown, mut shutdown_rx) = oneshot::channel();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let handle = thread::Builder::new()
            .name("alphaplay-lifecycle".into())
            .spawn(move || {
                runtime.block_on(async move {
                    loop {
                        tokio::select! {
                            _ = &mut shutdown_rx => break,
                            received = events.recv() => match received {
                                Ok(event) => handler(event),
                                Err(broadcast::error::RecvError::Lagged(missed)) => {
                                    log::warn!("Lifecycle observer missed {} events", missed);
                                }
                                Err(broadcast::error::RecvError::Closed) => break,
                            },
                        }
                    }
                });
                log::debug!("Lifecycle observer stopped");
            })?;
        let thread_id = handle.thread().id();

        Ok(Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
            thread_id,
        })
    }
}

impl Drop for LifecycleObserver {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Lifecycle observer panicked");
            }
        }
    }
}
