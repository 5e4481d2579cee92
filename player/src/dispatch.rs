//! UI-thread execution
//!
//! Drawable acquisition, surface resizing and client notifications must
//! run on the thread that owns the host surface. Hosts provide that thread
//! through [`UiDispatcher`]; [`UiThread`] is a dedicated stand-in for hosts
//! without an event loop of their own.

use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// Schedules work on the UI thread.
///
/// Tasks submitted from one thread must run in submission order.
pub trait UiDispatcher: Send + Sync {
    fn dispatch(&self, task: UiTask);
}

/// Runs every task inline on the calling thread.
///
/// Suitable for hosts whose surface is not thread-affine, and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateDispatcher;

impl UiDispatcher for ImmediateDispatcher {
    fn dispatch(&self, task: UiTask) {
        task();
    }
}

/// A dedicated thread draining a FIFO task queue.
pub struct UiThread {
    sender: Option<mpsc::Sender<UiTask>>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl UiThread {
    pub fn spawn() -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<UiTask>();
        let handle = thread::Builder::new()
            .name("alphaplay-ui".into())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task();
                }
                log::debug!("UI thread exiting");
            })?;
        let thread_id = handle.thread().id();

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            thread_id,
        })
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl UiDispatcher for UiThread {
    fn dispatch(&self, task: UiTask) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(task).is_err() {
            log::warn!("UI thread is gone, dropping task");
        }
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        // Closing the channel lets the loop finish queued work and exit
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if self.is_current() {
                return;
            }
            if handle.join().is_err() {
                log::error!("UI thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_immediate_runs_inline() {
        let hit = Arc::new(Mutex::new(None));
        let hit_clone = Arc::clone(&hit);
        ImmediateDispatcher.dispatch(Box::new(move || {
            *hit_clone.lock().unwrap() = Some(thread::current().id());
        }));
        assert_eq!(*hit.lock().unwrap(), Some(thread::current().id()));
    }

    #[test]
    fn test_ui_thread_preserves_order_and_affinity() {
        let ui = UiThread::spawn().unwrap();
        let ui_id = ui.thread_id();
        let (tx, rx) = mpsc::channel();

        for i in 0..50 {
            let tx = tx.clone();
            ui.dispatch(Box::new(move || {
                tx.send((i, thread::current().id())).unwrap();
            }));
        }

        for expected in 0..50 {
            let (i, id) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(i, expected);
            assert_eq!(id, ui_id);
        }
    }

    #[test]
    fn test_drop_drains_queue() {
        let count = Arc::new(Mutex::new(0));
        {
            let ui = UiThread::spawn().unwrap();
            for _ in 0..10 {
                let count = Arc::clone(&count);
                ui.dispatch(Box::new(move || *count.lock().unwrap() += 1));
            }
        }
        assert_eq!(*count.lock().unwrap(), 10);
    }
}
