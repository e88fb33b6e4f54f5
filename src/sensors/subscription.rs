//! Cancellable sensor stream consumers.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handle to a running stream consumer.
///
/// The consumer stops when [`Subscription::unsubscribe`] is called, when the
/// handle is dropped, or when every sender of the stream is gone.
#[derive(Debug)]
pub struct Subscription {
    name: &'static str,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Spawns a thread that feeds every item from `stream` to `on_item`.
    pub fn spawn<T, F>(name: &'static str, stream: Receiver<T>, mut on_item: F) -> Self
    where
        T: Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name(format!("{name}-stream"))
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    match stream.recv_timeout(POLL_INTERVAL) {
                        Ok(item) => on_item(item),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            tracing::debug!(stream = name, "Sensor stream closed");
                            break;
                        }
                    }
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(stream = name, error = %e, "Failed to spawn stream consumer");
                None
            }
        };

        tracing::debug!(stream = name, "Subscribed to sensor stream");
        Self { name, stop, handle }
    }

    /// Returns true while the consumer thread is running.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the consumer and waits for it to exit.
    pub fn unsubscribe(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!(stream = self.name, "Sensor stream consumer panicked");
            } else {
                tracing::debug!(stream = self.name, "Unsubscribed from sensor stream");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}
