//! Bounded accumulate-and-flush buffer.
//!
//! Amortizes expensive writes: items accumulate under a lock, and once the
//! buffer reaches the configured threshold it is atomically swapped for an
//! empty one and drained into a caller-supplied sink.

use std::time::Instant;

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::debug;

type Sink<T> = Box<dyn Fn(Vec<T>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Generic bounded buffer feeding an async sink.
pub struct Batcher<T> {
    buf: Mutex<Vec<T>>,
    capacity: usize,
    sink: Sink<T>,
}

impl<T: Send + 'static> Batcher<T> {
    /// Create a batcher that drains into `sink` every `capacity` items.
    pub fn new<F, Fut>(capacity: usize, sink: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            buf: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            sink: Box::new(move |items| Box::pin(sink(items))),
        }
    }

    /// Append an item, draining to the sink once the threshold is reached.
    pub async fn add(&self, item: T) {
        let drained = {
            let mut buf = self.buf.lock().await;
            buf.push(item);
            if buf.len() >= self.capacity { Some(std::mem::take(&mut *buf)) } else { None }
        };
        if let Some(items) = drained {
            self.run_sink(items).await;
        }
    }

    /// Drain whatever is buffered. Safe to call with zero buffered items.
    pub async fn flush(&self) {
        let items = std::mem::take(&mut *self.buf.lock().await);
        self.run_sink(items).await;
    }

    /// Number of currently buffered items.
    pub async fn len(&self) -> usize {
        self.buf.lock().await.len()
    }

    async fn run_sink(&self, items: Vec<T>) {
        if items.is_empty() {
            debug!("Flush with empty buffer, nothing to do");
            return;
        }
        let count = items.len();
        let started = Instant::now();
        (self.sink)(items).await;
        debug!("Flushed {} items in {:?}", count, started.elapsed());
    }
}
