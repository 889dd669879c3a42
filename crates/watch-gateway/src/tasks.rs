//! Bounded task pool
//!
//! Server messages are handled on spawned tasks, at most `size` at a time. The
//! caller waits for a free slot before spawning, so a burst backs up in the inbox
//! rather than in the runtime.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl TaskPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Spawn `task` once a slot is free
    ///
    /// Returns `None` after [`Self::close`].
    pub async fn spawn<F>(&self, task: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self.permits.clone().acquire_owned().await.ok()?;
        Some(tokio::spawn(async move {
            task.await;
            drop(permit);
        }))
    }

    /// Tasks currently running
    pub fn active(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Refuse new tasks; running ones finish normally
    pub fn close(&self) {
        self.permits.close();
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("size", &self.size)
            .field("active", &self.active())
            .finish()
    }
}
