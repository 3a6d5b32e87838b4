//! Ordered group of supervisor tasks.

use futures::future::join_all;
use std::future::Future;
use tokio::task::{JoinError, JoinHandle};

/// A group of tasks joined in insertion order.
///
/// Tasks still running when the group is dropped are aborted, so an
/// orchestration call that is itself dropped (or panics) does not leave
/// supervisors behind. Supervisors own their child processes with
/// `kill_on_drop`, so aborting a task also kills its process.
pub struct OrderedTaskGroup<T> {
    handles: Vec<JoinHandle<T>>,
}

impl<T: Send + 'static> OrderedTaskGroup<T> {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Spawns a task and returns its position in the group.
    pub fn spawn<F>(&mut self, task: F) -> usize
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.handles.push(tokio::spawn(task));
        self.handles.len() - 1
    }

    /// Returns the number of tasks in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if no task was spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every task, returning results in spawn order regardless of
    /// completion order.
    pub async fn join(&mut self) -> Vec<Result<T, JoinError>> {
        let results = join_all(self.handles.iter_mut()).await;
        self.handles.clear();
        results
    }
}

impl<T: Send + 'static> Default for OrderedTaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for OrderedTaskGroup<T> {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl<T> std::fmt::Debug for OrderedTaskGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedTaskGroup")
            .field("task_count", &self.handles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_in_spawn_order() {
        let mut group = OrderedTaskGroup::new();

        group.spawn(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            0
        });
        group.spawn(async { 1 });
        group.spawn(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            2
        });

        let results: Vec<i32> = group.join().await.into_iter().map(Result::unwrap).collect();
        assert_eq!(results, vec![0, 1, 2]);
        assert!(group.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_task_reported_as_join_error() {
        let mut group = OrderedTaskGroup::new();
        group.spawn(async { 1 });
        group.spawn(async {
            panic!("Intentional panic");
        });

        let results = group.join().await;
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is_panic());
    }

    #[tokio::test]
    async fn test_drop_aborts_running_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut group = OrderedTaskGroup::new();

        let counter_clone = counter.clone();
        group.spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(group.len(), 1);

        drop(group);
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Task never reached its increment
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
