use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam::channel::{self, Receiver, TryRecvError};
use tracing::debug;

use crate::constants::MAX_TASK_QUEUE_CAPACITY;
use crate::error::{ReduceError, Result};

enum TaskState<T> {
    Ready(Result<T>),
    Pending(Receiver<Result<T>>),
}

/// A unit of submitted work and its pending result.
pub struct AsyncTask<T> {
    id: u64,
    state: TaskState<T>,
}

impl<T> AsyncTask<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_finished(&mut self) -> bool {
        if let TaskState::Pending(receiver) = &mut self.state {
            match receiver.try_recv() {
                Ok(result) => self.state = TaskState::Ready(result),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => {
                    self.state = TaskState::Ready(Err(lost_result(self.id)))
                }
            }
        }
        true
    }

    /// Blocks the calling thread until the result is available. Safe on
    /// async runtime threads too; the wait is a plain channel receive.
    pub fn wait(self) -> Result<T> {
        match self.state {
            TaskState::Ready(result) => result,
            TaskState::Pending(receiver) => receiver
                .recv()
                .map_err(|_| lost_result(self.id))?,
        }
    }
}

fn lost_result(id: u64) -> ReduceError {
    ReduceError::task(format!("task {} finished without a result", id))
}

/// Fixed-capacity FIFO of in-flight tasks.
///
/// At most `capacity` tasks are ever outstanding. Submitting to a full queue
/// waits for the oldest task and hands its result back, so results always
/// come out in submission order. With capacity 1 every task runs on the
/// calling thread at submission.
pub struct AsyncTaskQueue<T> {
    name: String,
    capacity: usize,
    pool: Option<rayon::ThreadPool>,
    in_flight: VecDeque<AsyncTask<T>>,
    next_id: u64,
}

impl<T: Send + 'static> AsyncTaskQueue<T> {
    pub fn new(name: &str, capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_TASK_QUEUE_CAPACITY {
            return Err(ReduceError::config(format!(
                "Task queue capacity must be between 1 and {}, got {}",
                MAX_TASK_QUEUE_CAPACITY, capacity
            )));
        }

        let pool = if capacity > 1 {
            let prefix = name.to_string();
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(capacity)
                .thread_name(move |i| format!("{}-{}", prefix, i))
                .build()
                .map_err(|e| ReduceError::task(format!("failed to start worker pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        debug!(queue = name, capacity, "created task queue");

        Ok(Self {
            name: name.to_string(),
            capacity,
            pool,
            in_flight: VecDeque::with_capacity(capacity),
            next_id: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Submits `work`. Returns `None` while a slot is free; otherwise waits
    /// for the oldest task, returns its result and gives its slot to `work`.
    ///
    /// The new task is queued even when the evicted one failed.
    pub fn push_and_optional_pop<F>(&mut self, work: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let evicted = if self.in_flight.len() >= self.capacity {
            self.in_flight.pop_front()
        } else {
            None
        };

        // Run before queuing so the evicted slot is free before `work` starts.
        let evicted = evicted.map(AsyncTask::wait).transpose();
        let task = self.submit(work);
        self.in_flight.push_back(task);
        evicted
    }

    /// Waits for the oldest in-flight task, if any.
    pub fn pop(&mut self) -> Result<Option<T>> {
        self.in_flight.pop_front().map(AsyncTask::wait).transpose()
    }

    /// Waits for every in-flight task, oldest first. Stops at the first
    /// failure; the remaining tasks stay queued.
    pub fn pop_all(&mut self) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(self.in_flight.len());
        while let Some(result) = self.pop()? {
            results.push(result);
        }
        Ok(results)
    }

    fn submit<F>(&mut self, work: F) -> AsyncTask<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;

        let state = match &self.pool {
            None => TaskState::Ready(run_guarded(id, work)),
            Some(pool) => {
                let (sender, receiver) = channel::bounded(1);
                pool.spawn(move || {
                    // The queue may have been dropped; nobody is waiting then.
                    let _ = sender.send(run_guarded(id, work));
                });
                TaskState::Pending(receiver)
            }
        };
        AsyncTask { id, state }
    }
}

fn run_guarded<T, F>(id: u64, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    catch_unwind(AssertUnwindSafe(work))
        .unwrap_or_else(|_| Err(ReduceError::task(format!("task {} panicked", id))))
}

impl<T> std::fmt::Debug for AsyncTaskQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTaskQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_results_come_back_in_submission_order() {
        let mut queue = AsyncTaskQueue::new("order", 3).unwrap();
        let mut results = Vec::new();
        for i in 0..8u64 {
            // Earlier tasks sleep longer so they finish last.
            let delay = Duration::from_millis(40 - i * 5);
            if let Some(done) = queue
                .push_and_optional_pop(move || {
                    thread::sleep(delay);
                    Ok(i)
                })
                .unwrap()
            {
                results.push(done);
            }
        }
        assert_eq!(queue.len(), 3);
        results.extend(queue.pop_all().unwrap());
        assert_eq!(results, (0..8).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_never_more_than_capacity_in_flight() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut queue = AsyncTaskQueue::new("bounded", 2).unwrap();

        for _ in 0..10 {
            let running = running.clone();
            let peak = peak.clone();
            queue
                .push_and_optional_pop(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
            assert!(queue.len() <= 2);
        }
        queue.pop_all().unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_capacity_one_runs_on_caller_thread() {
        let mut queue = AsyncTaskQueue::new("sync", 1).unwrap();
        let caller = thread::current().id();

        assert!(queue
            .push_and_optional_pop(move || Ok(thread::current().id() == caller))
            .unwrap()
            .is_none());
        assert_eq!(queue.push_and_optional_pop(|| Ok(false)).unwrap(), Some(true));
        assert_eq!(queue.pop().unwrap(), Some(false));
        assert_eq!(queue.pop().unwrap(), None);
    }

    #[test]
    fn test_failures_surface_when_popped() {
        let mut queue: AsyncTaskQueue<u32> = AsyncTaskQueue::new("errors", 2).unwrap();
        queue
            .push_and_optional_pop(|| Err(ReduceError::invalid_state("boom")))
            .unwrap();
        queue.push_and_optional_pop(|| Ok(1)).unwrap();

        let evicted = queue.push_and_optional_pop(|| Ok(2));
        assert!(matches!(evicted, Err(ReduceError::InvalidState { .. })));
        assert_eq!(queue.pop_all().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_panicking_task_becomes_error() {
        let mut queue: AsyncTaskQueue<u32> = AsyncTaskQueue::new("panics", 2).unwrap();
        queue.push_and_optional_pop(|| panic!("task exploded")).unwrap();
        assert!(matches!(queue.pop(), Err(ReduceError::Task { .. })));
    }

    #[test]
    fn test_capacity_bounds() {
        assert!(AsyncTaskQueue::<()>::new("zero", 0).is_err());
        assert!(AsyncTaskQueue::<()>::new("huge", MAX_TASK_QUEUE_CAPACITY + 1).is_err());
    }

    #[test]
    fn test_is_finished_polls_without_blocking() {
        let mut queue = AsyncTaskQueue::new("poll", 2).unwrap();
        queue.push_and_optional_pop(|| Ok(7)).unwrap();
        let mut task = queue.in_flight.pop_front().unwrap();
        while !task.is_finished() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(task.id(), 0);
        assert_eq!(task.wait().unwrap(), 7);
    }
}
