//! Fixed-size worker pool that runs cascade work off store notification threads.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::types::{Result, SessionError};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn finish_one(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Bounded pool of named worker threads.
///
/// [`CascadeExecutor::execute`] never blocks the submitter. Completion is
/// observable through [`CascadeExecutor::await_idle`].
pub struct CascadeExecutor {
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<Pending>,
}

impl CascadeExecutor {
    /// Spawns `workers` threads named `{name}-{index}`.
    pub fn spawn(name: &str, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(SessionError::Config("cascade workers must be at least 1".into()));
        }
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new(Pending {
            count: Mutex::new(0),
            idle: Condvar::new(),
        });
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let receiver = Arc::clone(&receiver);
            let pending = Arc::clone(&pending);
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(receiver, pending))?;
            handles.push(handle);
        }
        debug!(workers, name, "executor.spawned");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            pending,
        })
    }

    /// Queues `task`. After shutdown the task is dropped without running.
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            warn!("executor.execute.after_shutdown");
            return;
        };
        *self.pending.count.lock() += 1;
        if sender.send(Box::new(task)).is_err() {
            self.pending.finish_one();
            warn!("executor.execute.disconnected");
        }
    }

    /// Number of queued or running tasks.
    pub fn pending(&self) -> usize {
        *self.pending.count.lock()
    }

    /// Blocks until every submitted task has finished or `timeout` elapses.
    /// Returns whether the pool went idle.
    pub fn await_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.pending.count.lock();
        while *count > 0 {
            if self.pending.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    /// Stops accepting work, lets queued tasks finish, and joins the workers.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("executor.worker.join_failed");
            }
        }
    }

    /// Whether [`CascadeExecutor::shutdown`] has run.
    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Drop for CascadeExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Task>>>, pending: Arc<Pending>) {
    loop {
        let task = {
            let receiver = receiver.lock();
            receiver.recv()
        };
        let Ok(task) = task else {
            break;
        };
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("executor.task.panicked");
        }
        pending.finish_one();
    }
}
