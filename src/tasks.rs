//! Interval-driven FIFO task queue.
//!
//! `TaskProcessor` holds deferred closures and runs at most one of them per tick.
//! The tick is a single self-rescheduling timer: it sleeps for the configured
//! interval, runs the head of the queue (if any), then sleeps again. Two tasks
//! never overlap and the queue drains at one task per interval.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

type Job = Box<dyn FnOnce() -> Result<(), String> + Send>;

/// A named, zero-argument unit of deferred work.
pub struct Task {
    name: String,
    job: Job,
}

impl Task {
    pub fn new<F>(name: impl Into<String>, job: F) -> Self
    where
        F: FnOnce() -> Result<(), String> + Send + 'static,
    {
        Self {
            name: name.into(),
            job: Box::new(job),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the job. A panic is caught and reported as an error.
    fn run(self) -> Result<(), String> {
        let job = self.job;
        panic::catch_unwind(AssertUnwindSafe(job))
            .unwrap_or_else(|payload| Err(format!("panicked: {}", panic_message(&*payload))))
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Task").field("name", &self.name).finish()
    }
}

/// What the processing loop does when a task returns an error or panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskFailurePolicy {
    /// Log the error and keep draining the queue.
    #[default]
    LogAndContinue,
    /// Log the error and stop the loop. Remaining tasks stay queued until the next `start()`.
    Halt,
}

#[derive(Debug)]
pub struct TaskProcessor {
    queue: Arc<Mutex<VecDeque<Task>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
    policy: TaskFailurePolicy,
}

impl TaskProcessor {
    pub fn create(interval: Duration, policy: TaskFailurePolicy) -> Arc<TaskProcessor> {
        Arc::new(TaskProcessor {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            timer: Mutex::new(None),
            interval,
            policy,
        })
    }

    /// Appends a task to the tail of the queue. Does not start processing.
    pub fn enqueue_task(&self, task: Task) {
        lock(&self.queue).push_back(task);
    }

    /// Names of the tasks still waiting, head first.
    pub fn get_task_queue(&self) -> Vec<String> {
        lock(&self.queue).iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.queue).is_empty()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        lock(&self.timer)
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Starts the processing loop unless it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut timer = lock(&self.timer);
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let queue = Arc::clone(&self.queue);
        let interval = self.interval;
        let policy = self.policy;
        log::debug!("Task processor started, interval {:?}", interval);

        *timer = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                let next = lock(&queue).pop_front();
                let Some(task) = next else { continue };

                let name = task.name.clone();
                match task.run() {
                    Ok(()) => log::debug!("Task '{}' completed", name),
                    Err(e) => match policy {
                        TaskFailurePolicy::LogAndContinue => {
                            log::error!("Task '{}' failed: {}", name, e);
                        }
                        TaskFailurePolicy::Halt => {
                            log::error!("Task '{}' failed, halting task processor: {}", name, e);
                            break;
                        }
                    },
                }
            }
        }));
    }

    /// Cancels the pending tick. Queued tasks are kept.
    ///
    /// A task that is already executing runs to completion; cancellation only
    /// takes effect while the loop waits for its timer.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
            log::debug!("Task processor stopped");
        }
    }
}

impl Drop for TaskProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::time::sleep;

    fn recording_task(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Task {
        let log = Arc::clone(log);
        Task::new(name, move || {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_enqueue_does_not_start_processing() {
        let processor = TaskProcessor::create(Duration::from_millis(10), TaskFailurePolicy::default());
        processor.enqueue_task(Task::new("a", || Ok(())));
        processor.enqueue_task(Task::new("b", || Ok(())));

        assert_eq!(processor.get_task_queue(), vec!["a".to_string(), "b".to_string()]);
        assert!(!processor.is_running());
    }

    #[tokio::test]
    async fn test_tasks_run_in_enqueue_order() {
        let processor = TaskProcessor::create(Duration::from_millis(20), TaskFailurePolicy::default());
        let ran = Arc::new(Mutex::new(Vec::new()));
        processor.enqueue_task(recording_task("t1", &ran));
        processor.enqueue_task(recording_task("t2", &ran));

        processor.start();
        sleep(Duration::from_millis(200)).await;

        assert_eq!(*ran.lock().unwrap(), vec!["t1", "t2"]);
        assert!(processor.is_empty());
        processor.stop();
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let processor = TaskProcessor::create(Duration::from_millis(60), TaskFailurePolicy::default());
        let ran = Arc::new(Mutex::new(Vec::new()));
        processor.enqueue_task(recording_task("t1", &ran));
        processor.enqueue_task(recording_task("t2", &ran));

        processor.start();
        processor.start();
        processor.start();
        assert!(processor.is_running());

        // A second loop would have drained both tasks on the first tick.
        sleep(Duration::from_millis(90)).await;
        assert_eq!(*ran.lock().unwrap(), vec!["t1"]);
        processor.stop();
    }

    #[tokio::test]
    async fn test_stop_keeps_queue_and_start_resumes() {
        let processor = TaskProcessor::create(Duration::from_millis(50), TaskFailurePolicy::default());
        let ran = Arc::new(Mutex::new(Vec::new()));
        for name in ["t1", "t2", "t3"] {
            processor.enqueue_task(recording_task(name, &ran));
        }

        processor.start();
        sleep(Duration::from_millis(75)).await;
        processor.stop();
        processor.stop();
        assert!(!processor.is_running());

        sleep(Duration::from_millis(150)).await;
        assert_eq!(*ran.lock().unwrap(), vec!["t1"]);
        assert_eq!(processor.get_task_queue(), vec!["t2".to_string(), "t3".to_string()]);

        processor.start();
        sleep(Duration::from_millis(300)).await;
        assert_eq!(*ran.lock().unwrap(), vec!["t1", "t2", "t3"]);
        processor.stop();
    }

    #[tokio::test]
    async fn test_failed_task_does_not_stop_queue_by_default() {
        let processor = TaskProcessor::create(Duration::from_millis(10), TaskFailurePolicy::LogAndContinue);
        let ran = Arc::new(Mutex::new(Vec::new()));
        processor.enqueue_task(Task::new("broken", || Err("boom".to_string())));
        processor.enqueue_task(recording_task("after", &ran));

        processor.start();
        sleep(Duration::from_millis(150)).await;

        assert_eq!(*ran.lock().unwrap(), vec!["after"]);
        assert!(processor.is_running());
        processor.stop();
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let processor = TaskProcessor::create(Duration::from_millis(10), TaskFailurePolicy::LogAndContinue);
        let ran = Arc::new(Mutex::new(Vec::new()));
        processor.enqueue_task(Task::new("panics", || panic!("boom")));
        processor.enqueue_task(recording_task("after", &ran));

        processor.start();
        sleep(Duration::from_millis(200)).await;

        assert_eq!(*ran.lock().unwrap(), vec!["after"]);
        assert!(processor.is_empty());
        assert!(processor.is_running());
        processor.stop();
    }

    #[tokio::test]
    async fn test_halt_policy_treats_panic_as_failure() {
        let processor = TaskProcessor::create(Duration::from_millis(10), TaskFailurePolicy::Halt);
        let ran = Arc::new(Mutex::new(Vec::new()));
        processor.enqueue_task(Task::new("panics", || panic!("boom")));
        processor.enqueue_task(recording_task("after", &ran));

        processor.start();
        sleep(Duration::from_millis(150)).await;

        assert!(ran.lock().unwrap().is_empty());
        assert_eq!(processor.get_task_queue(), vec!["after".to_string()]);
        assert!(!processor.is_running());
    }

    #[test]
    fn test_panic_message_extracts_payload() {
        let err = Task::new("s", || panic!("static")).run().unwrap_err();
        assert_eq!(err, "panicked: static");
        let err = Task::new("f", || panic!("formatted {}", 7)).run().unwrap_err();
        assert_eq!(err, "panicked: formatted 7");
    }

    #[tokio::test]
    async fn test_halt_policy_stops_on_failure() {
        let processor = TaskProcessor::create(Duration::from_millis(10), TaskFailurePolicy::Halt);
        let ran = Arc::new(Mutex::new(Vec::new()));
        processor.enqueue_task(recording_task("before", &ran));
        processor.enqueue_task(Task::new("broken", || Err("boom".to_string())));
        processor.enqueue_task(recording_task("after", &ran));

        processor.start();
        sleep(Duration::from_millis(150)).await;

        assert_eq!(*ran.lock().unwrap(), vec!["before"]);
        assert_eq!(processor.get_task_queue(), vec!["after".to_string()]);
        assert!(!processor.is_running());
    }
}
