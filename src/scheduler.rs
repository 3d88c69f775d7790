//! Main-thread task scheduling.
//!
//! Every delegate operation runs on the host's UI thread. The only deferred
//! work is fire-and-forget: splash fade-outs and the removal of an eviction
//! placeholder after a reattach. Tasks are posted through
//! [`MainThreadHandler`] and always run on the thread that owns the handler.

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

/// Deferred task posted to the main thread.
pub type MainThreadTask = Box<dyn FnOnce()>;

/// Posts work back onto the UI thread after a delay.
pub trait MainThreadHandler {
    fn post_delayed(&self, delay: Duration, task: MainThreadTask);
}

/// Trait representing a monotonic time source used by [`Looper`].
pub trait TimeSource {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic time source for tests and scripted CLI runs.
///
/// Time only moves when [`ManualTimeSource::advance`] is called.
pub struct ManualTimeSource {
    start: Instant,
    offset: Cell<Duration>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.start + self.offset.get()
    }
}

struct ScheduledTask {
    deadline: Instant,
    sequence: u64,
    task: MainThreadTask,
}

/// Deadline-ordered task queue drained by the host's main loop.
///
/// The host calls [`Looper::run_due`] from its event loop; tasks whose
/// deadline has passed run in deadline order, FIFO among equal deadlines.
pub struct Looper<T: TimeSource> {
    clock: T,
    queue: RefCell<Vec<ScheduledTask>>,
    next_sequence: Cell<u64>,
}

impl<T: TimeSource> Looper<T> {
    pub fn new(clock: T) -> Self {
        Self {
            clock,
            queue: RefCell::new(Vec::new()),
            next_sequence: Cell::new(0),
        }
    }

    pub fn clock(&self) -> &T {
        &self.clock
    }

    /// Number of tasks still waiting for their deadline.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run every task that is due now. Returns how many ran.
    ///
    /// Tasks posted while draining are only picked up if they are already due
    /// when the current batch finishes.
    pub fn run_due(&self) -> usize {
        let mut ran = 0;
        loop {
            let due = self.take_due(self.clock.now());
            if due.is_empty() {
                return ran;
            }
            tracing::trace!("[Looper] running {} due task(s)", due.len());
            for scheduled in due {
                (scheduled.task)();
                ran += 1;
            }
        }
    }

    fn take_due(&self, now: Instant) -> Vec<ScheduledTask> {
        let mut queue = self.queue.borrow_mut();
        let (mut due, waiting): (Vec<_>, Vec<_>) =
            queue.drain(..).partition(|task| task.deadline <= now);
        *queue = waiting;
        due.sort_by_key(|task| (task.deadline, task.sequence));
        due
    }
}

impl Looper<ManualTimeSource> {
    /// Advance the manual clock and run whatever became due.
    pub fn advance(&self, by: Duration) -> usize {
        self.clock.advance(by);
        self.run_due()
    }
}

impl Looper<SystemTimeSource> {
    pub fn system() -> Self {
        Self::new(SystemTimeSource::default())
    }
}

impl<T: TimeSource> MainThreadHandler for Looper<T> {
    fn post_delayed(&self, delay: Duration, task: MainThreadTask) {
        let sequence = self.next_sequence.get();
        self.next_sequence.set(sequence + 1);
        self.queue.borrow_mut().push(ScheduledTask {
            deadline: self.clock.now() + delay,
            sequence,
            task,
        });
    }
}

/// Handler for hosts whose UI thread drives a tokio `LocalSet`.
///
/// Tasks are spawned with `spawn_local`, so `post_delayed` must be called
/// from within a `LocalSet` context on a runtime with the time driver enabled.
#[derive(Default)]
pub struct TokioLocalHandler {
    _unit: (),
}

impl TokioLocalHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MainThreadHandler for TokioLocalHandler {
    fn post_delayed(&self, delay: Duration, task: MainThreadTask) {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> MainThreadTask) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |label: &'static str| -> MainThreadTask {
            let sink = Rc::clone(&sink);
            Box::new(move || sink.borrow_mut().push(label))
        };
        (log, make)
    }

    #[test]
    fn tasks_wait_for_their_deadline() {
        let looper = Looper::new(ManualTimeSource::new());
        let (log, task) = recorder();

        looper.post_delayed(Duration::from_millis(100), task("late"));
        assert_eq!(looper.run_due(), 0);
        assert_eq!(looper.advance(Duration::from_millis(99)), 0);
        assert_eq!(looper.advance(Duration::from_millis(1)), 1);
        assert_eq!(*log.borrow(), vec!["late"]);
        assert_eq!(looper.pending(), 0);
    }

    #[test]
    fn due_tasks_run_in_deadline_then_post_order() {
        let looper = Looper::new(ManualTimeSource::new());
        let (log, task) = recorder();

        looper.post_delayed(Duration::from_millis(50), task("second"));
        looper.post_delayed(Duration::from_millis(10), task("first"));
        looper.post_delayed(Duration::from_millis(50), task("third"));

        assert_eq!(looper.advance(Duration::from_millis(60)), 3);
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn tasks_may_post_follow_up_work() {
        let looper = Rc::new(Looper::new(ManualTimeSource::new()));
        let (log, task) = recorder();

        let inner = Rc::clone(&looper);
        let follow_up = task("follow_up");
        looper.post_delayed(
            Duration::ZERO,
            Box::new(move || inner.post_delayed(Duration::ZERO, follow_up)),
        );

        assert_eq!(looper.run_due(), 2);
        assert_eq!(*log.borrow(), vec!["follow_up"]);
    }

    #[test]
    fn manual_clock_only_moves_on_advance() {
        let clock = ManualTimeSource::new();
        let before = clock.now();
        assert_eq!(clock.now(), before);
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now() - before, Duration::from_secs(1));
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
    }
}
