//! Tick-driven implementation of the [`Scheduler`] port.
//!
//! The host calls [`TickScheduler::tick`] once per game tick. Each pending
//! task counts down one tick per call; one-shot tasks are dropped after they
//! fire, repeating tasks reset to their interval.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use nametags_api::{RepeatingTask, Scheduler, Task, TaskId};
use tracing::error;

enum TaskKind {
    /// `None` once fired.
    Once(Option<Task>),
    Repeating { interval: u64, task: RepeatingTask },
}

struct ScheduledTask {
    id: TaskId,
    remaining_ticks: u64,
    kind: TaskKind,
}

enum Fired {
    Once(TaskId, Task),
    Repeating(TaskId, RepeatingTask),
}

#[derive(Default)]
pub struct TickScheduler {
    tasks: Mutex<Vec<ScheduledTask>>,
    next_id: AtomicU64,
    current_tick: AtomicU64,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<ScheduledTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, remaining_ticks: u64, kind: TaskKind) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.tasks().push(ScheduledTask {
            id,
            remaining_ticks,
            kind,
        });
        id
    }

    /// Advance one tick and run everything that came due. Returns how many
    /// tasks ran.
    pub fn tick(&self) -> usize {
        self.current_tick.fetch_add(1, Ordering::Relaxed);

        let mut fired = Vec::new();
        {
            let mut tasks = self.tasks();
            for task in tasks.iter_mut() {
                if task.remaining_ticks > 0 {
                    task.remaining_ticks -= 1;
                }
                if task.remaining_ticks > 0 {
                    continue;
                }
                match &mut task.kind {
                    TaskKind::Once(slot) => {
                        if let Some(f) = slot.take() {
                            fired.push(Fired::Once(task.id, f));
                        }
                    }
                    TaskKind::Repeating { interval, task: f } => {
                        fired.push(Fired::Repeating(task.id, f.clone()));
                        task.remaining_ticks = (*interval).max(1);
                    }
                }
            }
            tasks.retain(|t| !matches!(t.kind, TaskKind::Once(None)));
        }

        // Lock released: tasks may schedule or cancel other tasks.
        let count = fired.len();
        for f in fired {
            let (id, outcome) = match f {
                Fired::Once(id, task) => (id, panic::catch_unwind(AssertUnwindSafe(task))),
                Fired::Repeating(id, task) => {
                    (id, panic::catch_unwind(AssertUnwindSafe(|| task())))
                }
            };
            if outcome.is_err() {
                error!("Scheduled task {id:?} panicked");
            }
        }
        count
    }

    /// Ticks elapsed since creation.
    pub fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::Relaxed)
    }

    /// Tasks still waiting to fire (repeating tasks always count).
    pub fn pending(&self) -> usize {
        self.tasks().len()
    }

    /// Tick until no one-shot task is pending, at most `max_ticks` times.
    /// Repeating tasks do not keep this running.
    pub fn run_until_idle(&self, max_ticks: u64) -> u64 {
        let mut ticks = 0;
        while ticks < max_ticks && self.has_one_shot() {
            self.tick();
            ticks += 1;
        }
        ticks
    }

    fn has_one_shot(&self) -> bool {
        self.tasks()
            .iter()
            .any(|t| matches!(t.kind, TaskKind::Once(Some(_))))
    }
}

impl Scheduler for TickScheduler {
    fn run_later(&self, delay_ticks: u64, task: Task) -> TaskId {
        self.push(delay_ticks, TaskKind::Once(Some(task)))
    }

    fn run_repeating(&self, delay_ticks: u64, interval_ticks: u64, task: RepeatingTask) -> TaskId {
        self.push(
            delay_ticks,
            TaskKind::Repeating {
                interval: interval_ticks,
                task,
            },
        )
    }

    fn cancel(&self, id: TaskId) {
        self.tasks().retain(|t| t.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let c = Arc::new(AtomicUsize::new(0));
        let read = {
            let c = c.clone();
            move || c.load(Ordering::SeqCst)
        };
        (c, read)
    }

    #[test]
    fn delayed_task_fires_on_its_tick() {
        let s = TickScheduler::new();
        let (c, read) = counter();
        s.run_later(
            3,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(s.tick(), 0);
        assert_eq!(s.tick(), 0);
        assert_eq!(read(), 0);
        assert_eq!(s.tick(), 1);
        assert_eq!(read(), 1);
        assert_eq!(s.pending(), 0);
        s.tick();
        assert_eq!(read(), 1);
    }

    #[test]
    fn zero_delay_runs_next_tick() {
        let s = TickScheduler::new();
        let (c, read) = counter();
        s.run_later(
            0,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(read(), 0);
        s.tick();
        assert_eq!(read(), 1);
    }

    #[test]
    fn repeating_task_resets() {
        let s = TickScheduler::new();
        let (c, read) = counter();
        s.run_repeating(
            1,
            2,
            Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        s.tick(); // fires
        s.tick();
        s.tick(); // fires
        s.tick();
        s.tick(); // fires
        assert_eq!(read(), 3);
        assert_eq!(s.pending(), 1);
    }

    #[test]
    fn cancelled_task_never_runs() {
        let s = TickScheduler::new();
        let (c, read) = counter();
        let id = s.run_later(
            1,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        s.cancel(id);
        s.tick();
        assert_eq!(read(), 0);
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn task_can_schedule_follow_up() {
        let s = Arc::new(TickScheduler::new());
        let (c, read) = counter();
        let inner = s.clone();
        s.run_later(
            1,
            Box::new(move || {
                let c = c.clone();
                inner.run_later(
                    1,
                    Box::new(move || {
                        c.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );
        s.tick();
        assert_eq!(read(), 0);
        s.tick();
        assert_eq!(read(), 1);
    }

    #[test]
    fn panicking_task_does_not_stop_others() {
        let s = TickScheduler::new();
        let (c, read) = counter();
        s.run_later(1, Box::new(|| panic!("boom")));
        s.run_later(
            1,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(s.tick(), 2);
        assert_eq!(read(), 1);
    }

    #[test]
    fn run_until_idle_ignores_repeating() {
        let s = TickScheduler::new();
        s.run_repeating(0, 1, Arc::new(|| {}));
        s.run_later(5, Box::new(|| {}));
        assert_eq!(s.run_until_idle(100), 5);
        assert_eq!(s.current_tick(), 5);
    }
}
