use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared cancellation flag. Cloning yields a handle onto the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How often a scheduled task runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cadence {
    /// Once per host frame callback.
    EveryFrame,
    /// At most once per period, checked on each frame.
    Interval { period_ms: f64 },
}

#[derive(Debug)]
struct ScheduledTask<K> {
    kind: K,
    cadence: Cadence,
    next_due_ms: f64,
    token: CancellationToken,
}

/// Task table driven by the host's frame callback.
///
/// Tasks never reschedule themselves: the host calls [`TaskScheduler::due`]
/// once per frame and runs whatever it returns, in registration order.
#[derive(Debug)]
pub struct TaskScheduler<K> {
    tasks: Vec<ScheduledTask<K>>,
}

impl<K> Default for TaskScheduler<K> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<K: Copy> TaskScheduler<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task. Interval tasks first fire one period after `now_ms`.
    pub fn schedule(&mut self, kind: K, cadence: Cadence, now_ms: f64) -> CancellationToken {
        let next_due_ms = match cadence {
            Cadence::EveryFrame => now_ms,
            Cadence::Interval { period_ms } => now_ms + period_ms,
        };
        let token = CancellationToken::new();
        self.tasks.push(ScheduledTask {
            kind,
            cadence,
            next_due_ms,
            token: token.clone(),
        });
        token
    }

    /// Returns the tasks due at `now_ms`, advancing interval deadlines and
    /// discarding cancelled tasks.
    pub fn due(&mut self, now_ms: f64) -> Vec<K> {
        self.tasks.retain(|task| !task.token.is_cancelled());

        let mut due = Vec::new();
        for task in &mut self.tasks {
            match task.cadence {
                Cadence::EveryFrame => due.push(task.kind),
                Cadence::Interval { period_ms } => {
                    if now_ms >= task.next_due_ms {
                        due.push(task.kind);
                        if period_ms <= 0.0 {
                            task.next_due_ms = now_ms;
                            continue;
                        }
                        // Skip missed periods instead of bursting to catch up.
                        while task.next_due_ms <= now_ms {
                            task.next_due_ms += period_ms;
                        }
                    }
                }
            }
        }
        due
    }

    pub fn cancel_all(&mut self) {
        for task in &self.tasks {
            task.token.cancel();
        }
        self.tasks.clear();
    }

    pub fn len(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| !task.token.is_cancelled())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
