//! Concurrency-limited FIFO admission for animation starts.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

/// Default number of animations allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 12;

/// Caller-side importance of an animation. The queue itself never reorders by
/// priority; callers use it to decide whether to request admission at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

pub type StartCallback = Box<dyn FnOnce() + Send>;

/// A caller's wish to start an animation.
pub struct AnimationRequest {
    id: String,
    start: StartCallback,
}

impl AnimationRequest {
    pub fn new<F>(id: impl Into<String>, start: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id: id.into(),
            start: Box::new(start),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Runs the start callback and hands back the id.
    pub fn start(self) -> String {
        (self.start)();
        self.id
    }
}

impl std::fmt::Debug for AnimationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationRequest")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Outcome of offering a request to the queue.
#[derive(Debug)]
pub enum Admission {
    /// The id is now active; the caller must run the request.
    Start(AnimationRequest),
    /// The id was already active. Nothing to run.
    AlreadyActive,
    /// The request waits in FIFO order.
    Queued,
}

/// Bounds the number of simultaneously running animations.
///
/// New ids are admitted only while fewer than `max_concurrent` are active;
/// otherwise they wait in arrival order and start automatically as capacity
/// frees up. Lowering the limit never interrupts running animations, it only
/// holds back new starts until enough of them complete.
#[derive(Debug)]
pub struct AnimationAdmissionQueue {
    active: HashSet<String>,
    max_concurrent: usize,
    queue: VecDeque<AnimationRequest>,
}

impl Default for AnimationAdmissionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

impl AnimationAdmissionQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            active: HashSet::new(),
            max_concurrent: max_concurrent.max(1),
            queue: VecDeque::new(),
        }
    }

    /// Admits and starts the animation if there is headroom, otherwise queues
    /// it. Returns `true` when the animation is running.
    pub fn request_admission<F>(&mut self, id: impl Into<String>, start: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.admit(AnimationRequest::new(id, start)) {
            Admission::Start(request) => {
                request.start();
                true
            }
            Admission::AlreadyActive => true,
            Admission::Queued => false,
        }
    }

    /// Marks `id` finished and starts as many queued animations as now fit.
    /// Unknown ids are ignored. Returns the ids that were started.
    pub fn complete_animation(&mut self, id: &str) -> Vec<String> {
        self.release(id).into_iter().map(AnimationRequest::start).collect()
    }

    /// Changes the limit. Raising it starts queued animations immediately, in
    /// arrival order. Returns the ids that were started.
    pub fn set_max_concurrent(&mut self, max_concurrent: usize) -> Vec<String> {
        self.resize(max_concurrent)
            .into_iter()
            .map(AnimationRequest::start)
            .collect()
    }

    /// Decides admission without running anything, so a caller holding a lock
    /// can start the animation after releasing it.
    pub fn admit(&mut self, request: AnimationRequest) -> Admission {
        if self.active.contains(&request.id) {
            tracing::debug!(id = %request.id, "animation already active");
            return Admission::AlreadyActive;
        }
        if self.queue.iter().any(|queued| queued.id == request.id) {
            tracing::debug!(id = %request.id, "animation already queued");
            return Admission::Queued;
        }

        if self.has_headroom() {
            self.active.insert(request.id.clone());
            Admission::Start(request)
        } else {
            tracing::debug!(
                id = %request.id,
                active = self.active.len(),
                max = self.max_concurrent,
                "animation queued"
            );
            self.queue.push_back(request);
            Admission::Queued
        }
    }

    /// Removes `id` from the active set and returns the queued requests that
    /// now fit, already marked active, for the caller to start.
    pub fn release(&mut self, id: &str) -> Vec<AnimationRequest> {
        if !self.active.remove(id) {
            tracing::trace!(id, "completion for inactive animation ignored");
        }
        self.drain_ready()
    }

    /// Lock-friendly counterpart of [`Self::set_max_concurrent`].
    pub fn resize(&mut self, max_concurrent: usize) -> Vec<AnimationRequest> {
        let max_concurrent = max_concurrent.max(1);
        if max_concurrent != self.max_concurrent {
            tracing::debug!(
                from = self.max_concurrent,
                to = max_concurrent,
                "admission limit changed"
            );
            self.max_concurrent = max_concurrent;
        }
        self.drain_ready()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains(id)
    }

    pub fn is_queued(&self, id: &str) -> bool {
        self.queue.iter().any(|queued| queued.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Forgets every active id and drops queued requests without starting them.
    pub fn clear(&mut self) {
        self.active.clear();
        self.queue.clear();
    }

    fn has_headroom(&self) -> bool {
        self.active.len() < self.max_concurrent
    }

    fn drain_ready(&mut self) -> Vec<AnimationRequest> {
        let mut ready = Vec::new();
        while self.has_headroom() {
            let Some(request) = self.queue.pop_front() else {
                break;
            };
            self.active.insert(request.id.clone());
            ready.push(request);
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, id: &str) -> impl FnOnce() + Send + 'static {
        let log = log.clone();
        let id = id.to_string();
        move || log.lock().unwrap().push(id)
    }

    #[test]
    fn queues_beyond_the_limit_and_starts_on_completion() {
        let log: Log = Arc::default();
        let mut queue = AnimationAdmissionQueue::new(2);

        assert!(queue.request_admission("a", recorder(&log, "a")));
        assert!(queue.request_admission("b", recorder(&log, "b")));
        assert!(!queue.request_admission("c", recorder(&log, "c")));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);

        assert_eq!(queue.complete_animation("a"), vec!["c".to_string()]);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert!(queue.is_active("c"));
        assert!(!queue.is_active("a"));
    }

    #[test]
    fn drains_in_arrival_order() {
        let log: Log = Arc::default();
        let mut queue = AnimationAdmissionQueue::new(1);
        queue.request_admission("running", recorder(&log, "running"));
        for id in ["a", "b", "c"] {
            queue.request_admission(id, recorder(&log, id));
        }

        queue.complete_animation("running");
        assert!(queue.is_active("a"));
        assert!(queue.is_queued("b"));

        queue.complete_animation("a");
        queue.complete_animation("b");
        assert_eq!(*log.lock().unwrap(), vec!["running", "a", "b", "c"]);
    }

    #[test]
    fn raising_the_limit_drains_immediately() {
        let log: Log = Arc::default();
        let mut queue = AnimationAdmissionQueue::new(1);
        for id in ["a", "b", "c", "d"] {
            queue.request_admission(id, recorder(&log, id));
        }

        let started = queue.set_max_concurrent(3);
        assert_eq!(started, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(queue.active_count(), 3);
        assert_eq!(queue.queued_count(), 1);
    }

    #[test]
    fn lowering_the_limit_holds_back_new_starts() {
        let log: Log = Arc::default();
        let mut queue = AnimationAdmissionQueue::new(3);
        for id in ["a", "b", "c"] {
            queue.request_admission(id, recorder(&log, id));
        }

        assert!(queue.set_max_concurrent(1).is_empty());
        assert!(!queue.request_admission("d", recorder(&log, "d")));

        queue.complete_animation("a");
        queue.complete_animation("b");
        assert!(!queue.is_active("d"));
        queue.complete_animation("c");
        assert!(queue.is_active("d"));
    }

    #[test]
    fn completing_unknown_ids_is_a_no_op() {
        let mut queue = AnimationAdmissionQueue::default();
        assert!(queue.complete_animation("never-started").is_empty());
        assert_eq!(queue.active_count(), 0);
    }

    #[test]
    fn active_count_never_exceeds_limit() {
        let log: Log = Arc::default();
        let mut queue = AnimationAdmissionQueue::new(4);

        for round in 0..50 {
            let id = format!("anim-{round}");
            queue.request_admission(id.clone(), recorder(&log, &id));
            assert!(queue.active_count() <= queue.max_concurrent());
            if round % 3 == 0 {
                queue.complete_animation(&format!("anim-{}", round / 2));
                assert!(queue.active_count() <= queue.max_concurrent());
            }
        }
    }

    #[test]
    fn duplicate_requests_do_not_restart_or_double_queue() {
        let log: Log = Arc::default();
        let mut queue = AnimationAdmissionQueue::new(1);

        assert!(queue.request_admission("a", recorder(&log, "a")));
        assert!(queue.request_admission("a", recorder(&log, "a")));
        assert!(!queue.request_admission("b", recorder(&log, "b")));
        assert!(!queue.request_admission("b", recorder(&log, "b")));

        assert_eq!(*log.lock().unwrap(), vec!["a"]);
        assert_eq!(queue.queued_count(), 1);
    }
}
