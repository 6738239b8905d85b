//! Transition scheduler: keyed scalar interpolations advanced once per tick.
//!
//! Each transition carries an opaque `target` payload. `update` hands
//! `(target, value)` pairs to a caller-provided sink, so the scheduler itself
//! never borrows engine state.
//!
//! State machine: `Running ⇄ Paused → Completed | Cancelled`. Both terminal
//! states settle the handle's [`Completion`]; cancel does so synchronously.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::completion::{AllCompletions, Completion};
use crate::easing::Easing;
use crate::ids::{IdAllocator, TransitionId};
use crate::state::sanitize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionState {
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl TransitionState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// How a transition settled, with the value it settled at.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TransitionOutcome {
    Completed(f32),
    Cancelled(f32),
}

impl TransitionOutcome {
    #[inline]
    pub fn value(self) -> f32 {
        match self {
            Self::Completed(v) | Self::Cancelled(v) => v,
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: TransitionState,
    /// Last applied value (or `from` before the first tick).
    value: f32,
}

/// Control handle for one transition.
#[derive(Clone, Debug)]
pub struct TransitionHandle {
    id: TransitionId,
    key: String,
    shared: Rc<RefCell<Shared>>,
    completion: Completion<TransitionOutcome>,
}

impl TransitionHandle {
    fn new(id: TransitionId, key: String, from: f32) -> Self {
        Self {
            id,
            key,
            shared: Rc::new(RefCell::new(Shared {
                state: TransitionState::Running,
                value: from,
            })),
            completion: Completion::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> TransitionId {
        self.id
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> TransitionState {
        self.shared.borrow().state
    }

    /// Value reached so far.
    pub fn value(&self) -> f32 {
        self.shared.borrow().value
    }

    pub fn pause(&self) {
        let mut s = self.shared.borrow_mut();
        if s.state == TransitionState::Running {
            s.state = TransitionState::Paused;
        }
    }

    pub fn resume(&self) {
        let mut s = self.shared.borrow_mut();
        if s.state == TransitionState::Paused {
            s.state = TransitionState::Running;
        }
    }

    /// Stop at the current value and settle immediately.
    pub fn cancel(&self) {
        let value = {
            let mut s = self.shared.borrow_mut();
            if s.state.is_terminal() {
                return;
            }
            s.state = TransitionState::Cancelled;
            s.value
        };
        self.completion.settle(TransitionOutcome::Cancelled(value));
    }

    pub fn completion(&self) -> Completion<TransitionOutcome> {
        self.completion.clone()
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.completion.is_settled()
    }

    fn record(&self, value: f32) {
        self.shared.borrow_mut().value = value;
    }

    fn complete(&self, to: f32) {
        {
            let mut s = self.shared.borrow_mut();
            s.state = TransitionState::Completed;
            s.value = to;
        }
        self.completion.settle(TransitionOutcome::Completed(to));
    }
}

/// Several transitions driven as one.
#[derive(Clone, Debug, Default)]
pub struct TransitionGroup {
    handles: Vec<TransitionHandle>,
}

impl TransitionGroup {
    pub fn new(handles: Vec<TransitionHandle>) -> Self {
        Self { handles }
    }

    pub fn push(&mut self, handle: TransitionHandle) {
        self.handles.push(handle);
    }

    pub fn handles(&self) -> &[TransitionHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn pause(&self) {
        self.handles.iter().for_each(TransitionHandle::pause);
    }

    pub fn resume(&self) {
        self.handles.iter().for_each(TransitionHandle::resume);
    }

    pub fn cancel(&self) {
        self.handles.iter().for_each(TransitionHandle::cancel);
    }

    pub fn is_settled(&self) -> bool {
        self.handles.iter().all(TransitionHandle::is_settled)
    }

    /// Resolves when every member has settled. An empty group is settled.
    pub fn completion(&self) -> AllCompletions<TransitionOutcome> {
        AllCompletions::new(self.handles.iter().map(|h| h.completion()).collect())
    }
}

#[derive(Debug)]
struct Entry<T> {
    from: f32,
    to: f32,
    duration_ms: f32,
    elapsed_ms: f32,
    easing: Easing,
    target: T,
    handle: TransitionHandle,
}

/// Keyed transition table; at most one live transition per key.
#[derive(Debug)]
pub struct TransitionScheduler<T> {
    entries: IndexMap<String, Entry<T>>,
    ids: IdAllocator,
}

impl<T> Default for TransitionScheduler<T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            ids: IdAllocator::new(),
        }
    }
}

impl<T> TransitionScheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the transition for `key`.
    ///
    /// An existing transition on the same key is cancelled at its current
    /// value and replaced. Negative or NaN durations clamp to 0, which
    /// completes on the next update.
    pub fn start(
        &mut self,
        key: impl Into<String>,
        from: f32,
        to: f32,
        duration_ms: f32,
        easing: Option<Easing>,
        target: T,
    ) -> TransitionHandle {
        let key = key.into();
        if let Some(old) = self.entries.shift_remove(&key) {
            log::debug!("transition '{key}' replaced before completion");
            old.handle.cancel();
        }
        let from = sanitize(from);
        let handle = TransitionHandle::new(self.ids.alloc_transition(), key.clone(), from);
        self.entries.insert(
            key,
            Entry {
                from,
                to: sanitize(to),
                duration_ms: sanitize(duration_ms).max(0.0),
                elapsed_ms: 0.0,
                easing: easing.unwrap_or_default(),
                target,
                handle: handle.clone(),
            },
        );
        handle
    }

    /// Advance every running transition by `dt_ms` and emit applied values.
    pub fn update(&mut self, dt_ms: f32, mut apply: impl FnMut(&T, f32)) {
        let dt = sanitize(dt_ms).max(0.0);
        self.entries.retain(|_, e| {
            match e.handle.state() {
                TransitionState::Cancelled | TransitionState::Completed => return false,
                TransitionState::Paused => return true,
                TransitionState::Running => {}
            }
            e.elapsed_ms += dt;
            let t = if e.duration_ms <= 0.0 {
                1.0
            } else {
                (e.elapsed_ms / e.duration_ms).clamp(0.0, 1.0)
            };
            if t >= 1.0 {
                apply(&e.target, e.to);
                e.handle.complete(e.to);
                return false;
            }
            let eased = e.easing.apply(t);
            let v = e.from + (e.to - e.from) * eased;
            apply(&e.target, v);
            e.handle.record(v);
            true
        });
    }

    /// Cancel the transition on `key`, if any.
    pub fn cancel(&mut self, key: &str) -> bool {
        match self.entries.shift_remove(key) {
            Some(e) => {
                e.handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, e) in self.entries.drain(..) {
            e.handle.cancel();
        }
    }

    pub fn handle(&self, key: &str) -> Option<TransitionHandle> {
        self.entries.get(key).map(|e| e.handle.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of live (running or paused) transitions.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|e| !e.handle.state().is_terminal())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
