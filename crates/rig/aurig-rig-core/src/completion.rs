//! Tick-driven completion signals.
//!
//! A [`Completion`] is settled from inside `Engine::update` (or synchronously
//! by a cancel/stop call) and never by another thread. It implements
//! [`Future`] so hosts with an executor can `.await` it, while tests and
//! simple hosts can just poll [`Completion::outcome`] after a tick.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

#[derive(Debug)]
struct Slot<T> {
    outcome: Option<T>,
    wakers: Vec<Waker>,
}

/// Single-settlement signal shared between a handle and its owner.
#[derive(Debug)]
pub struct Completion<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T: Clone> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Completion<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot {
                outcome: None,
                wakers: Vec::new(),
            })),
        }
    }

    /// Settle once. Later calls are ignored and return false.
    pub(crate) fn settle(&self, outcome: T) -> bool {
        let wakers = {
            let mut slot = self.slot.borrow_mut();
            if slot.outcome.is_some() {
                return false;
            }
            slot.outcome = Some(outcome);
            std::mem::take(&mut slot.wakers)
        };
        for w in wakers {
            w.wake();
        }
        true
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.slot.borrow().outcome.is_some()
    }

    pub fn outcome(&self) -> Option<T> {
        self.slot.borrow().outcome.clone()
    }

    fn poll_slot(&self, cx: &mut Context<'_>) -> Poll<T> {
        let mut slot = self.slot.borrow_mut();
        if let Some(outcome) = &slot.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !slot.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            slot.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T: Clone> Future for Completion<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        self.poll_slot(cx)
    }
}

/// Resolves once every member completion has settled.
#[derive(Debug)]
pub struct AllCompletions<T> {
    parts: Vec<Completion<T>>,
}

impl<T: Clone> AllCompletions<T> {
    pub fn new(parts: Vec<Completion<T>>) -> Self {
        Self { parts }
    }

    pub fn is_settled(&self) -> bool {
        self.parts.iter().all(|c| c.is_settled())
    }

    /// All outcomes, in member order, once everything has settled.
    pub fn outcomes(&self) -> Option<Vec<T>> {
        self.parts.iter().map(|c| c.outcome()).collect()
    }
}

impl<T: Clone> Future for AllCompletions<T> {
    type Output = Vec<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Vec<T>> {
        let mut pending = false;
        for part in &self.parts {
            if part.poll_slot(cx).is_pending() {
                pending = true;
            }
        }
        if pending {
            return Poll::Pending;
        }
        match self.outcomes() {
            Some(all) => Poll::Ready(all),
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn settles_once_and_wakes_pollers() {
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);

        let mut c: Completion<u8> = Completion::new();
        assert!(Pin::new(&mut c).poll(&mut cx).is_pending());
        assert!(c.settle(1));
        assert!(!c.settle(2));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(Pin::new(&mut c).poll(&mut cx), Poll::Ready(1));
    }

    #[test]
    fn all_completions_waits_for_every_member() {
        let a: Completion<u8> = Completion::new();
        let b: Completion<u8> = Completion::new();
        let all = AllCompletions::new(vec![a.clone(), b.clone()]);
        a.settle(1);
        assert!(!all.is_settled());
        b.settle(2);
        assert_eq!(all.outcomes(), Some(vec![1, 2]));
    }

    #[test]
    fn empty_group_is_settled() {
        let all: AllCompletions<u8> = AllCompletions::new(Vec::new());
        assert!(all.is_settled());
        assert_eq!(all.outcomes(), Some(vec![]));
    }
}
