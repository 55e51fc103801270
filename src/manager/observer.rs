use std::{cell::RefCell, fmt, rc::Rc};

use crate::models::task::TaskState;

/// Listener for task queue changes, typically a UI panel that repaints.
pub trait TaskObserver {
    /// Called on every state change of a registered task, or with `None`
    /// when the listing itself changed (a task was removed).
    fn task_changed(&mut self, task: Option<&TaskState>);

    /// Called when a task is added to a queue with no other active task,
    /// or while no pump polls it, so the host can start polling.
    fn queue_started(&mut self) {}
}

impl<F> TaskObserver for F
where
    F: FnMut(Option<&TaskState>),
{
    fn task_changed(&mut self, task: Option<&TaskState>) {
        self(task)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Box<dyn TaskObserver>)>,
}

/// Fan-out to every subscribed observer, shared between a runner and the
/// tasks it registered.
#[derive(Clone, Default)]
pub struct Notifier {
    observers: Rc<RefCell<Observers>>,
}

impl Notifier {
    pub fn subscribe(&self, observer: Box<dyn TaskObserver>) -> SubscriptionId {
        let mut observers = self.observers.borrow_mut();
        let id = SubscriptionId(observers.next_id);
        observers.next_id += 1;
        observers.entries.push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.entries.len();
        observers.entries.retain(|(entry, _)| *entry != id);
        observers.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn task_changed(&self, task: Option<&TaskState>) {
        for (_, observer) in self.observers.borrow_mut().entries.iter_mut() {
            observer.task_changed(task);
        }
    }

    pub fn queue_started(&self) {
        for (_, observer) in self.observers.borrow_mut().entries.iter_mut() {
            observer.queue_started();
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier").field("observers", &self.len()).finish()
    }
}
