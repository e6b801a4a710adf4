//! Single-threaded observable values and streams.
//!
//! The runtime model exposes its live state (slot messages, connection status,
//! nested instance pools, the "front layer" flag) as [`Observable`]s. Everything
//! runs on one event loop, so observables are `Rc`-based and notify their
//! subscribers synchronously.
//!
//! Two flavors exist:
//! - [`Observable::new`] behaves like a subject: late subscribers only see
//!   future values (and a completion that already happened).
//! - [`Observable::with_value`] behaves like a behavior subject: late
//!   subscribers immediately receive the current value.
//!
//! Emissions made from inside a subscriber are queued and delivered after the
//! current emission reached every subscriber, so all subscribers observe the
//! same order.

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    rc::{Rc, Weak},
};

/// What a subscriber receives.
#[derive(Debug)]
pub enum Notification<'a, T> {
    Next(&'a T),
    Complete,
}

enum Event<T> {
    Next(T),
    Complete,
}

impl<T> Event<T> {
    fn as_notification(&self) -> Notification<'_, T> {
        match self {
            Event::Next(value) => Notification::Next(value),
            Event::Complete => Notification::Complete,
        }
    }
}

type Callback<T> = Box<dyn FnMut(Notification<'_, T>)>;

struct Subscriber<T> {
    id: u64,
    callback: Callback<T>,
}

struct Inner<T> {
    current: Option<T>,
    replay: bool,
    completed: bool,
    next_id: u64,
    subscribers: Vec<Subscriber<T>>,
    queue: VecDeque<Event<T>>,
    dispatching: bool,
    /// Ids of the subscribers taken out for the emission under way.
    in_flight: Vec<u64>,
    removed: Vec<u64>,
}

/// A shared, observable stream of values of type `T`.
///
/// Cloning an `Observable` yields another handle on the same stream.
///
/// # Examples
///
/// ```
/// use std::{cell::RefCell, rc::Rc};
/// use strata_core::observable::{Notification, Observable};
///
/// let status = Observable::with_value(1);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let sink = Rc::clone(&seen);
/// let _subscription = status.subscribe(move |notification| {
///     if let Notification::Next(value) = notification {
///         sink.borrow_mut().push(*value);
///     }
/// });
/// status.next(2);
///
/// assert_eq!(*seen.borrow(), vec![1, 2]);
/// assert_eq!(status.value(), Some(2));
/// ```
pub struct Observable<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("current", &inner.current)
            .field("completed", &inner.completed)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Observable<T> {
    fn with_state(current: Option<T>, replay: bool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                current,
                replay,
                completed: false,
                next_id: 0,
                subscribers: Vec::new(),
                queue: VecDeque::new(),
                dispatching: false,
                in_flight: Vec::new(),
                removed: Vec::new(),
            })),
        }
    }

    /// Creates a stream without replay: subscribers only see future values.
    pub fn new() -> Self {
        Self::with_state(None, false)
    }

    /// Creates a stream holding `value` and replaying it to new subscribers.
    pub fn with_value(value: T) -> Self {
        Self::with_state(Some(value), true)
    }

    /// Returns the last emitted value, if any.
    pub fn value(&self) -> Option<T> {
        self.inner.borrow().current.clone()
    }

    /// Returns `true` once [`complete`](Self::complete) was called.
    pub fn is_completed(&self) -> bool {
        self.inner.borrow().completed
    }

    /// Number of live subscribers, including those being notified by an
    /// emission under way.
    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.borrow();
        let in_flight = inner
            .in_flight
            .iter()
            .filter(|id| !inner.removed.contains(id))
            .count();
        inner.subscribers.len() + in_flight
    }

    /// Returns `true` if both handles point to the same stream.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Emits `value` to every subscriber. Ignored after completion.
    pub fn next(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.completed {
                return;
            }
            inner.current = Some(value.clone());
        }
        self.dispatch(Event::Next(value));
    }

    /// Completes the stream. Subscribers are notified once and then dropped.
    pub fn complete(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.completed {
                return;
            }
            inner.completed = true;
        }
        self.dispatch(Event::Complete);
    }

    /// Registers `callback`, replaying the current value (behavior flavor)
    /// and the completion (both flavors) if they already happened.
    pub fn subscribe(&self, callback: impl FnMut(Notification<'_, T>) + 'static) -> Subscription {
        let mut callback: Callback<T> = Box::new(callback);
        let (id, replayed, completed) = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            let replayed = if inner.replay {
                inner.current.clone()
            } else {
                None
            };
            (id, replayed, inner.completed)
        };

        if let Some(value) = replayed {
            callback(Notification::Next(&value));
        }
        if completed {
            callback(Notification::Complete);
            return Subscription::closed();
        }

        self.inner
            .borrow_mut()
            .subscribers
            .push(Subscriber { id, callback });

        let weak: Weak<RefCell<Inner<T>>> = Rc::downgrade(&self.inner);
        Subscription {
            teardown: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut inner = inner.borrow_mut();
                    inner.subscribers.retain(|subscriber| subscriber.id != id);
                    if inner.dispatching {
                        inner.removed.push(id);
                    }
                }
            })),
        }
    }

    fn dispatch(&self, event: Event<T>) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.queue.push_back(event);
            if inner.dispatching {
                return;
            }
            inner.dispatching = true;
        }

        loop {
            let (event, mut subscribers) = {
                let mut inner = self.inner.borrow_mut();
                match inner.queue.pop_front() {
                    Some(event) => {
                        let subscribers = std::mem::take(&mut inner.subscribers);
                        inner.in_flight = subscribers.iter().map(|subscriber| subscriber.id).collect();
                        (event, subscribers)
                    }
                    None => {
                        inner.dispatching = false;
                        inner.removed.clear();
                        break;
                    }
                }
            };

            for subscriber in subscribers.iter_mut() {
                if self.inner.borrow().removed.contains(&subscriber.id) {
                    continue;
                }
                (subscriber.callback)(event.as_notification());
            }

            let mut inner = self.inner.borrow_mut();
            inner.in_flight.clear();
            let removed = std::mem::take(&mut inner.removed);
            subscribers.retain(|subscriber| !removed.contains(&subscriber.id));
            if matches!(event, Event::Complete) {
                subscribers.clear();
                inner.subscribers.clear();
            } else {
                let added = std::mem::take(&mut inner.subscribers);
                subscribers.extend(added);
                inner.subscribers = subscribers;
            }
        }
    }
}

/// Handle returned by [`Observable::subscribe`].
///
/// Dropping a `Subscription` does not unsubscribe; collect long-lived
/// subscriptions into [`Subscriptions`] to release them together.
#[must_use = "a subscription keeps its callback alive until unsubscribed"]
pub struct Subscription {
    teardown: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn closed() -> Self {
        Self { teardown: None }
    }

    /// Removes the callback from its stream.
    pub fn unsubscribe(mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    /// Returns `true` if the subscription can no longer receive values.
    pub fn is_closed(&self) -> bool {
        self.teardown.is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A bag of subscriptions released together, on [`clear`](Self::clear) or
/// on drop.
#[derive(Debug, Default)]
pub struct Subscriptions {
    items: Vec<Subscription>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.items.push(subscription);
    }

    pub fn extend(&mut self, other: Subscriptions) {
        let mut other = other;
        self.items.append(&mut other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Unsubscribes everything held so far.
    pub fn clear(&mut self) {
        for subscription in self.items.drain(..) {
            subscription.unsubscribe();
        }
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.clear();
    }
}
