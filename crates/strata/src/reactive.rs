//! Push-based value streams.
//!
//! A [`Signal`] is multicast, replays its latest value to new subscribers and
//! suppresses consecutive equal values. Derived signals own their upstream
//! [`Subscription`]s, while upstream callbacks only hold weak references to
//! the derived signal, so dropping the last handle of a derived signal
//! unhooks it from everything it listens to.

use crate::value::Value;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback = Rc<dyn Fn(&Value)>;

struct Subscriber {
    id: u64,
    active: Rc<Cell<bool>>,
    callback: Callback,
}

#[derive(Default)]
struct SignalState {
    latest: RefCell<Option<Value>>,
    subscribers: RefCell<SmallVec<[Subscriber; 4]>>,
    next_id: Cell<u64>,
    upstream: RefCell<Vec<Subscription>>,
    pending: RefCell<VecDeque<Value>>,
    emitting: Cell<bool>,
}

#[derive(Clone, Default)]
pub struct Signal(Rc<SignalState>);

#[derive(Clone)]
pub struct WeakSignal(Weak<SignalState>);

impl WeakSignal {
    pub fn upgrade(&self) -> Option<Signal> {
        self.0.upgrade().map(Signal)
    }
}

/// Keeps a callback registered; dropping it cancels delivery immediately,
/// including for an emission that is already in progress.
#[must_use = "dropping a subscription cancels it"]
pub struct Subscription {
    signal: Rc<SignalState>,
    id: u64,
    active: Rc<Cell<bool>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.set(false);
        if let Ok(mut subscribers) = self.signal.subscribers.try_borrow_mut() {
            subscribers.retain(|subscriber| subscriber.id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active.get())
            .finish()
    }
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: Value) -> Self {
        let signal = Self::new();
        signal.emit(value);
        signal
    }

    pub fn downgrade(&self) -> WeakSignal {
        WeakSignal(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Signal) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn latest(&self) -> Option<Value> {
        self.0.latest.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.0
            .subscribers
            .borrow()
            .iter()
            .filter(|subscriber| subscriber.active.get())
            .count()
    }

    /// Publishes `value` unless it equals the latest one. Emissions triggered
    /// from inside a subscriber are queued and delivered in order after the
    /// current round has reached every subscriber.
    pub fn emit(&self, value: Value) {
        self.0.pending.borrow_mut().push_back(value);
        if self.0.emitting.replace(true) {
            return;
        }
        loop {
            let next = self.0.pending.borrow_mut().pop_front();
            let Some(value) = next else {
                break;
            };
            if self.0.latest.borrow().as_ref() == Some(&value) {
                continue;
            }
            *self.0.latest.borrow_mut() = Some(value.clone());
            let subscribers: SmallVec<[(Rc<Cell<bool>>, Callback); 4]> = self
                .0
                .subscribers
                .borrow()
                .iter()
                .filter(|subscriber| subscriber.active.get())
                .map(|subscriber| (subscriber.active.clone(), subscriber.callback.clone()))
                .collect();
            for (active, callback) in subscribers {
                if active.get() {
                    callback(&value);
                }
            }
        }
        self.0.emitting.set(false);
    }

    pub fn subscribe(&self, callback: impl Fn(&Value) + 'static) -> Subscription {
        let callback: Callback = Rc::new(callback);
        let active = Rc::new(Cell::new(true));
        let id = self.0.next_id.get();
        self.0.next_id.set(id + 1);
        {
            let mut subscribers = self.0.subscribers.borrow_mut();
            subscribers.retain(|subscriber| subscriber.active.get());
            subscribers.push(Subscriber {
                id,
                active: active.clone(),
                callback: callback.clone(),
            });
        }
        let latest = self.latest();
        if let Some(value) = latest {
            callback(&value);
        }
        Subscription {
            signal: self.0.clone(),
            id,
            active,
        }
    }

    /// Ties the lifetime of an upstream subscription to this signal.
    pub fn hold(&self, subscription: Subscription) {
        self.0.upstream.borrow_mut().push(subscription);
    }

    fn forward(&self, transform: impl Fn(&Value) -> Option<Value> + 'static) -> Signal {
        let output = Signal::new();
        let weak = output.downgrade();
        let subscription = self.subscribe(move |value| {
            if let (Some(output), Some(value)) = (weak.upgrade(), transform(value)) {
                output.emit(value);
            }
        });
        output.hold(subscription);
        output
    }

    pub fn map(&self, transform: impl Fn(&Value) -> Value + 'static) -> Signal {
        self.forward(move |value| Some(transform(value)))
    }

    pub fn filter(&self, predicate: impl Fn(&Value) -> bool + 'static) -> Signal {
        self.forward(move |value| predicate(value).then(|| value.clone()))
    }

    pub fn filter_map(&self, transform: impl Fn(&Value) -> Option<Value> + 'static) -> Signal {
        self.forward(transform)
    }

    /// Recomputes on every emission of any source once all of them have
    /// produced a value, using the latest value of the others.
    pub fn combine(sources: &[Signal], combine: impl Fn(&[Value]) -> Value + 'static) -> Signal {
        let output = Signal::new();
        if sources.is_empty() {
            output.emit(combine(&[]));
            return output;
        }
        let combine = Rc::new(combine);
        let latest = Rc::new(RefCell::new(vec![None; sources.len()]));
        for (index, source) in sources.iter().enumerate() {
            let weak = output.downgrade();
            let latest = latest.clone();
            let combine = combine.clone();
            let subscription = source.subscribe(move |value| {
                let values = {
                    let mut latest = latest.borrow_mut();
                    latest[index] = Some(value.clone());
                    latest.iter().cloned().collect::<Option<Vec<Value>>>()
                };
                if let (Some(values), Some(output)) = (values, weak.upgrade()) {
                    output.emit(combine(&values));
                }
            });
            output.hold(subscription);
        }
        output
    }

    /// Follows the signal chosen for the selector's latest value. The previous
    /// inner subscription is cancelled before the next one is established.
    /// When the choice changes, the output has no latest value until the
    /// newly chosen signal emits.
    pub fn switch(selector: &Signal, choose: impl Fn(&Value) -> Option<Signal> + 'static) -> Signal {
        let output = Signal::new();
        let weak = output.downgrade();
        let inner: RefCell<Option<(Signal, Subscription)>> = RefCell::new(None);
        let subscription = selector.subscribe(move |value| {
            let Some(output) = weak.upgrade() else {
                return;
            };
            let chosen = choose(value);
            let unchanged = match (&*inner.borrow(), &chosen) {
                (Some((current, _)), Some(next)) => current.ptr_eq(next),
                _ => false,
            };
            if unchanged {
                return;
            }
            let previous = inner.borrow_mut().take();
            drop(previous);
            output.withhold();
            let Some(chosen) = chosen else {
                return;
            };
            let target = output.downgrade();
            let subscription = chosen.subscribe(move |value| {
                if let Some(output) = target.upgrade() {
                    output.emit(value.clone());
                }
            });
            *inner.borrow_mut() = Some((chosen, subscription));
        });
        output.hold(subscription);
        output
    }

    /// Forgets the latest value. Later subscribers get no replay until the
    /// next emission.
    fn withhold(&self) {
        self.0.latest.borrow_mut().take();
    }

    /// Collects every emitted value; handy for hosts and tests.
    pub fn record(&self) -> Recorder {
        let values = Rc::new(RefCell::new(Vec::new()));
        let sink = values.clone();
        let subscription = self.subscribe(move |value| sink.borrow_mut().push(value.clone()));
        Recorder {
            values,
            _subscription: subscription,
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signal").field(&self.latest()).finish()
    }
}

pub struct Recorder {
    values: Rc<RefCell<Vec<Value>>>,
    _subscription: Subscription,
}

impl Recorder {
    pub fn values(&self) -> Vec<Value> {
        self.values.borrow().clone()
    }

    pub fn last(&self) -> Option<Value> {
        self.values.borrow().last().cloned()
    }

    pub fn clear(&self) {
        self.values.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(value: f64) -> Value {
        Value::Number(value)
    }

    #[test]
    fn replays_latest_and_skips_duplicates() {
        let signal = Signal::new();
        signal.emit(number(1.0));
        let recorder = signal.record();
        signal.emit(number(1.0));
        signal.emit(number(2.0));
        assert_eq!(recorder.values(), [number(1.0), number(2.0)]);
    }

    #[test]
    fn dropping_a_subscription_cancels_it() {
        let signal = Signal::new();
        let recorder = signal.record();
        signal.emit(number(1.0));
        drop(recorder);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn cancellation_during_emission() {
        let signal = Signal::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::default();
        let killer = {
            let victim = victim.clone();
            signal.subscribe(move |_| drop(victim.borrow_mut().take()))
        };
        let sink = seen.clone();
        *victim.borrow_mut() = Some(signal.subscribe(move |value| sink.borrow_mut().push(value.clone())));
        signal.emit(number(1.0));
        assert!(seen.borrow().is_empty());
        drop(killer);
    }

    #[test]
    fn reentrant_emissions_stay_ordered() {
        let signal = Signal::new();
        let echo = {
            let weak = signal.downgrade();
            signal.subscribe(move |value| {
                if value == &number(1.0) {
                    if let Some(signal) = weak.upgrade() {
                        signal.emit(number(2.0));
                    }
                }
            })
        };
        let recorder = signal.record();
        signal.emit(number(1.0));
        assert_eq!(recorder.values(), [number(1.0), number(2.0)]);
        drop(echo);
    }

    #[test]
    fn combine_waits_for_every_source() {
        let a = Signal::new();
        let b = Signal::new();
        let sum = Signal::combine(&[a.clone(), b.clone()], |values| {
            number(values[0].as_number().unwrap_or(0.0) + values[1].as_number().unwrap_or(0.0))
        });
        let recorder = sum.record();
        a.emit(number(1.0));
        assert!(recorder.values().is_empty());
        b.emit(number(2.0));
        a.emit(number(5.0));
        assert_eq!(recorder.values(), [number(3.0), number(7.0)]);
    }

    #[test]
    fn derived_signals_keep_their_sources_alive() {
        let input = Signal::new();
        let doubled = input.map(|value| number(value.as_number().unwrap_or(0.0) * 2.0));
        let quadrupled = doubled.map(|value| number(value.as_number().unwrap_or(0.0) * 2.0));
        drop(doubled);
        let recorder = quadrupled.record();
        input.emit(number(3.0));
        assert_eq!(recorder.values(), [number(12.0)]);
        drop(quadrupled);
        drop(recorder);
        assert_eq!(input.subscriber_count(), 0);
    }

    #[test]
    fn switch_drops_the_previous_branch() {
        let selector = Signal::new();
        let left = Signal::constant(Value::string("left"));
        let right = Signal::new();
        let output = {
            let left = left.clone();
            let right = right.clone();
            Signal::switch(&selector, move |value| match value.as_bool()? {
                true => Some(left.clone()),
                false => Some(right.clone()),
            })
        };
        let recorder = output.record();
        selector.emit(Value::Bool(true));
        selector.emit(Value::Bool(false));
        assert_eq!(left.subscriber_count(), 0);
        right.emit(Value::string("right"));
        selector.emit(Value::Bool(true));
        right.emit(Value::string("stale"));
        assert_eq!(
            recorder.values(),
            [Value::string("left"), Value::string("right"), Value::string("left")]
        );
    }

    #[test]
    fn switch_withholds_until_the_new_branch_emits() {
        let selector = Signal::new();
        let left = Signal::new();
        let right = Signal::new();
        let output = {
            let left = left.clone();
            let right = right.clone();
            Signal::switch(&selector, move |value| match value.as_bool()? {
                true => Some(left.clone()),
                false => Some(right.clone()),
            })
        };
        left.emit(Value::string("left"));
        selector.emit(Value::Bool(true));
        assert_eq!(output.latest(), Some(Value::string("left")));

        selector.emit(Value::Bool(false));
        assert_eq!(output.latest(), None);
        let late = output.record();
        assert!(late.values().is_empty());

        left.emit(Value::string("stale"));
        assert_eq!(output.latest(), None);
        right.emit(Value::string("right"));
        assert_eq!(late.values(), [Value::string("right")]);
    }

    #[test]
    fn switch_without_a_choice_withholds() {
        let selector = Signal::new();
        let branch = Signal::constant(Value::Number(1.0));
        let output = {
            let branch = branch.clone();
            Signal::switch(&selector, move |value| value.as_bool()?.then(|| branch.clone()))
        };
        selector.emit(Value::Bool(true));
        assert_eq!(output.latest(), Some(Value::Number(1.0)));
        selector.emit(Value::Bool(false));
        assert_eq!(output.latest(), None);
        assert_eq!(branch.subscriber_count(), 0);
    }
}
