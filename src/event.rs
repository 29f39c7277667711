//! Event bus and debounced dispatch.
//!
//! [`Event`] is a shareable subscribe/trigger channel.  Handlers fire in
//! subscription order; unsubscription uses an opaque identity token and
//! linear removal, so concurrent unsubscribes cannot displace an
//! unrelated handler.  `trigger` snapshots the handler list first: a
//! handler may re-enter `trigger` or subscribe new handlers, and newly
//! subscribed handlers do not fire for in-flight triggers.
//!
//! [`Debounce`] wraps a handler so that a burst of `handle` calls
//! collapses into a single invocation after a quiescence window.  The
//! pending timer is captured by the spawned callback; `clear` cancels the
//! timer and drops the pending event under one lock, so a late-firing
//! callback can never observe a half-cleared state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Token returned by [`Event::subscribe`]; pass it back to
/// [`Event::unsubscribe`] to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct EventInner<T> {
    handlers: Vec<(u64, Handler<T>)>,
    next_id: u64,
}

pub struct Event<T> {
    inner: Arc<Mutex<EventInner<T>>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EventInner { handlers: Vec::new(), next_id: 0 })),
        }
    }

    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, Arc::new(handler)));
        Subscription(id)
    }

    pub fn unsubscribe(&self, token: Subscription) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.handlers.retain(|(id, _)| *id != token.0);
    }

    pub fn trigger(&self, arg: &T) {
        // Snapshot under the lock, invoke outside it: handlers may
        // subscribe, unsubscribe, or re-trigger.
        let snapshot: Vec<Handler<T>> = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.handlers.iter().map(|(_, h)| h.clone()).collect()
        };
        for handler in snapshot {
            handler(arg);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).handlers.len()
    }
}

struct DebounceState<T> {
    pending: Option<T>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    wait: Duration,
}

/// Per-key debounced dispatch: `handle` records the latest event and
/// (re)starts the quiescence timer; the wrapped handler fires with the
/// last recorded event once `wait` elapses without further calls.
pub struct Debounce<T> {
    handler: Arc<dyn Fn(T) + Send + Sync>,
    state: Arc<Mutex<DebounceState<T>>>,
}

impl<T: Clone + Send + 'static> Debounce<T> {
    pub fn new(handler: impl Fn(T) + Send + Sync + 'static, wait: Duration) -> Self {
        Self {
            handler: Arc::new(handler),
            state: Arc::new(Mutex::new(DebounceState {
                pending: None,
                generation: 0,
                timer: None,
                wait,
            })),
        }
    }

    /// Record `event` and schedule the handler after the quiescence
    /// window, cancelling any prior pending fire.  Must be called from
    /// within a tokio runtime.
    pub fn handle(&self, event: T) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.pending = Some(event);
        state.generation += 1;
        let generation = state.generation;
        let wait = state.wait;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let shared = self.state.clone();
        let handler = self.handler.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let fired = {
                let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
                if state.generation != generation {
                    return;
                }
                state.timer = None;
                state.pending.take()
            };
            if let Some(event) = fired {
                handler(event);
            }
        }));
    }

    /// Fire the pending event immediately, if any.
    pub fn flush(&self) {
        let fired = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.generation += 1;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.pending.take()
        };
        if let Some(event) = fired {
            (self.handler)(event);
        }
    }

    /// Cancel the pending fire without invoking the handler.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.pending = None;
    }

    /// Change the quiescence window; takes effect on the next `handle`.
    pub fn set_wait(&self, wait: Duration) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).wait = wait;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handlers_fire_in_subscription_order() {
        let event: Event<i32> = Event::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l1 = log.clone();
        event.subscribe(move |v| l1.lock().unwrap().push(("first", *v)));
        let l2 = log.clone();
        event.subscribe(move |v| l2.lock().unwrap().push(("second", *v)));

        event.trigger(&7);
        assert_eq!(*log.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn unsubscribe_removes_only_the_token_owner() {
        let event: Event<()> = Event::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        let t1 = event.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        let _t2 = event.subscribe(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        event.unsubscribe(t1);
        event.trigger(&());
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn late_subscribers_miss_in_flight_triggers() {
        let event: Event<()> = Event::new();
        let count = Arc::new(AtomicUsize::new(0));

        let outer = event.clone();
        let c = count.clone();
        event.subscribe(move |_| {
            let c = c.clone();
            outer.subscribe(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        event.trigger(&());
        assert_eq!(count.load(Ordering::SeqCst), 0, "new handler must not see the in-flight trigger");
        event.trigger(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_fires_once_with_last_event() {
        let fired: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let debounce = Debounce::new(move |v| sink.lock().unwrap().push(v), Duration::from_millis(50));

        for i in 0..5 {
            debounce.handle(i);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(fired.lock().unwrap().is_empty(), "must not fire inside the burst");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(*fired.lock().unwrap(), vec![4]);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_flush_fires_immediately() {
        let fired: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let debounce = Debounce::new(move |v| sink.lock().unwrap().push(v), Duration::from_millis(50));

        debounce.handle(1);
        debounce.flush();
        assert_eq!(*fired.lock().unwrap(), vec![1]);

        // The cancelled timer must not fire a second time.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(*fired.lock().unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_clear_cancels_without_firing() {
        let fired: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let debounce = Debounce::new(move |v| sink.lock().unwrap().push(v), Duration::from_millis(50));

        debounce.handle(1);
        debounce.clear();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_wait_change_applies_on_next_handle() {
        let fired: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let debounce = Debounce::new(move |v| sink.lock().unwrap().push(v), Duration::from_millis(50));

        debounce.set_wait(Duration::from_millis(10));
        debounce.handle(1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*fired.lock().unwrap(), vec![1]);
    }
}
