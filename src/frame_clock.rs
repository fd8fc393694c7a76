//! =============================================================================
//! FRAME_CLOCK.RS - Horloge synchronisée sur le rafraîchissement de l'écran
//! FRAME_CLOCK.RS - Display-refresh-synchronized frame clock
//! =============================================================================
//!
//! Une source matérielle (CVDisplayLink sur macOS) dépose un tick dans un
//! emplacement partagé depuis son propre thread. Le thread UI vide cet
//! emplacement et notifie les abonnés.
//! A hardware source (CVDisplayLink on macOS) drops a tick into a shared
//! slot from its own thread. The UI thread drains that slot and notifies
//! subscribers.
//!
//! The slot holds at most one tick: a tick arriving before the previous one
//! was delivered replaces it, so a slow frame is skipped rather than queued.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use crate::error::FrameClockError;

// =============================================================================
// TYPES PUBLICS
// PUBLIC TYPES
// =============================================================================

/// Horodatages d'un rafraîchissement (secondes, horloge de l'hôte)
/// Timestamps of one refresh (seconds, host clock)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTimestamps {
    /// Time the tick was produced
    pub now: f64,
    /// Predicted time the next frame reaches the display
    pub output: f64,
}

/// Reçoit un appel par rafraîchissement, toujours sur le thread UI
/// Receives one call per refresh, always on the UI thread
pub trait FrameSubscriber {
    fn frame_tick(&mut self, timestamps: FrameTimestamps);
}

/// Minuteur matériel sous-jacent
/// Underlying hardware timer
///
/// The clock only calls `start` when idle and `stop` when running.
pub trait RefreshSource {
    fn start(&mut self);
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

/// Poignée `Send` donnée à la source pour publier ses ticks
/// `Send` handle given to the source to publish its ticks
#[derive(Clone, Debug)]
pub struct TickSender {
    slot: Arc<Mutex<Option<FrameTimestamps>>>,
}

impl TickSender {
    /// Publie un tick en remplaçant celui pas encore livré
    /// Publishes a tick, replacing any tick not yet delivered
    pub fn send(&self, timestamps: FrameTimestamps) {
        if let Ok(mut slot) = self.slot.lock() {
            if slot.replace(timestamps).is_some() {
                trace!("Frame tick coalesced, previous frame not delivered yet");
            }
        }
    }
}

type SubscriberRef = Weak<RefCell<dyn FrameSubscriber>>;

// =============================================================================
// HORLOGE
// CLOCK
// =============================================================================

/// Horloge de rafraîchissement partagée par les vues
/// Refresh clock shared by the views
///
/// Lives on the UI thread. Subscribers are held weakly: dropping the last
/// strong reference to a subscriber silently removes it on the next tick or
/// registry change.
pub struct FrameClock {
    subscribers: RefCell<Vec<SubscriberRef>>,
    source: RefCell<Box<dyn RefreshSource>>,
    slot: Arc<Mutex<Option<FrameTimestamps>>>,
}

impl FrameClock {
    /// Creates the clock and its refresh source
    ///
    /// `make_source` receives the sender the source must publish ticks to.
    /// Failure to create the source is fatal for the caller.
    pub fn new<S, F>(make_source: F) -> Result<Self, FrameClockError>
    where
        S: RefreshSource + 'static,
        F: FnOnce(TickSender) -> Result<S, FrameClockError>,
    {
        let slot = Arc::new(Mutex::new(None));
        let source = make_source(TickSender { slot: Arc::clone(&slot) })?;

        Ok(Self {
            subscribers: RefCell::new(Vec::new()),
            source: RefCell::new(Box::new(source)),
            slot,
        })
    }

    /// Abonne un observateur (sans effet s'il est déjà abonné)
    /// Subscribes an observer (no-op when already subscribed)
    pub fn subscribe(&self, subscriber: &Rc<RefCell<dyn FrameSubscriber>>) {
        {
            let mut subscribers = self.subscribers.borrow_mut();
            subscribers.retain(|weak| weak.strong_count() > 0);

            if subscribers.iter().any(|weak| same_subscriber(weak, subscriber)) {
                return;
            }
            subscribers.push(Rc::downgrade(subscriber));
            debug!("Frame clock subscriber added ({} live)", subscribers.len());
        }
        self.update_running_state();
    }

    /// Désabonne un observateur s'il est présent
    /// Unsubscribes an observer if present
    pub fn unsubscribe(&self, subscriber: &Rc<RefCell<dyn FrameSubscriber>>) {
        {
            let mut subscribers = self.subscribers.borrow_mut();
            let before = subscribers.len();
            subscribers.retain(|weak| weak.strong_count() > 0 && !same_subscriber(weak, subscriber));
            if subscribers.len() != before {
                debug!("Frame clock subscriber removed ({} live)", subscribers.len());
            }
        }
        self.update_running_state();
    }

    /// Livre le tick en attente à tous les abonnés vivants
    /// Delivers the pending tick to every live subscriber
    ///
    /// Must be called from the UI thread. Returns `true` when a tick was
    /// delivered.
    pub fn deliver_pending(&self) -> bool {
        let pending = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(timestamps) = pending else {
            return false;
        };

        // Snapshot first: a subscriber may (un)subscribe from its callback
        let live: Vec<Rc<RefCell<dyn FrameSubscriber>>> = {
            let mut subscribers = self.subscribers.borrow_mut();
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };

        for subscriber in &live {
            match subscriber.try_borrow_mut() {
                Ok(mut subscriber) => subscriber.frame_tick(timestamps),
                Err(_) => trace!("Subscriber busy, frame skipped"),
            }
        }

        self.update_running_state();
        !live.is_empty()
    }

    /// Whether the refresh source is currently running
    pub fn is_running(&self) -> bool {
        self.source.borrow().is_running()
    }

    /// Nombre d'abonnés encore vivants
    /// Number of subscribers still alive
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Idle -> Running on the first subscriber, Running -> Idle after the last
    fn update_running_state(&self) {
        let wanted = {
            let mut subscribers = self.subscribers.borrow_mut();
            subscribers.retain(|weak| weak.strong_count() > 0);
            !subscribers.is_empty()
        };

        let mut source = self.source.borrow_mut();
        if wanted == source.is_running() {
            return;
        }

        if wanted {
            debug!("Frame clock: idle -> running");
            source.start();
        } else {
            debug!("Frame clock: running -> idle");
            source.stop();
        }
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        let source = self.source.get_mut();
        if source.is_running() {
            source.stop();
        }
    }
}

/// Compares allocations only (vtable pointers of `dyn` references may differ)
fn same_subscriber(weak: &SubscriberRef, subscriber: &Rc<RefCell<dyn FrameSubscriber>>) -> bool {
    std::ptr::addr_eq(weak.as_ptr(), Rc::as_ptr(subscriber))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Counter {
        ticks: Vec<FrameTimestamps>,
    }

    impl FrameSubscriber for Counter {
        fn frame_tick(&mut self, timestamps: FrameTimestamps) {
            self.ticks.push(timestamps);
        }
    }

    /// Source that counts start/stop calls through shared cells
    struct CountingSource {
        running: Rc<Cell<bool>>,
        starts: Rc<Cell<u32>>,
        stops: Rc<Cell<u32>>,
    }

    impl RefreshSource for CountingSource {
        fn start(&mut self) {
            self.running.set(true);
            self.starts.set(self.starts.get() + 1);
        }

        fn stop(&mut self) {
            self.running.set(false);
            self.stops.set(self.stops.get() + 1);
        }

        fn is_running(&self) -> bool {
            self.running.get()
        }
    }

    struct Harness {
        clock: FrameClock,
        sender: TickSender,
        starts: Rc<Cell<u32>>,
        stops: Rc<Cell<u32>>,
    }

    fn harness() -> Harness {
        let starts = Rc::new(Cell::new(0));
        let stops = Rc::new(Cell::new(0));
        let mut sender = None;
        let clock = FrameClock::new(|tx| {
            sender = Some(tx);
            Ok(CountingSource {
                running: Rc::new(Cell::new(false)),
                starts: Rc::clone(&starts),
                stops: Rc::clone(&stops),
            })
        })
        .unwrap();
        Harness {
            clock,
            sender: sender.unwrap(),
            starts,
            stops,
        }
    }

    fn counter() -> (Rc<RefCell<Counter>>, Rc<RefCell<dyn FrameSubscriber>>) {
        let concrete = Rc::new(RefCell::new(Counter::default()));
        let erased: Rc<RefCell<dyn FrameSubscriber>> = concrete.clone();
        (concrete, erased)
    }

    fn tick(n: f64) -> FrameTimestamps {
        FrameTimestamps { now: n, output: n + 0.016 }
    }

    #[test]
    fn test_creation_failure_is_reported() {
        let result = FrameClock::new(|_| -> Result<CountingSource, _> {
            Err(FrameClockError::SourceUnavailable(-6661))
        });
        assert!(matches!(result, Err(FrameClockError::SourceUnavailable(-6661))));
    }

    #[test]
    fn test_running_follows_subscriber_count() {
        let h = harness();
        let subs: Vec<_> = (0..3).map(|_| counter()).collect();
        assert!(!h.clock.is_running());

        for (_, erased) in &subs {
            h.clock.subscribe(erased);
        }
        assert!(h.clock.is_running());
        assert_eq!(h.starts.get(), 1);

        h.clock.unsubscribe(&subs[0].1);
        h.clock.unsubscribe(&subs[1].1);
        assert!(h.clock.is_running());

        h.clock.unsubscribe(&subs[2].1);
        assert!(!h.clock.is_running());
        assert_eq!(h.stops.get(), 1);

        // Unsubscribing again is a guarded no-op
        h.clock.unsubscribe(&subs[2].1);
        assert_eq!(h.stops.get(), 1);
    }

    #[test]
    fn test_double_subscribe_delivers_once() {
        let h = harness();
        let (concrete, erased) = counter();
        h.clock.subscribe(&erased);
        h.clock.subscribe(&erased);
        assert_eq!(h.clock.subscriber_count(), 1);

        h.sender.send(tick(1.0));
        assert!(h.clock.deliver_pending());
        assert_eq!(concrete.borrow().ticks.len(), 1);
    }

    #[test]
    fn test_pending_ticks_coalesce() {
        let h = harness();
        let (concrete, erased) = counter();
        h.clock.subscribe(&erased);

        h.sender.send(tick(1.0));
        h.sender.send(tick(2.0));
        h.sender.send(tick(3.0));
        assert!(h.clock.deliver_pending());
        assert!(!h.clock.deliver_pending());

        assert_eq!(concrete.borrow().ticks, vec![tick(3.0)]);
    }

    #[test]
    fn test_ticks_arrive_in_order() {
        let h = harness();
        let (concrete, erased) = counter();
        h.clock.subscribe(&erased);

        for n in 1..=5 {
            h.sender.send(tick(n as f64));
            h.clock.deliver_pending();
        }
        let seen: Vec<f64> = concrete.borrow().ticks.iter().map(|t| t.now).collect();
        assert_eq!(seen, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let h = harness();
        let (concrete, erased) = counter();
        h.clock.subscribe(&erased);
        assert!(h.clock.is_running());

        drop(erased);
        drop(concrete);
        assert_eq!(h.clock.subscriber_count(), 0);

        h.sender.send(tick(1.0));
        assert!(!h.clock.deliver_pending());
        assert!(!h.clock.is_running());
    }

    #[test]
    fn test_subscriber_may_unsubscribe_itself() {
        struct OneShot {
            clock: Rc<FrameClock>,
            me: Option<Rc<RefCell<dyn FrameSubscriber>>>,
            ticks: u32,
        }

        impl FrameSubscriber for OneShot {
            fn frame_tick(&mut self, _timestamps: FrameTimestamps) {
                self.ticks += 1;
                if let Some(me) = self.me.take() {
                    self.clock.unsubscribe(&me);
                }
            }
        }

        let h = harness();
        let clock = Rc::new(h.clock);
        let one_shot = Rc::new(RefCell::new(OneShot {
            clock: Rc::clone(&clock),
            me: None,
            ticks: 0,
        }));
        let erased: Rc<RefCell<dyn FrameSubscriber>> = one_shot.clone();
        one_shot.borrow_mut().me = Some(erased.clone());
        clock.subscribe(&erased);

        h.sender.send(tick(1.0));
        clock.deliver_pending();
        h.sender.send(tick(2.0));
        clock.deliver_pending();

        assert_eq!(one_shot.borrow().ticks, 1);
        assert!(!clock.is_running());
    }
}
