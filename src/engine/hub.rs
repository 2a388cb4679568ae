//! Fan-out of engine state changes.
//!
//! Every event gets a hub-wide sequence number when it is prepared. State
//! topics remember their last event and replay it to new subscribers. Each
//! subscriber tracks, per state topic, the newest sequence it has been handed
//! and drops anything older, so replay racing with a live publish can never
//! move a subscriber's view backwards. Signal topics are always delivered.
//!
//! No hub or subscriber lock is held while subscriber code runs.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tracing::{trace, warn};

use super::events::{AdEvent, Topic, Topics};

pub type Callback = dyn Fn(&AdEvent) + Send + Sync;

enum Sink {
    Callback(Arc<Callback>),
    Channel(Sender<AdEvent>),
}

struct Subscriber {
    id: u64,
    topics: Topics,
    sink: Sink,
    seen: Mutex<[u64; 5]>,
}

impl Subscriber {
    /// Returns false once the subscriber can never receive again.
    fn deliver(&self, seq: u64, event: &AdEvent) -> bool {
        let topic = event.topic();
        if topic.is_replayed() {
            let mut marks = self.seen.lock();
            if seq <= marks[topic.index()] {
                trace!(subscriber = self.id, seq, "dropping stale event");
                return true;
            }
            marks[topic.index()] = seq;
        }

        match &self.sink {
            Sink::Channel(tx) => tx.send(event.clone()).is_ok(),
            Sink::Callback(callback) => {
                if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                    warn!(subscriber = self.id, topic = ?event.topic(), "subscriber panicked");
                }
                true
            }
        }
    }
}

#[derive(Default)]
struct HubState {
    next_seq: u64,
    next_id: u64,
    last: [Option<(u64, AdEvent)>; 5],
    subscribers: Vec<Arc<Subscriber>>,
}

/// An event with its sequence number and the subscribers it must reach.
#[must_use]
pub struct Prepared {
    seq: u64,
    event: AdEvent,
    targets: Vec<Arc<Subscriber>>,
}

#[derive(Clone, Default)]
pub struct ListenerHub {
    state: Arc<Mutex<HubState>>,
}

impl ListenerHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to every topic.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AdEvent) + Send + Sync + 'static,
    {
        self.subscribe_topics(Topics::all(), callback)
    }

    pub fn subscribe_topics<F>(&self, topics: Topics, callback: F) -> Subscription
    where
        F: Fn(&AdEvent) + Send + Sync + 'static,
    {
        self.register(topics, Sink::Callback(Arc::new(callback)))
    }

    /// Receive events on an unbounded channel. Dropping the receiver
    /// unsubscribes on the next delivery attempt.
    pub fn subscribe_channel(&self, topics: Topics) -> (Subscription, Receiver<AdEvent>) {
        let (tx, rx) = unbounded();
        (self.register(topics, Sink::Channel(tx)), rx)
    }

    fn register(&self, topics: Topics, sink: Sink) -> Subscription {
        let (subscriber, replay) = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let subscriber = Arc::new(Subscriber {
                id: state.next_id,
                topics,
                sink,
                seen: Mutex::new([0; 5]),
            });
            state.subscribers.push(Arc::clone(&subscriber));
            let replay: Vec<(u64, AdEvent)> = state
                .last
                .iter()
                .flatten()
                .filter(|(_, event)| topics.contains(event.topic()))
                .cloned()
                .collect();
            (subscriber, replay)
        };

        let mut alive = true;
        for (seq, event) in &replay {
            alive &= subscriber.deliver(*seq, event);
        }
        if !alive {
            self.remove(subscriber.id);
        }

        Subscription {
            id: subscriber.id,
            hub: Arc::downgrade(&self.state),
        }
    }

    pub fn publish(&self, event: AdEvent) -> u64 {
        let prepared = self.prepare(event);
        let seq = prepared.seq;
        self.deliver(prepared);
        seq
    }

    /// Assign a sequence number and snapshot the target list. Callers that
    /// must order events with their own state changes prepare under their
    /// lock and [`deliver`](Self::deliver) after releasing it.
    pub fn prepare(&self, event: AdEvent) -> Prepared {
        let mut state = self.state.lock();
        state.next_seq += 1;
        let seq = state.next_seq;
        let topic = event.topic();
        if topic.is_replayed() {
            state.last[topic.index()] = Some((seq, event.clone()));
        }
        let targets = state
            .subscribers
            .iter()
            .filter(|subscriber| subscriber.topics.contains(topic))
            .cloned()
            .collect();
        Prepared { seq, event, targets }
    }

    pub fn deliver(&self, prepared: Prepared) {
        let Prepared {
            seq,
            event,
            targets,
        } = prepared;
        let closed: Vec<u64> = targets
            .iter()
            .filter(|subscriber| !subscriber.deliver(seq, &event))
            .map(|subscriber| subscriber.id)
            .collect();
        for id in closed {
            self.remove(id);
        }
    }

    /// Record a replay value without notifying anyone.
    pub fn seed(&self, event: AdEvent) {
        let topic = event.topic();
        if !topic.is_replayed() {
            return;
        }
        let mut state = self.state.lock();
        state.next_seq += 1;
        let seq = state.next_seq;
        state.last[topic.index()] = Some((seq, event));
    }

    #[must_use]
    pub fn last(&self, topic: Topic) -> Option<AdEvent> {
        self.state.lock().last[topic.index()]
            .as_ref()
            .map(|(_, event)| event.clone())
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    fn remove(&self, id: u64) {
        remove_from(&self.state, id);
    }
}

fn remove_from(state: &Mutex<HubState>, id: u64) {
    state.lock().subscribers.retain(|subscriber| subscriber.id != id);
}

/// Handle that keeps a subscription alive. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    hub: Weak<Mutex<HubState>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }

    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.hub.upgrade() {
            remove_from(&state, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
