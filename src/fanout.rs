use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use bus::{Bus, BusReader};

use crate::parser::TelemetryFrame;

/// Slots per channel subscriber before events are dropped for that reader.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Everything the ingestion pipeline reports to its subscribers.
///
/// Errors and status changes travel on the same channel as data, as
/// human-readable strings.
#[derive(Clone, Debug)]
pub enum LinkEvent {
    Status(String),
    Error(String),
    /// A received line exactly as assembled, before parsing.
    Raw(String),
    Frame(TelemetryFrame),
    Unmatched(String),
}

impl LinkEvent {
    /// Console rendering of the event.
    pub fn describe(&self) -> String {
        match self {
            LinkEvent::Status(s) | LinkEvent::Error(s) => s.clone(),
            LinkEvent::Raw(line) => line.clone(),
            LinkEvent::Frame(frame) => frame
                .iter()
                .map(|(field, value)| format!("{field}={value}"))
                .collect::<Vec<_>>()
                .join(" "),
            LinkEvent::Unmatched(line) => format!("Unmatched line: {line}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

pub type Callback = Box<dyn FnMut(&LinkEvent) + Send>;

/// Receiving end of a channel subscription.
///
/// Each subscription has its own bounded channel, so a reader that stops
/// draining only loses its own events. Dropping it closes the channel.
pub struct Subscription {
    rx: BusReader<LinkEvent>,
    _alive: Arc<()>,
}

impl Deref for Subscription {
    type Target = BusReader<LinkEvent>;

    fn deref(&self) -> &Self::Target {
        &self.rx
    }
}

impl DerefMut for Subscription {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.rx
    }
}

struct Channel {
    bus: Bus<LinkEvent>,
    alive: Weak<()>,
    dropped: u64,
}

/// Delivers each published event to every registered callback and every
/// channel subscriber.
pub struct Fanout {
    capacity: usize,
    channels: Vec<Channel>,
    callbacks: Vec<(SubscriberId, Callback)>,
    next_id: u64,
    dropped: u64,
}

impl Fanout {
    pub fn new(capacity: usize) -> Self {
        Fanout {
            capacity,
            channels: Vec::new(),
            callbacks: Vec::new(),
            next_id: 0,
            dropped: 0,
        }
    }

    pub fn register(&mut self, callback: Callback) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.callbacks.push((id, callback));
        id
    }

    pub fn unregister(&mut self, id: SubscriberId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(cb_id, _)| *cb_id != id);
        self.callbacks.len() != before
    }

    /// Open a channel subscription. Only events published after this call
    /// are received.
    pub fn subscribe(&mut self) -> Subscription {
        let mut bus = Bus::new(self.capacity);
        let rx = bus.add_rx();
        let alive = Arc::new(());
        self.channels.push(Channel {
            bus,
            alive: Arc::downgrade(&alive),
            dropped: 0,
        });
        Subscription { rx, _alive: alive }
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Open channel subscriptions. Dropped subscriptions are pruned on the
    /// next publish.
    pub fn subscriber_count(&self) -> usize {
        self.channels.len()
    }

    /// Events lost across all channel subscribers because their channel was
    /// full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn publish(&mut self, event: LinkEvent) {
        for (_, callback) in self.callbacks.iter_mut() {
            callback(&event);
        }

        self.channels.retain(|ch| ch.alive.strong_count() > 0);
        for channel in self.channels.iter_mut() {
            if channel.bus.try_broadcast(event.clone()).is_err() {
                channel.dropped += 1;
                self.dropped += 1;
                log::warn!(
                    "Channel subscriber lagging, event dropped ({} so far for this reader)",
                    channel.dropped
                );
            }
        }
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collector() -> (Arc<Mutex<Vec<String>>>, Callback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: Callback = Box::new(move |ev: &LinkEvent| {
            sink.lock().unwrap().push(ev.describe());
        });
        (seen, cb)
    }

    #[test]
    fn every_callback_and_reader_receives() {
        let mut fanout = Fanout::new(16);
        let (a, cb_a) = collector();
        let (b, cb_b) = collector();
        fanout.register(cb_a);
        fanout.register(cb_b);
        let mut rx1 = fanout.subscribe();
        let mut rx2 = fanout.subscribe();

        fanout.publish(LinkEvent::Status("Connected to /dev/ttyUSB0".to_string()));

        assert_eq!(a.lock().unwrap().as_slice(), ["Connected to /dev/ttyUSB0"]);
        assert_eq!(b.lock().unwrap().as_slice(), ["Connected to /dev/ttyUSB0"]);
        assert!(matches!(rx1.try_recv(), Ok(LinkEvent::Status(_))));
        assert!(matches!(rx2.try_recv(), Ok(LinkEvent::Status(_))));
    }

    #[test]
    fn unregistered_callback_stops_receiving() {
        let mut fanout = Fanout::new(16);
        let (seen, cb) = collector();
        let id = fanout.register(cb);

        fanout.publish(LinkEvent::Raw("one".to_string()));
        assert!(fanout.unregister(id));
        assert!(!fanout.unregister(id));
        fanout.publish(LinkEvent::Raw("two".to_string()));

        assert_eq!(seen.lock().unwrap().as_slice(), ["one"]);
        assert_eq!(fanout.callback_count(), 0);
    }

    #[test]
    fn lagging_reader_drops_without_blocking_callbacks() {
        let mut fanout = Fanout::new(1);
        let (seen, cb) = collector();
        fanout.register(cb);
        let mut rx = fanout.subscribe();

        fanout.publish(LinkEvent::Raw("first".to_string()));
        for i in 0..8 {
            fanout.publish(LinkEvent::Raw(format!("extra {i}")));
        }

        assert_eq!(seen.lock().unwrap().len(), 9);
        assert!(fanout.dropped() > 0);
        assert!(matches!(rx.try_recv(), Ok(LinkEvent::Raw(s)) if s == "first"));
    }

    #[test]
    fn stalled_reader_does_not_starve_others() {
        let mut fanout = Fanout::new(4);
        let _stalled = fanout.subscribe();
        let mut active = fanout.subscribe();

        let mut received = Vec::new();
        for i in 0..10 {
            fanout.publish(LinkEvent::Raw(format!("line {i}")));
            while let Ok(ev) = active.try_recv() {
                received.push(ev.describe());
            }
        }

        assert_eq!(received.len(), 10);
        assert_eq!(received[9], "line 9");
        assert!(fanout.dropped() > 0);
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let mut fanout = Fanout::new(4);
        let keep = fanout.subscribe();
        drop(fanout.subscribe());
        assert_eq!(fanout.subscriber_count(), 2);

        fanout.publish(LinkEvent::Status("tick".to_string()));

        assert_eq!(fanout.subscriber_count(), 1);
        drop(keep);
    }

    #[test]
    fn describe_errors_and_frames() {
        assert_eq!(
            LinkEvent::Error("Error reading from serial: boom".to_string()).describe(),
            "Error reading from serial: boom"
        );
        let parser = crate::parser::LineParser::new();
        if let crate::parser::ParseOutcome::Frame { frame, .. } = parser.parse("Vout: 1.5") {
            assert_eq!(LinkEvent::Frame(frame).describe(), "Vout=1.5");
        } else {
            panic!("expected frame");
        }
    }
}
