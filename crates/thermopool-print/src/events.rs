// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pool events and their subscribers.
//
// Two occurrences leave the pool: a printer became unreachable, and a job is
// about to be sent.  Subscribers are owned by the pool; each `Subscription`
// handle unsubscribes when dropped.

use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use thermopool_core::types::{JobId, PrinterId};

/// Something external code may want to react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum PoolEvent {
    /// The pool marked a printer unreachable.
    PrinterUnreachable {
        #[serde(rename = "printerIp")]
        printer: PrinterId,
    },
    /// A job payload is about to be handed to the transport.  Advisory only.
    PrePrintCheck {
        #[serde(rename = "printerIp")]
        printer: PrinterId,
        job_id: Option<JobId>,
    },
}

impl PoolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PrinterUnreachable { .. } => "PrinterUnreachable",
            Self::PrePrintCheck { .. } => "PrePrintCheck",
        }
    }

    pub fn printer(&self) -> &PrinterId {
        match self {
            Self::PrinterUnreachable { printer } | Self::PrePrintCheck { printer, .. } => printer,
        }
    }
}

type Callback = Arc<dyn Fn(&PoolEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(u64, Callback)>,
}

/// Fan-out of pool events to registered callbacks.
#[derive(Clone, Default)]
pub struct EventPublisher {
    inner: Arc<Mutex<Subscribers>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback.  It runs synchronously on the publishing task,
    /// so it should hand heavy work off (e.g. `tokio::spawn`).
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PoolEvent) + Send + Sync + 'static,
    {
        let mut subs = match self.inner.lock() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        };
        subs.next_id += 1;
        let id = subs.next_id;
        subs.entries.push((id, Arc::new(callback)));
        debug!(subscriber = id, "event subscriber registered");
        Subscription {
            id,
            publisher: Arc::downgrade(&self.inner),
        }
    }

    /// Receive events on a channel instead of a callback.
    pub fn channel(&self) -> (Subscription, mpsc::UnboundedReceiver<PoolEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event| {
            // Receiver gone: nothing left to deliver to.
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    /// Deliver an event to every current subscriber, once each, in
    /// registration order.
    pub fn publish(&self, event: PoolEvent) {
        let callbacks: Vec<Callback> = match self.inner.lock() {
            Ok(subs) => subs.entries.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            Err(_) => {
                warn!(event = event.name(), "subscriber list poisoned; event dropped");
                return;
            }
        };
        debug!(
            event = event.name(),
            printer = %event.printer(),
            subscribers = callbacks.len(),
            "publishing pool event"
        );
        for callback in callbacks {
            callback(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().map(|subs| subs.entries.len()).unwrap_or(0)
    }

    /// Drop every subscriber.
    pub fn clear(&self) {
        if let Ok(mut subs) = self.inner.lock() {
            subs.entries.clear();
        }
    }
}

/// Handle for one registered subscriber.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    publisher: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }

    /// Keep the subscriber registered for the lifetime of the publisher.
    pub fn detach(mut self) {
        self.publisher = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.publisher.upgrade() else {
            return;
        };
        if let Ok(mut subs) = inner.lock() {
            subs.entries.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unreachable(ip: &str) -> PoolEvent {
        PoolEvent::PrinterUnreachable { printer: ip.into() }
    }

    #[test]
    fn each_subscriber_sees_each_event_once() {
        let publisher = EventPublisher::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let (a2, b2) = (Arc::clone(&a), Arc::clone(&b));
        let _sa = publisher.subscribe(move |_| {
            a2.fetch_add(1, Ordering::SeqCst);
        });
        let _sb = publisher.subscribe(move |_| {
            b2.fetch_add(1, Ordering::SeqCst);
        });

        publisher.publish(unreachable("10.0.0.5"));
        publisher.publish(unreachable("10.0.0.6"));

        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let publisher = EventPublisher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let sub = publisher.subscribe(move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(publisher.subscriber_count(), 1);

        sub.unsubscribe();
        publisher.publish(unreachable("10.0.0.5"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn detached_subscription_outlives_handle() {
        let publisher = EventPublisher::new();
        publisher.subscribe(|_| {}).detach();
        assert_eq!(publisher.subscriber_count(), 1);
        publisher.clear();
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn channel_delivers_in_publish_order() {
        let publisher = EventPublisher::new();
        let (_sub, mut rx) = publisher.channel();
        publisher.publish(PoolEvent::PrePrintCheck {
            printer: "10.0.0.5".into(),
            job_id: None,
        });
        publisher.publish(unreachable("10.0.0.5"));

        assert_eq!(rx.recv().await.map(|e| e.name()), Some("PrePrintCheck"));
        assert_eq!(rx.recv().await.map(|e| e.name()), Some("PrinterUnreachable"));
    }

    #[test]
    fn events_serialize_with_name_tag() {
        let json = serde_json::to_value(unreachable("10.0.0.5")).expect("serialize");
        assert_eq!(json["event"], "PrinterUnreachable");
        assert_eq!(json["printerIp"], "10.0.0.5");
    }
}
