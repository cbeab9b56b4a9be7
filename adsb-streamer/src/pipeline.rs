//! Ingest/dispatch pipeline.
//!
//! ```text
//! source ──lines──▶ aggregator (owns Tracker) ──queue──▶ dispatcher ──▶ sink
//!                        ▲                                   │
//!                        └──────── (icao, finished_at) ──────┘
//! ```
//!
//! The aggregator is the only task touching aircraft state. A single
//! dispatcher delivers notifications in FIFO order, so a slow or rate-limited
//! sink delays notifications but never ingestion.

use std::sync::Arc;
use std::time::Duration;

use adsb_core::tracker::Notification;
use adsb_core::{icao_to_string, Clock, Icao, Tracker};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

use crate::notification::NotificationSink;

/// Capacity of the source → aggregator channel.
pub const LINE_CHANNEL_CAPACITY: usize = 1024;

/// How often idle aircraft are evicted, when eviction is enabled.
const PRUNE_INTERVAL: Duration = Duration::from_secs(30);

type Completion = (Icao, f64);

pub struct Pipeline {
    tracker: Tracker,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    queue_capacity: usize,
    aircraft_idle: Option<f64>,
}

impl Pipeline {
    pub fn new(
        tracker: Tracker,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        queue_capacity: usize,
    ) -> Self {
        Pipeline {
            tracker,
            sink,
            clock,
            queue_capacity: queue_capacity.max(1),
            aircraft_idle: None,
        }
    }

    /// Evict aircraft not heard from for `max_idle` seconds.
    pub fn with_idle_eviction(mut self, max_idle: Option<f64>) -> Self {
        self.aircraft_idle = max_idle;
        self
    }

    /// Process lines until the channel closes, then wait for queued
    /// notifications to finish. Returns the tracker in its final state.
    pub async fn run(self, mut lines: mpsc::Receiver<String>) -> Tracker {
        let Pipeline {
            mut tracker,
            sink,
            clock,
            queue_capacity,
            aircraft_idle,
        } = self;

        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch_loop(queue_rx, sink, clock, done_tx));

        let mut prune = tokio::time::interval(PRUNE_INTERVAL);
        prune.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                Some((icao, at)) = done_rx.recv() => {
                    tracker.notification_finished(&icao, at);
                }
                line = lines.recv() => match line {
                    Some(line) => handle_line(&mut tracker, &queue_tx, &line).await,
                    None => break,
                },
                _ = prune.tick(), if aircraft_idle.is_some() => {
                    if let Some(max_idle) = aircraft_idle {
                        let removed = tracker.prune_idle(max_idle);
                        if removed > 0 {
                            debug!(removed, tracked = tracker.store().len(), "evicted idle aircraft");
                        }
                    }
                }
            }
        }

        drop(queue_tx);
        while let Some((icao, at)) = done_rx.recv().await {
            tracker.notification_finished(&icao, at);
        }
        if let Err(e) = dispatcher.await {
            error!(error = %e, "dispatcher task failed");
        }
        tracker
    }
}

async fn handle_line(tracker: &mut Tracker, queue: &mpsc::Sender<Notification>, line: &str) {
    let cpr_failures = tracker.counters.cpr_failures;

    match tracker.process_line(line) {
        Ok(Some(notification)) => {
            info!(
                icao = %icao_to_string(&notification.icao),
                "aircraft complete, queueing notification"
            );
            if queue.send(notification).await.is_err() {
                error!("dispatch queue closed, notification dropped");
            }
        }
        Ok(None) => {}
        Err(e) => trace!(error = %e, "line skipped"),
    }

    if tracker.counters.cpr_failures > cpr_failures {
        debug!(line, "CPR pair did not resolve, keeping previous position");
    }
}

async fn dispatch_loop(
    mut queue: mpsc::Receiver<Notification>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    done: mpsc::UnboundedSender<Completion>,
) {
    while let Some(Notification { icao, record }) = queue.recv().await {
        let label = icao_to_string(&icao);
        // A panicking sink must still report completion, or the aircraft
        // stays pending forever.
        let sink = sink.clone();
        let delivery = tokio::spawn(async move { sink.deliver(&record).await });
        match delivery.await {
            Ok(Ok(attempts)) => info!(icao = %label, attempts, "notification delivered"),
            Ok(Err(e)) => error!(icao = %label, error = %e, "notification failed"),
            Err(e) => error!(icao = %label, error = %e, "notification task aborted"),
        }
        if done.send((icao, clock.now())).is_err() {
            break;
        }
    }
}
