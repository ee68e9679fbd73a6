// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Outbox Relay
//!
//! Background task that delivers committed events to subscribers.
//!
//! ## Strategy
//!
//! Every `poll_interval` (default 5 s) the relay:
//! 1. Lists unpublished events in insertion order.
//! 2. Hands each one to the configured [`EventPublisher`].
//! 3. Marks it published once the publisher accepted it.
//!
//! A publish failure leaves the event unpublished; it is retried on the next
//! sweep. Delivery is therefore at-least-once.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{DomainEvent, EventRepository};

/// Default interval between relay sweeps.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
#[error("failed to publish event: {0}")]
pub struct PublishError(pub String);

/// Delivery target for outbox events (message bus, webhook, ...).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError>;
}

/// Publisher that only logs each event.
#[derive(Debug, Default, Clone)]
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        info!(
            event_id = %event.event_id(),
            action_id = %event.idempotency_key(),
            name = %event.name(),
            module = %event.source_module(),
            "Domain event published"
        );
        Ok(())
    }
}

pub struct OutboxRelay {
    repository: Arc<EventRepository>,
    publisher: Arc<dyn EventPublisher>,
    poll_interval: Duration,
}

impl OutboxRelay {
    pub fn new(repository: Arc<EventRepository>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            repository,
            publisher,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the relay loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(relay.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "Outbox relay starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Outbox relay shutting down");
                return;
            }

            self.poll_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Outbox relay shutting down");
                    return;
                }
            }
        }
    }

    /// One sweep. Returns the number of events published.
    pub async fn poll_once(&self) -> usize {
        let pending = match self.repository.not_published_events().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Outbox relay: failed to list pending events");
                return 0;
            }
        };

        if pending.is_empty() {
            return 0;
        }

        info!(count = pending.len(), "Outbox relay: publishing pending events");

        let mut published = 0;
        for event in &pending {
            let key = event.idempotency_key();
            if let Err(e) = self.publisher.publish(event).await {
                warn!(action_id = %key, error = %e, "Outbox relay: publish failed, will retry");
                continue;
            }
            match self.repository.mark_as_published(key).await {
                Ok(()) => published += 1,
                Err(e) => {
                    warn!(action_id = %key, error = %e, "Outbox relay: failed to mark event as published");
                }
            }
        }
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AmbientContext, Caller};
    use crate::testing::{self, sample_event};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        seen: Mutex<Vec<String>>,
        reject: Option<String>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
            let key = event.idempotency_key().to_string();
            if self.reject.as_deref() == Some(key.as_str()) {
                return Err(PublishError(format!("rejected {key}")));
            }
            self.seen.lock().unwrap().push(key);
            Ok(())
        }
    }

    async fn seed(state: &crate::state::AppState, keys: &[&str]) {
        for key in keys {
            let ctx = AmbientContext::new(Caller::AnonymousUser);
            let event = sample_event(key);
            let result: Result<(), crate::outbox::OutboxError> = state
                .coordinator
                .run_in_work_unit(ctx, || state.events.add_event(&event))
                .await;
            result.unwrap();
        }
    }

    #[tokio::test]
    async fn publishes_in_order_and_marks() {
        let (state, _dir) = testing::test_state();
        seed(&state, &["e1", "e2"]).await;

        let publisher = Arc::new(RecordingPublisher::default());
        let relay = OutboxRelay::new(state.events.clone(), publisher.clone());

        assert_eq!(relay.poll_once().await, 2);
        assert_eq!(*publisher.seen.lock().unwrap(), vec!["e1", "e2"]);
        assert!(state.events.get_not_published_events().await.unwrap().is_empty());
        assert_eq!(relay.poll_once().await, 0);
    }

    #[tokio::test]
    async fn failed_publish_is_retried_later() {
        let (state, _dir) = testing::test_state();
        seed(&state, &["ok", "bad"]).await;

        let publisher = Arc::new(RecordingPublisher {
            reject: Some("bad".into()),
            ..Default::default()
        });
        let relay = OutboxRelay::new(state.events.clone(), publisher);

        assert_eq!(relay.poll_once().await, 1);
        let pending = state.events.not_published_events().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].idempotency_key(), "bad");
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let (state, _dir) = testing::test_state();
        seed(&state, &["bg"]).await;

        let shutdown = CancellationToken::new();
        let relay = OutboxRelay::new(state.events.clone(), Arc::new(TracingPublisher))
            .with_poll_interval(Duration::from_millis(10));
        let task = tokio::spawn(relay.run(shutdown.clone()));

        for _ in 0..100 {
            if state.events.get_not_published_events().await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        task.await.unwrap();

        assert!(state.events.get_not_published_events().await.unwrap().is_empty());
    }
}
