// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Event Outbox
//!
//! Domain events are stored in the same work unit as the state change that
//! produced them, then relayed to subscribers once committed.

mod error;
pub mod event;
pub mod relay;
pub mod repository;

pub use error::OutboxError;
pub use event::{AggregateMeta, AggregateSnapshot, DomainEvent, EventMeta, EVENTS};
pub use relay::{EventPublisher, OutboxRelay, PublishError, TracingPublisher};
pub use repository::{is_duplicate_event, EventRepository};
