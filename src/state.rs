// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::TokenManager;
use crate::outbox::EventRepository;
use crate::storage::StorageBackend;
use crate::uow::TransactionCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TransactionCoordinator>,
    pub events: Arc<EventRepository>,
    pub tokens: Arc<dyn TokenManager>,
}

impl AppState {
    pub fn new(backend: Arc<dyn StorageBackend>, tokens: Arc<dyn TokenManager>) -> Self {
        let coordinator = Arc::new(TransactionCoordinator::new(backend));
        Self {
            events: Arc::new(EventRepository::new(coordinator.clone())),
            coordinator,
            tokens,
        }
    }
}
