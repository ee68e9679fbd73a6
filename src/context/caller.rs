// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use serde::{Deserialize, Serialize};

/// Identity on whose behalf an operation runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Caller {
    /// Authenticated end user.
    #[serde(rename_all = "camelCase")]
    DomainUser { user_id: String },

    /// Request without credentials.
    #[default]
    AnonymousUser,

    /// Internal module acting for a user.
    ModuleCaller { name: String, user: Box<Caller> },
}

impl Caller {
    pub fn domain_user(user_id: impl Into<String>) -> Self {
        Caller::DomainUser {
            user_id: user_id.into(),
        }
    }

    pub fn module(name: impl Into<String>, user: Caller) -> Self {
        Caller::ModuleCaller {
            name: name.into(),
            user: Box::new(user),
        }
    }

    /// Id of the end user behind this caller, following module delegation.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Caller::DomainUser { user_id } => Some(user_id),
            Caller::AnonymousUser => None,
            Caller::ModuleCaller { user, .. } => user.user_id(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Caller::AnonymousUser)
    }
}
