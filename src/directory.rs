// User directory.
//
// Maps human-readable handles to user ids. The core engine only ever reads
// it; registration happens at the API boundary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub handle: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDirectory {
    users: BTreeMap<i64, UserProfile>,
    next_id: i64,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new user under a unique handle (case-insensitive).
    pub fn register(&mut self, handle: &str, email: &str) -> Result<UserProfile, String> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err("Handle must not be empty".to_string());
        }
        if self.by_handle(handle).is_some() {
            return Err(format!("Handle '{}' is already registered", handle));
        }

        let id = self.next_id;
        self.next_id += 1;
        let profile = UserProfile {
            id,
            handle: handle.to_string(),
            email: email.trim().to_string(),
            created_at: Utc::now(),
        };
        self.users.insert(id, profile.clone());
        info!(user = id, handle = %profile.handle, "user registered");
        Ok(profile)
    }

    pub fn by_id(&self, id: i64) -> Option<&UserProfile> {
        self.users.get(&id)
    }

    pub fn by_handle(&self, handle: &str) -> Option<&UserProfile> {
        let needle = handle.trim().to_lowercase();
        self.users
            .values()
            .find(|u| u.handle.to_lowercase() == needle)
    }

    pub fn all(&self) -> impl Iterator<Item = &UserProfile> {
        self.users.values()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
