//! Short-lived cache of resolved model configs, keyed by `(model_id, user_id)`.
//!
//! Entries hold decrypted credentials, so they expire after a bounded TTL and
//! are dropped eagerly when the model or the user's secrets change.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::models::ResolvedModel;

type CacheKey = (Uuid, Option<Uuid>);

struct Entry {
    resolved: ResolvedModel,
    expires_at: Instant,
}

pub struct ConfigCache {
    entries: DashMap<CacheKey, Entry>,
    ttl: Duration,
    capacity: usize,
}

impl ConfigCache {
    /// A zero `ttl` or `capacity` disables caching.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    fn enabled(&self) -> bool {
        !self.ttl.is_zero() && self.capacity > 0
    }

    pub fn get(&self, model_id: Uuid, user_id: Option<Uuid>) -> Option<ResolvedModel> {
        let key = (model_id, user_id);
        let hit = self
            .entries
            .get(&key)
            .map(|e| (e.expires_at, e.resolved.clone()));

        match hit {
            Some((expires_at, resolved)) if expires_at > Instant::now() => Some(resolved),
            Some(_) => {
                self.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, model_id: Uuid, user_id: Option<Uuid>, resolved: ResolvedModel) {
        if !self.enabled() {
            return;
        }

        if self.entries.len() >= self.capacity {
            let now = Instant::now();
            self.entries.retain(|_, e| e.expires_at > now);
        }
        if self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.expires_at)
                .map(|e| *e.key());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(
            (model_id, user_id),
            Entry {
                resolved,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every cached resolution of `model_id`, for all users.
    pub fn invalidate_model(&self, model_id: Uuid) {
        self.entries.retain(|(id, _), _| *id != model_id);
    }

    /// Drop everything resolved on behalf of `user_id`.
    pub fn invalidate_user(&self, user_id: Uuid) {
        self.entries.retain(|(_, user), _| *user != Some(user_id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
