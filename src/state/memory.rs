//! In-process services state.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, TimeDelta, Utc};

use crate::state::service::Service;
use crate::state::{ServicesState, StateError};

#[derive(Debug)]
struct Inner {
    last_changed: DateTime<Utc>,
    /// hostname -> instance id -> service
    hosts: BTreeMap<String, BTreeMap<String, Service>>,
}

/// Services state held in memory. Every mutation advances `last_changed`.
#[derive(Debug)]
pub struct MemoryState {
    inner: RwLock<Inner>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                last_changed: DateTime::<Utc>::UNIX_EPOCH,
                hosts: BTreeMap::new(),
            }),
        }
    }

    /// Insert or replace an instance, keyed by hostname and id.
    pub fn add_service(&self, svc: Service) {
        let mut inner = self.write();
        inner
            .hosts
            .entry(svc.hostname.clone())
            .or_default()
            .insert(svc.id.clone(), svc);
        touch(&mut inner);
    }

    pub fn remove_service(&self, hostname: &str, id: &str) -> bool {
        let mut inner = self.write();
        let removed = match inner.hosts.get_mut(hostname) {
            Some(services) => services.remove(id).is_some(),
            None => false,
        };
        if removed {
            if inner.hosts.get(hostname).is_some_and(BTreeMap::is_empty) {
                inner.hosts.remove(hostname);
            }
            touch(&mut inner);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().hosts.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Advance the change timestamp, strictly monotonic even within one clock tick.
fn touch(inner: &mut Inner) {
    let now = Utc::now();
    let floor = inner.last_changed + TimeDelta::microseconds(1);
    inner.last_changed = now.max(floor);
}

impl ServicesState for MemoryState {
    fn last_changed(&self) -> Result<DateTime<Utc>, StateError> {
        Ok(self.read().last_changed)
    }

    fn each_service_sorted(&self, visit: &mut dyn FnMut(&Service)) -> Result<(), StateError> {
        let inner = self.read();
        for services in inner.hosts.values() {
            for svc in services.values() {
                visit(svc);
            }
        }
        Ok(())
    }
}
