//! Contains common, primitive types shared across the engine.
//!
//! This module defines the key type used to uniquely identify live topic
//! subscriptions on the event bus, plus a small locking helper the rest of
//! the crate uses to keep mutex recovery in one place.

use slotmap::new_key_type;
use std::sync::{Mutex, MutexGuard};

new_key_type! {
    /// Uniquely and safely identifies a registered subscription on the bus.
    ///
    /// This key is returned (inside a [`crate::bus::Subscription`]) when a
    /// handler is attached to a topic. It is guaranteed to be unique and will
    /// not be reused, preventing stale-handle bugs when subscriptions are
    /// removed and re-added.
    pub struct SubscriptionId;
}

/// Locks a mutex, recovering the inner value if a previous holder panicked.
///
/// Bus handlers run under `catch_unwind`, so a panicking listener can poison
/// a consumer-owned mutex without tearing the engine down. The guarded state
/// in this crate is always left consistent between operations, so recovering
/// the guard is safe.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
