//! Per-field lease store.
//!
//! A lease is a time-bounded exclusive claim on one field of one form.
//! Each `(form, field)` key is either free or held; holding means an
//! unexpired `expires_at`. Expiry is the only release mechanism -- there
//! is no unlock call -- so an expired lease must read exactly like an
//! absent one. The check is an explicit timestamp comparison against an
//! injectable clock rather than a store-native TTL, which keeps the
//! timeout behaviour testable.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Source of "now" for lease expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A live claim on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLease {
    pub owner_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a lock attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LockAttempt {
    Granted,
    Denied { owner_id: String },
}

/// Arbiter of field ownership. Implementations must make each call
/// atomic per key; that atomicity is the only serialization the update
/// path relies on.
pub trait LeaseStore: Send + Sync {
    /// Acquire or renew the lease on `(form_id, field)` for `user_id`.
    /// Re-acquiring a lease the caller already holds is indistinguishable
    /// from renewing it.
    fn try_acquire(&self, form_id: &str, field: &str, user_id: &str, ttl: Duration) -> LockAttempt;

    /// Current live owner, if any. Expired leases read as absent.
    fn holder(&self, form_id: &str, field: &str) -> Option<String>;

    /// Extend the lease if `user_id` currently holds it. Returns whether
    /// a renewal happened.
    fn renew(&self, form_id: &str, field: &str, user_id: &str, ttl: Duration) -> bool;

    /// Number of currently live leases, for diagnostics.
    fn live_count(&self) -> usize;
}

pub struct InMemoryLeaseStore {
    leases: Mutex<HashMap<(String, String), FieldLease>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLeaseStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    fn key(form_id: &str, field: &str) -> (String, String) {
        (form_id.to_string(), field.to_string())
    }
}

impl LeaseStore for InMemoryLeaseStore {
    fn try_acquire(&self, form_id: &str, field: &str, user_id: &str, ttl: Duration) -> LockAttempt {
        let mut leases = self.leases.lock().unwrap();
        let now = self.clock.now();
        let key = Self::key(form_id, field);
        match leases.get(&key) {
            Some(lease) if lease.expires_at > now && lease.owner_id != user_id => {
                LockAttempt::Denied {
                    owner_id: lease.owner_id.clone(),
                }
            }
            // Free, expired, or already ours: (re)take it.
            _ => {
                leases.insert(
                    key,
                    FieldLease {
                        owner_id: user_id.to_string(),
                        expires_at: now + ttl,
                    },
                );
                LockAttempt::Granted
            }
        }
    }

    fn holder(&self, form_id: &str, field: &str) -> Option<String> {
        let mut leases = self.leases.lock().unwrap();
        let now = self.clock.now();
        let key = Self::key(form_id, field);
        match leases.get(&key) {
            Some(lease) if lease.expires_at > now => Some(lease.owner_id.clone()),
            Some(_) => {
                // Expired: drop the entry so the map does not grow.
                leases.remove(&key);
                None
            }
            None => None,
        }
    }

    fn renew(&self, form_id: &str, field: &str, user_id: &str, ttl: Duration) -> bool {
        let mut leases = self.leases.lock().unwrap();
        let now = self.clock.now();
        match leases.get_mut(&Self::key(form_id, field)) {
            Some(lease) if lease.expires_at > now && lease.owner_id == user_id => {
                lease.expires_at = now + ttl;
                true
            }
            _ => false,
        }
    }

    fn live_count(&self) -> usize {
        let leases = self.leases.lock().unwrap();
        let now = self.clock.now();
        leases.values().filter(|l| l.expires_at > now).count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Test clock that only moves when told to.
    pub(crate) struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Utc::now()),
            })
        }

        pub(crate) fn advance(&self, duration: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += duration;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    const TTL_SECS: i64 = 3;

    fn ttl() -> Duration {
        Duration::seconds(TTL_SECS)
    }

    #[test]
    fn second_user_is_denied_while_lease_is_live() {
        let clock = ManualClock::new();
        let store = InMemoryLeaseStore::new(clock.clone());

        assert_eq!(store.try_acquire("f1", "email", "a", ttl()), LockAttempt::Granted);
        assert_eq!(
            store.try_acquire("f1", "email", "b", ttl()),
            LockAttempt::Denied {
                owner_id: "a".to_string()
            }
        );
        assert_eq!(store.holder("f1", "email").as_deref(), Some("a"));
    }

    #[test]
    fn reacquiring_own_lease_renews_without_changing_owner() {
        let clock = ManualClock::new();
        let store = InMemoryLeaseStore::new(clock.clone());

        assert_eq!(store.try_acquire("f1", "email", "a", ttl()), LockAttempt::Granted);
        clock.advance(Duration::seconds(2));
        // One second of lifetime left; re-acquiring resets it to three.
        assert_eq!(store.try_acquire("f1", "email", "a", ttl()), LockAttempt::Granted);
        clock.advance(Duration::seconds(2));
        assert_eq!(store.holder("f1", "email").as_deref(), Some("a"));
    }

    #[test]
    fn unrenewed_lease_becomes_acquirable_after_timeout() {
        let clock = ManualClock::new();
        let store = InMemoryLeaseStore::new(clock.clone());

        assert_eq!(store.try_acquire("f1", "email", "a", ttl()), LockAttempt::Granted);
        clock.advance(Duration::seconds(TTL_SECS + 1));
        assert_eq!(store.holder("f1", "email"), None);
        assert_eq!(store.try_acquire("f1", "email", "b", ttl()), LockAttempt::Granted);
        assert_eq!(store.holder("f1", "email").as_deref(), Some("b"));
    }

    #[test]
    fn renew_fails_for_non_holder_and_expired_lease() {
        let clock = ManualClock::new();
        let store = InMemoryLeaseStore::new(clock.clone());

        assert!(!store.renew("f1", "email", "a", ttl()));
        store.try_acquire("f1", "email", "a", ttl());
        assert!(!store.renew("f1", "email", "b", ttl()));
        clock.advance(Duration::seconds(TTL_SECS + 1));
        assert!(!store.renew("f1", "email", "a", ttl()));
    }

    #[test]
    fn leases_on_different_fields_are_independent() {
        let clock = ManualClock::new();
        let store = InMemoryLeaseStore::new(clock.clone());

        assert_eq!(store.try_acquire("f1", "email", "a", ttl()), LockAttempt::Granted);
        assert_eq!(store.try_acquire("f1", "age", "b", ttl()), LockAttempt::Granted);
        assert_eq!(store.try_acquire("f2", "email", "b", ttl()), LockAttempt::Granted);
        assert_eq!(store.live_count(), 3);
    }

    #[test]
    fn at_most_one_holder_under_concurrent_acquisition() {
        let clock = ManualClock::new();
        let store = Arc::new(InMemoryLeaseStore::new(clock));

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                let user = format!("user-{i}");
                matches!(
                    store.try_acquire("f1", "email", &user, ttl()),
                    LockAttempt::Granted
                )
            }));
        }
        let grants = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|granted| *granted)
            .count();
        assert_eq!(grants, 1);
        assert!(store.holder("f1", "email").is_some());
    }
}
