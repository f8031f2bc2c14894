//! # Call Registry
//!
//! Correlates outstanding calls with the responses that settle them.
//!
//! ## Invariants
//!
//! - Identifiers are unique among the calls of one registry: a random per-registry
//!   salt plus a monotonic counter.
//! - An entry is removed by the first settlement for its identifier. Later
//!   settlements for the same identifier report `false` and change nothing.
//! - Entries that are never settled stay forever. There is no sweeping.

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::oneshot;

use crate::metadata::Annotated;
use crate::remote::CallError;

const SALT_LEN: usize = 8;

/// Opaque identifier correlating a request with its response.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CallId(String);

impl CallId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CallId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a pending call is eventually settled with.
pub(crate) type Completion = std::result::Result<Annotated, CallError>;

pub(crate) struct CallRegistry {
    salt: String,
    next: AtomicU64,
    pending: DashMap<CallId, oneshot::Sender<Completion>>,
}

impl CallRegistry {
    pub(crate) fn new() -> Self {
        let salt = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SALT_LEN)
            .map(char::from)
            .collect();

        Self {
            salt,
            next: AtomicU64::new(1),
            pending: DashMap::new(),
        }
    }

    /// Generates the identifier for the next outgoing call.
    pub(crate) fn next_id(&self) -> CallId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        CallId(format!("{}-{}", self.salt, base36(n)))
    }

    /// Reserves a pending entry and returns the receiving half of its completion.
    pub(crate) fn register(&self, id: CallId) -> oneshot::Receiver<Completion> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        rx
    }

    /// Settles and removes the entry for `id`.
    ///
    /// Returns false if no such entry is outstanding.
    pub(crate) fn settle(&self, id: &CallId, completion: Completion) -> bool {
        let Some((_, tx)) = self.pending.remove(id) else {
            return false;
        };
        // The caller may have stopped waiting; that is not our concern.
        let _ = tx.send(completion);
        true
    }

    /// Drops an entry without settling it, used when the request never left.
    pub(crate) fn forget(&self, id: &CallId) -> bool {
        self.pending.remove(id).is_some()
    }

    pub(crate) fn contains(&self, id: &CallId) -> bool {
        self.pending.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::value::Value;

    #[test]
    fn test_ids_are_unique_and_salted() {
        let registry = CallRegistry::new();
        let ids: HashSet<_> = (0..1000).map(|_| registry.next_id()).collect();
        assert_eq!(ids.len(), 1000);

        let id = registry.next_id();
        let (salt, counter) = id.as_str().split_once('-').expect("salt and counter");
        assert_eq!(salt.len(), SALT_LEN);
        assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(counter, base36(1001));
    }

    #[test]
    fn test_base36() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
    }

    #[tokio::test]
    async fn test_settle_once() {
        let registry = CallRegistry::new();
        let id = registry.next_id();
        let rx = registry.register(id.clone());
        assert!(registry.contains(&id));

        assert!(registry.settle(&id, Ok(Annotated::new(1))));
        assert!(!registry.settle(&id, Ok(Annotated::new(2))));
        assert_eq!(registry.len(), 0);

        let settled = rx.await.unwrap().unwrap();
        assert_eq!(settled.value, Value::from(1));
    }

    #[test]
    fn test_unknown_id_changes_nothing() {
        let registry = CallRegistry::new();
        let id = registry.next_id();
        let _rx = registry.register(id);

        assert!(!registry.settle(&CallId::from("stranger-1"), Ok(Annotated::default())));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_forget_removes_without_settling() {
        let registry = CallRegistry::new();
        let id = registry.next_id();
        let mut rx = registry.register(id.clone());

        assert!(registry.forget(&id));
        assert!(!registry.forget(&id));
        assert!(rx.try_recv().is_err());
    }
}
