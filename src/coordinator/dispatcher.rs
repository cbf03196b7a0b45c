//! Write dispatcher
//!
//! One fully assembled request body becomes exactly one `replicate` call.
//! No retries: the client re-resolves the leader and tries again.

use crate::common::{Error, Result};
use crate::coordinator::engine::{self, SharedEngine};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Result of a dispatched write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replicated {
    pub index: u64,
    /// Answered from the idempotency window without a new submission
    pub duplicate: bool,
}

/// Bounded FIFO of recently committed idempotency keys.
struct RecentWrites {
    capacity: usize,
    inner: Mutex<(HashMap<String, u64>, VecDeque<String>)>,
}

impl RecentWrites {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new((
                HashMap::with_capacity(capacity),
                VecDeque::with_capacity(capacity),
            )),
        }
    }

    fn get(&self, key: &str) -> Option<u64> {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.0.get(key).copied()
    }

    fn insert(&self, key: String, index: u64) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let (map, order) = &mut *guard;
        if map.insert(key.clone(), index).is_none() {
            order.push_back(key);
        }
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                map.remove(&oldest);
            }
        }
    }
}

pub struct WriteDispatcher {
    engine: SharedEngine,
    recent: Option<RecentWrites>,
}

impl WriteDispatcher {
    /// `dedup_capacity == 0` disables idempotency keys entirely.
    pub fn new(engine: SharedEngine, dedup_capacity: usize) -> Self {
        Self {
            engine,
            recent: (dedup_capacity > 0).then(|| RecentWrites::new(dedup_capacity)),
        }
    }

    /// Submit `payload` for replication.
    ///
    /// With an idempotency key already seen in the window, the earlier log
    /// index is returned and nothing is submitted. Two concurrent requests
    /// with the same new key may both be submitted.
    pub async fn dispatch(
        &self,
        payload: Bytes,
        idempotency_key: Option<&str>,
    ) -> Result<Replicated> {
        let key = match (&self.recent, idempotency_key) {
            (Some(recent), Some(key)) => {
                if let Some(index) = recent.get(key) {
                    tracing::debug!("Duplicate write for key {}, index {}", key, index);
                    return Ok(Replicated {
                        index,
                        duplicate: true,
                    });
                }
                Some(key.to_string())
            }
            _ => None,
        };

        let len = payload.len();
        let index = engine::call(&self.engine, move |e| e.replicate(&payload))
            .await?
            .map_err(Error::Replicate)?;
        tracing::debug!("Replicated {} bytes at index {}", len, index);

        if let (Some(recent), Some(key)) = (&self.recent, key) {
            recent.insert(key, index);
        }

        Ok(Replicated {
            index,
            duplicate: false,
        })
    }
}
