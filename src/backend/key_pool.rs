// src/backend/key_pool.rs — Round-robin credential failover
//
// The cursor is shared by every concurrent request on the pool. It always
// holds the index of the key most recently used, so the next request
// starts from the key that last worked (or was last tried).

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::infra::errors::{GenBotError, Result};

pub struct KeyPool {
    backend: String,
    keys: Vec<String>,
    cursor: AtomicUsize,
    max_attempts: usize,
}

impl KeyPool {
    /// `max_attempts` of 0 means every key once.
    pub fn new(backend: impl Into<String>, keys: Vec<String>, max_attempts: usize) -> Result<Self> {
        let backend = backend.into();
        if keys.is_empty() {
            return Err(GenBotError::Config(format!("{backend}: key pool is empty")));
        }
        Ok(Self {
            backend,
            keys,
            cursor: AtomicUsize::new(0),
            max_attempts,
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    fn attempts(&self) -> usize {
        match self.max_attempts {
            0 => self.keys.len(),
            n => n.min(self.keys.len()),
        }
    }

    /// Run `attempt` with successive keys until one does not report its
    /// quota exhausted. Any other outcome, success or failure, is returned
    /// as is.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let n = self.keys.len();
        let start = self.cursor() % n;
        let mut last_error = None;
        let mut last_index = start;

        for step in 0..self.attempts() {
            let index = (start + step) % n;
            match attempt(self.keys[index].clone()).await {
                Err(e) if e.is_quota_exhausted() => {
                    tracing::warn!(
                        backend = %self.backend,
                        key_index = index,
                        "Key quota exhausted, rotating: {}",
                        e
                    );
                    last_error = Some(e);
                    last_index = index;
                }
                outcome => {
                    self.cursor.store(index, Ordering::Release);
                    return outcome;
                }
            }
        }

        self.cursor.store(last_index, Ordering::Release);
        Err(last_error
            .unwrap_or_else(|| GenBotError::quota(self.backend.clone(), "no keys were tried")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(matches!(
            KeyPool::new("db", Vec::new(), 0),
            Err(GenBotError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_rotates_past_exhausted_keys() {
        let pool = KeyPool::new("db", keys(&["A", "B", "C"]), 0).unwrap();
        let seen = Mutex::new(Vec::new());
        let result = pool
            .run(|key| {
                seen.lock().push(key.clone());
                async move {
                    if key == "C" {
                        Ok(key)
                    } else {
                        Err(GenBotError::quota("db", "limit exceeded"))
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, "C");
        assert_eq!(*seen.lock(), keys(&["A", "B", "C"]));
        assert_eq!(pool.cursor(), 2);
    }

    #[tokio::test]
    async fn test_other_errors_do_not_rotate() {
        let pool = KeyPool::new("db", keys(&["A", "B"]), 0).unwrap();
        let calls = Mutex::new(0);
        let result: Result<()> = pool
            .run(|_| {
                *calls.lock() += 1;
                async { Err(GenBotError::backend("db", "bad request")) }
            })
            .await;
        assert!(matches!(result, Err(GenBotError::Backend { .. })));
        assert_eq!(*calls.lock(), 1);
        assert_eq!(pool.cursor(), 0);
    }

    #[tokio::test]
    async fn test_all_exhausted_is_bounded() {
        let pool = KeyPool::new("db", keys(&["A", "B", "C"]), 0).unwrap();
        let calls = Mutex::new(0);
        let result: Result<()> = pool
            .run(|_| {
                *calls.lock() += 1;
                async { Err(GenBotError::quota("db", "limit exceeded")) }
            })
            .await;
        assert!(result.unwrap_err().is_quota_exhausted());
        assert_eq!(*calls.lock(), 3);
        assert_eq!(pool.cursor(), 2);
    }

    #[tokio::test]
    async fn test_attempt_ceiling() {
        let pool = KeyPool::new("db", keys(&["A", "B", "C"]), 2).unwrap();
        let calls = Mutex::new(0);
        let _: Result<()> = pool
            .run(|_| {
                *calls.lock() += 1;
                async { Err(GenBotError::quota("db", "limit exceeded")) }
            })
            .await;
        assert_eq!(*calls.lock(), 2);
        assert_eq!(pool.cursor(), 1);
    }

    #[tokio::test]
    async fn test_next_request_starts_at_cursor() {
        let pool = KeyPool::new("db", keys(&["A", "B", "C"]), 0).unwrap();
        let _ = pool
            .run(|key| async move {
                if key == "B" {
                    Ok(())
                } else {
                    Err(GenBotError::quota("db", "limit exceeded"))
                }
            })
            .await;
        assert_eq!(pool.cursor(), 1);

        let first = Mutex::new(None);
        let _ = pool
            .run(|key| {
                let mut first = first.lock();
                if first.is_none() {
                    *first = Some(key);
                }
                async { Ok(()) }
            })
            .await;
        assert_eq!(first.lock().as_deref(), Some("B"));
    }
}
