use super::{Store, WorkUnit};
use crate::error::StoreError;
use courier_config::PersistenceConfig;
use courier_types::Address;
use std::thread;
use std::time::Duration;
use tracing::{error, warn};

/// Retries [`StoreError::Transient`] failures of the wrapped store with
/// linear backoff. Fatal errors and exhausted retries are returned.
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
    max_attempts: u32,
    backoff: Duration,
}

impl<S: Store> RetryingStore<S> {
    pub fn new(inner: S, config: &PersistenceConfig) -> Self {
        Self {
            inner,
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn with_retry<T>(
        &self,
        operation: &str,
        mut attempt_fn: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut attempt = 1;
        loop {
            match attempt_fn() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Transient store failure, retrying"
                    );
                    thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(err) => {
                    error!(operation, attempt, error = %err, "Store operation failed");
                    return Err(err);
                }
            }
        }
    }
}

impl<S: Store> Store for RetryingStore<S> {
    fn store(
        &self,
        address: &Address,
        checkpoint: &[u8],
        pending: &[Vec<u8>],
    ) -> Result<(), StoreError> {
        self.with_retry("store", || self.inner.store(address, checkpoint, pending))
    }

    fn discard(&self, address: &Address) -> Result<(), StoreError> {
        self.with_retry("discard", || self.inner.discard(address))
    }

    fn take(&self) -> Result<WorkUnit, StoreError> {
        self.with_retry("take", || self.inner.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls with the given error
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicU32,
        error: StoreError,
        calls: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32, error: StoreError) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures: AtomicU32::new(failures),
                error,
                calls: AtomicU32::new(0),
            }
        }

        fn trip(&self) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(self.error.clone());
            }
            Ok(())
        }
    }

    impl Store for FlakyStore {
        fn store(
            &self,
            address: &Address,
            checkpoint: &[u8],
            pending: &[Vec<u8>],
        ) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.store(address, checkpoint, pending)
        }

        fn discard(&self, address: &Address) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.discard(address)
        }

        fn take(&self) -> Result<WorkUnit, StoreError> {
            self.trip()?;
            self.inner.take()
        }
    }

    fn config(max_attempts: u32) -> PersistenceConfig {
        PersistenceConfig {
            max_attempts,
            retry_backoff_ms: 1,
        }
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let flaky = FlakyStore::new(2, StoreError::Transient("disk busy".into()));
        let store = RetryingStore::new(flaky, &config(5));
        let address: Address = "r:a".parse().unwrap();

        store.store(&address, b"s", &[b"m".to_vec()]).unwrap();
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.take().unwrap().address, address);
    }

    #[test]
    fn test_retries_are_bounded() {
        let flaky = FlakyStore::new(10, StoreError::Transient("disk busy".into()));
        let store = RetryingStore::new(flaky, &config(3));

        let err = store.discard(&"r:a".parse().unwrap()).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_fatal_errors_are_not_retried() {
        let flaky = FlakyStore::new(1, StoreError::Fatal("bad schema".into()));
        let store = RetryingStore::new(flaky, &config(5));

        let err = store.store(&"r:a".parse().unwrap(), b"s", &[]).unwrap_err();
        assert_eq!(err, StoreError::Fatal("bad schema".into()));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
    }
}
