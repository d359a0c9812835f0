use super::domain::{ServiceId, ServiceRecord};

/// Entity store seam. Writes are optimistic: callers present the version they read.
pub trait ServiceStore: Send + Sync {
    fn get(&self, id: &ServiceId) -> Result<Option<ServiceRecord>, StoreError>;
    fn list(&self) -> Result<Vec<ServiceRecord>, StoreError>;
    /// Store a new record at version 1.
    fn insert(&self, record: ServiceRecord) -> Result<ServiceRecord, StoreError>;
    /// Replace the record only if its stored version still equals `expected_version`.
    /// The committed copy carries `expected_version + 1`.
    fn compare_and_swap(
        &self,
        expected_version: u64,
        next: ServiceRecord,
    ) -> Result<ServiceRecord, StoreError>;

    /// Read, mutate and compare-and-swap until the write lands or `retries` extra
    /// attempts are spent. A mutation that leaves the record untouched is not written.
    fn commit<T, E, F>(&self, id: &ServiceId, retries: u32, mut mutate: F) -> Result<Commit<T>, E>
    where
        Self: Sized,
        F: FnMut(&ServiceRecord) -> Result<(ServiceRecord, T), E>,
        E: From<StoreError>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let current = self
                .get(id)?
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            let (next, output) = mutate(&current)?;
            if next == current {
                return Ok(Commit {
                    after: current.clone(),
                    before: current,
                    output,
                    written: false,
                });
            }

            match self.compare_and_swap(current.version, next) {
                Ok(after) => {
                    return Ok(Commit {
                        before: current,
                        after,
                        output,
                        written: true,
                    })
                }
                Err(StoreError::Conflict { .. }) if attempts <= retries => {
                    tracing::debug!(service_id = %id, attempt = attempts, "version conflict, retrying");
                }
                Err(StoreError::Conflict { .. }) => {
                    return Err(StoreError::RetriesExhausted {
                        service_id: id.clone(),
                        attempts,
                    }
                    .into())
                }
                Err(other) => return Err(other.into()),
            }
        }
    }
}

/// Result of a successful [`ServiceStore::commit`].
#[derive(Debug, Clone)]
pub struct Commit<T> {
    pub before: ServiceRecord,
    pub after: ServiceRecord,
    pub output: T,
    pub written: bool,
}

/// Failures surfaced by a `ServiceStore` backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("service {0} not found")]
    NotFound(ServiceId),
    #[error("service {0} already exists")]
    AlreadyExists(ServiceId),
    #[error("service {service_id} changed concurrently (expected version {expected}, found {actual})")]
    Conflict {
        service_id: ServiceId,
        expected: u64,
        actual: u64,
    },
    #[error("service {service_id} still contended after {attempts} attempts")]
    RetriesExhausted { service_id: ServiceId, attempts: u32 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
