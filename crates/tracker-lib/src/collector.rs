//! Concurrent fetch across providers
//!
//! Every enabled provider is fetched on its own tokio task. All tasks are awaited before
//! the cycle continues, and readings are merged in provider order so the resulting store
//! is independent of which fetch finished first.

use crate::models::Reading;
use crate::provider::{FetchAttempt, ProviderClient};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Readings produced by the most recent cycle
///
/// Each cycle replaces the previous contents wholesale.
#[derive(Debug, Clone, Default)]
pub struct ReadingStore {
    readings: Arc<RwLock<Vec<Reading>>>,
}

impl ReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored readings with the output of a new cycle
    pub fn replace(&self, readings: Vec<Reading>) {
        let mut guard = match self.readings.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = readings;
    }

    /// Snapshot of the current readings
    pub fn readings(&self) -> Vec<Reading> {
        match self.readings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.readings.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Merged output of one fetch round
#[derive(Debug, Clone, Default)]
pub struct CollectionReport {
    pub readings: Vec<Reading>,
    /// One attempt per provider, in provider order
    pub attempts: Vec<FetchAttempt>,
}

impl CollectionReport {
    pub fn success_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.attempts.len() - self.success_count()
    }
}

/// Fetch from every provider concurrently and merge in provider order
pub async fn collect_all(providers: &[ProviderClient]) -> CollectionReport {
    let handles: Vec<_> = providers
        .iter()
        .map(|provider| {
            let provider = provider.clone();
            tokio::spawn(async move { provider.fetch().await })
        })
        .collect();

    let mut report = CollectionReport::default();

    for (provider, handle) in providers.iter().zip(handles) {
        match handle.await {
            Ok((readings, attempt)) => {
                report.readings.extend(readings);
                report.attempts.push(attempt);
            }
            Err(e) => {
                warn!(provider = %provider.name(), error = %e, "Provider fetch task aborted");
                report.attempts.push(FetchAttempt::failed(
                    provider.name(),
                    Duration::ZERO,
                    e.to_string(),
                ));
            }
        }
    }

    debug!(
        providers = providers.len(),
        readings = report.readings.len(),
        failures = report.failure_count(),
        "Collection round complete"
    );

    report
}
