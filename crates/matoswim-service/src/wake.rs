//! In-process background wake registration.
//!
//! A registered wake is a delayed tokio task that runs one budgeted poll
//! cycle. Registering the same identifier again replaces the pending task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use matoswim_core::{PollScheduler, WakeError, WakeRegistrar, WakeRequest};

/// [`WakeRegistrar`] that schedules wakes on the tokio runtime.
pub struct TokioWakeRegistrar {
    poller: Arc<PollScheduler>,
    this: Weak<TokioWakeRegistrar>,
    generation: AtomicU64,
    pending: Mutex<HashMap<String, (u64, JoinHandle<()>)>>,
}

impl std::fmt::Debug for TokioWakeRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioWakeRegistrar")
            .field("pending", &self.pending().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl TokioWakeRegistrar {
    /// Create a registrar that wakes `poller`.
    pub fn new(poller: Arc<PollScheduler>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            poller,
            this: this.clone(),
            generation: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        })
    }

    #[cfg(test)]
    fn is_pending(&self, identifier: &str) -> bool {
        self.pending().contains_key(identifier)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, (u64, JoinHandle<()>)>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the registration of a wake that is now running, unless a newer
    /// request replaced it.
    fn claim(&self, identifier: &str, generation: u64) -> bool {
        let mut pending = self.pending();
        match pending.get(identifier) {
            Some((current, _)) if *current == generation => {
                pending.remove(identifier);
                true
            }
            _ => false,
        }
    }
}

impl WakeRegistrar for TokioWakeRegistrar {
    fn submit(&self, request: WakeRequest) -> Result<(), WakeError> {
        let rejected = |reason: String| WakeError::Rejected {
            identifier: request.identifier.clone(),
            reason,
        };

        let this = self
            .this
            .upgrade()
            .ok_or_else(|| rejected("registrar dropped".to_string()))?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| rejected(e.to_string()))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let identifier = request.identifier.clone();
        let delay = request.earliest_begin;

        let mut pending = self.pending();
        let task = runtime.spawn({
            let identifier = identifier.clone();
            async move {
                tokio::time::sleep(delay).await;
                if !this.claim(&identifier, generation) {
                    return;
                }
                let outcome = this.poller.handle_background_wake(this.as_ref()).await;
                debug!("Background wake finished: {:?}", outcome);
            }
        });

        if let Some((_, previous)) = pending.insert(identifier.clone(), (generation, task)) {
            previous.abort();
        }
        info!(
            "Background wake '{}' registered in {}s",
            identifier,
            delay.as_secs()
        );
        Ok(())
    }

    fn cancel(&self, identifier: &str) {
        if let Some((_, task)) = self.pending().remove(identifier) {
            task.abort();
            debug!("Background wake '{}' cancelled", identifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use matoswim_core::{
        MemoryStore, MockFetcher, PollOptions, Preferences, ReadingTracker, TrackerOptions,
        local_now,
    };

    fn poller(fetcher: Arc<MockFetcher>) -> Arc<PollScheduler> {
        let tracker = ReadingTracker::activate(
            Preferences::new(MemoryStore::new()),
            None,
            local_now(),
            TrackerOptions::default(),
        )
        .into_shared();
        Arc::new(PollScheduler::new(tracker, fetcher, PollOptions::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_runs_cycle_and_rearms() {
        let fetcher = Arc::new(MockFetcher::with_temperature(18.5));
        let poller = poller(fetcher.clone());
        let registrar = TokioWakeRegistrar::new(Arc::clone(&poller));
        let id = poller.options().wake_identifier.clone();

        poller.enter_background(registrar.as_ref()).unwrap();
        assert!(registrar.is_pending(&id));

        tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;
        assert_eq!(fetcher.fetch_count(), 1);
        assert!(registrar.is_pending(&id));

        tokio::time::sleep(Duration::from_secs(15 * 60)).await;
        assert_eq!(fetcher.fetch_count(), 2);

        poller.enter_foreground(registrar.as_ref());
        assert!(!registrar.is_pending(&id));
        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmit_replaces_pending_wake() {
        let fetcher = Arc::new(MockFetcher::with_temperature(18.5));
        let poller = poller(fetcher.clone());
        let registrar = TokioWakeRegistrar::new(Arc::clone(&poller));

        registrar
            .submit(WakeRequest::new("a", Duration::from_secs(10)))
            .unwrap();
        registrar
            .submit(WakeRequest::new("a", Duration::from_secs(20)))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(fetcher.fetch_count(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fetcher.fetch_count(), 1);

        registrar.cancel("a");
    }
}
