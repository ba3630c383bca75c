//! In-flight task markers
//!
//! At most one exporter may run per datatype. The marker is a settings row
//! holding the epoch second it was taken; markers older than the task timeout
//! are treated as left behind by a killed process and taken over.

use crate::adapters::database::traits::SettingsStore;
use crate::domain::{DatatypeName, HarvestError, Result};
use std::future::Future;
use std::sync::Arc;

fn marker_key(datatype: &DatatypeName) -> String {
    format!("task.in_flight.{datatype}")
}

pub struct TaskGuard {
    settings: Arc<dyn SettingsStore>,
    timeout_seconds: i64,
}

impl TaskGuard {
    pub fn new(settings: Arc<dyn SettingsStore>, timeout_seconds: u64) -> Self {
        Self {
            settings,
            timeout_seconds: i64::try_from(timeout_seconds).unwrap_or(i64::MAX),
        }
    }

    /// Take the marker for a datatype
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::TaskInFlight`] if a live marker exists.
    pub async fn acquire(&self, datatype: &DatatypeName) -> Result<()> {
        let key = marker_key(datatype);
        let now = chrono::Utc::now().timestamp();

        if self.settings.set_setting_if_absent(&key, &now.to_string()).await? {
            return Ok(());
        }

        let Some(marker) = self.settings.get_setting(&key).await? else {
            return self.claim(datatype, &key, now).await;
        };
        let taken_at = marker.parse::<i64>().unwrap_or(0);
        if now.saturating_sub(taken_at) <= self.timeout_seconds {
            return Err(HarvestError::TaskInFlight(datatype.to_string()));
        }

        // Only the stale value read above may be removed
        if !self.settings.delete_setting_if(&key, &marker).await? {
            return Err(HarvestError::TaskInFlight(datatype.to_string()));
        }
        tracing::warn!(datatype = %datatype, taken_at, "Took over stale task marker");
        self.claim(datatype, &key, now).await
    }

    async fn claim(&self, datatype: &DatatypeName, key: &str, now: i64) -> Result<()> {
        if self.settings.set_setting_if_absent(key, &now.to_string()).await? {
            Ok(())
        } else {
            Err(HarvestError::TaskInFlight(datatype.to_string()))
        }
    }

    pub async fn release(&self, datatype: &DatatypeName) -> Result<()> {
        self.settings.delete_setting(&marker_key(datatype)).await
    }

    /// Run `task` while holding the marker, releasing it whatever the outcome
    pub async fn run<F, Fut, T>(&self, datatype: &DatatypeName, task: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.acquire(datatype).await?;
        let outcome = task().await;
        let released = self.release(datatype).await;
        let value = outcome?;
        released?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;

    fn users() -> DatatypeName {
        DatatypeName::new("users").unwrap()
    }

    #[tokio::test]
    async fn test_second_acquire_is_rejected() {
        let guard = TaskGuard::new(Arc::new(MemoryStore::new()), 3600);
        guard.acquire(&users()).await.unwrap();
        assert!(matches!(
            guard.acquire(&users()).await,
            Err(HarvestError::TaskInFlight(_))
        ));

        guard.release(&users()).await.unwrap();
        guard.acquire(&users()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_marker_is_taken_over() {
        let store = Arc::new(MemoryStore::new());
        store.set_setting("task.in_flight.users", "100").await.unwrap();

        let guard = TaskGuard::new(store, 60);
        guard.acquire(&users()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_marker_is_taken_over_once() {
        let store = Arc::new(MemoryStore::new());
        store.set_setting("task.in_flight.users", "100").await.unwrap();
        let first = TaskGuard::new(store.clone(), 60);
        let second = TaskGuard::new(store.clone(), 60);

        // The second guard read the same stale value before the first replaced it
        let stale = store.get_setting("task.in_flight.users").await.unwrap().unwrap();
        first.acquire(&users()).await.unwrap();
        let fresh = store.get_setting("task.in_flight.users").await.unwrap().unwrap();

        assert!(!store
            .delete_setting_if("task.in_flight.users", &stale)
            .await
            .unwrap());
        assert!(matches!(
            second.acquire(&users()).await,
            Err(HarvestError::TaskInFlight(_))
        ));
        assert_eq!(
            store.get_setting("task.in_flight.users").await.unwrap(),
            Some(fresh)
        );
    }

    #[tokio::test]
    async fn test_concurrent_takeovers_admit_one_guard() {
        let store = Arc::new(MemoryStore::new());
        store.set_setting("task.in_flight.users", "100").await.unwrap();
        let first = TaskGuard::new(store.clone(), 60);
        let second = TaskGuard::new(store.clone(), 60);

        let (users_a, users_b) = (users(), users());
        let (a, b) = tokio::join!(first.acquire(&users_a), second.acquire(&users_b));
        assert_eq!(
            [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_run_releases_on_error() {
        let guard = TaskGuard::new(Arc::new(MemoryStore::new()), 3600);
        let failed: Result<()> = guard
            .run(&users(), || async { Err(HarvestError::Storage("disk full".to_string())) })
            .await;
        assert!(failed.is_err());

        let value = guard
            .run(&users(), || async { Ok::<_, HarvestError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
