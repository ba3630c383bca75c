//! Persisted migration position

use crate::adapters::database::traits::SettingsStore;
use crate::domain::{DatatypeName, HarvestError, Result};

pub const CURRENT_DATATYPE: &str = "migration.current_datatype";
pub const CURRENT_OFFSET: &str = "migration.current_offset";

/// Stored in [`CURRENT_DATATYPE`] once every datatype is migrated
const COMPLETE_SENTINEL: &str = "#complete";

/// Where the historical backfill stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    NotStarted,
    InProgress { datatype: DatatypeName, offset: u64 },
    AllComplete,
}

impl MigrationState {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress { .. })
    }

    /// # Errors
    ///
    /// Returns a state error if the stored values cannot be parsed.
    pub async fn load(settings: &dyn SettingsStore) -> Result<Self> {
        let Some(datatype) = settings.get_setting(CURRENT_DATATYPE).await? else {
            return Ok(Self::NotStarted);
        };
        if datatype == COMPLETE_SENTINEL {
            return Ok(Self::AllComplete);
        }

        let datatype = DatatypeName::new(datatype)
            .map_err(|e| HarvestError::State(format!("Invalid migration datatype: {e}")))?;
        let offset = match settings.get_setting(CURRENT_OFFSET).await? {
            Some(value) => value
                .parse()
                .map_err(|_| HarvestError::State(format!("Invalid migration offset: {value}")))?,
            None => 0,
        };
        Ok(Self::InProgress { datatype, offset })
    }

    pub async fn save(&self, settings: &dyn SettingsStore) -> Result<()> {
        match self {
            Self::NotStarted => {
                settings.delete_setting(CURRENT_DATATYPE).await?;
                settings.delete_setting(CURRENT_OFFSET).await
            }
            Self::InProgress { datatype, offset } => {
                let offset = offset.to_string();
                settings
                    .set_settings(&[
                        (CURRENT_DATATYPE, datatype.as_str()),
                        (CURRENT_OFFSET, offset.as_str()),
                    ])
                    .await
            }
            Self::AllComplete => {
                settings
                    .set_settings(&[(CURRENT_DATATYPE, COMPLETE_SENTINEL), (CURRENT_OFFSET, "0")])
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;

    #[tokio::test]
    async fn test_states_persist() {
        let store = MemoryStore::new();
        assert_eq!(MigrationState::load(&store).await.unwrap(), MigrationState::NotStarted);

        let in_progress = MigrationState::InProgress {
            datatype: DatatypeName::new("courses").unwrap(),
            offset: 2000,
        };
        in_progress.save(&store).await.unwrap();
        assert_eq!(MigrationState::load(&store).await.unwrap(), in_progress);

        MigrationState::AllComplete.save(&store).await.unwrap();
        assert_eq!(MigrationState::load(&store).await.unwrap(), MigrationState::AllComplete);

        MigrationState::NotStarted.save(&store).await.unwrap();
        assert_eq!(MigrationState::load(&store).await.unwrap(), MigrationState::NotStarted);
    }

    /// Applies batch writes one key at a time and fails on the offset key
    struct TornWrites {
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl SettingsStore for TornWrites {
        async fn get_setting(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_setting(key).await
        }

        async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
            if key == CURRENT_OFFSET {
                return Err(HarvestError::Database("connection reset".to_string()));
            }
            self.inner.set_setting(key, value).await
        }

        async fn set_setting_if_absent(&self, key: &str, value: &str) -> Result<bool> {
            self.inner.set_setting_if_absent(key, value).await
        }

        async fn delete_setting(&self, key: &str) -> Result<()> {
            self.inner.delete_setting(key).await
        }

        async fn set_settings(&self, entries: &[(&str, &str)]) -> Result<()> {
            if entries.iter().any(|(key, _)| *key == CURRENT_OFFSET) {
                return Err(HarvestError::Database("connection reset".to_string()));
            }
            self.inner.set_settings(entries).await
        }

        async fn delete_setting_if(&self, key: &str, expected: &str) -> Result<bool> {
            self.inner.delete_setting_if(key, expected).await
        }
    }

    #[tokio::test]
    async fn test_failed_advance_keeps_previous_position() {
        let store = TornWrites {
            inner: MemoryStore::new(),
        };
        store
            .inner
            .set_settings(&[(CURRENT_DATATYPE, "users"), (CURRENT_OFFSET, "2000")])
            .await
            .unwrap();

        let next = MigrationState::InProgress {
            datatype: DatatypeName::new("categories").unwrap(),
            offset: 0,
        };
        assert!(next.save(&store).await.is_err());

        assert_eq!(
            MigrationState::load(&store).await.unwrap(),
            MigrationState::InProgress {
                datatype: DatatypeName::new("users").unwrap(),
                offset: 2000,
            }
        );
    }

    #[tokio::test]
    async fn test_corrupt_offset_is_a_state_error() {
        let store = MemoryStore::new();
        store.set_setting(CURRENT_DATATYPE, "courses").await.unwrap();
        store.set_setting(CURRENT_OFFSET, "lots").await.unwrap();
        assert!(matches!(
            MigrationState::load(&store).await,
            Err(HarvestError::State(_))
        ));
    }
}
