//! Process-wide handle to the current [`Dataset`].
//!
//! Readers clone an `Arc` and keep a consistent view for as long as they
//! hold it. Reloads build the replacement completely before swapping it in,
//! so nobody ever observes a partially loaded dataset.

use std::sync::{Arc, PoisonError, RwLock};

use crate::{DataPaths, Dataset, DatasetError, DatasetSummary};

/// Shared, atomically replaceable dataset.
#[derive(Debug)]
pub struct DatasetStore {
    current: RwLock<Arc<Dataset>>,
}

impl DatasetStore {
    /// Wraps an initial dataset.
    #[must_use]
    pub fn new(dataset: Dataset) -> Self {
        Self {
            current: RwLock::new(Arc::new(dataset)),
        }
    }

    /// Loads the initial dataset from disk.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if an existing file cannot be read as CSV.
    pub fn open(paths: &DataPaths) -> Result<Self, DatasetError> {
        Ok(Self::new(Dataset::load(paths)?))
    }

    /// The dataset currently in use.
    #[must_use]
    pub fn current(&self) -> Arc<Dataset> {
        // The lock only guards an `Arc` swap, so a poisoned lock still holds
        // a complete dataset.
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swaps in `dataset`, returning the one it replaced.
    pub fn replace(&self, dataset: Dataset) -> Arc<Dataset> {
        let next = Arc::new(dataset);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Reloads every file and swaps the result in.
    ///
    /// On error the current dataset stays in place.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if an existing file cannot be read as CSV.
    pub fn reload(&self, paths: &DataPaths) -> Result<DatasetSummary, DatasetError> {
        log::info!("Reloading reference data...");
        let dataset = Dataset::load(paths)?;
        let summary = dataset.summary();
        self.replace(dataset);
        log::info!("Reference data reloaded: {summary:?}");
        Ok(summary)
    }
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::new(Dataset::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, TempDir};

    #[test]
    fn reload_swaps_without_disturbing_readers() {
        let dir = TempDir::new("store");
        dir.write("neighborhoods.csv", fixtures::NEIGHBORHOODS);
        let paths = DataPaths::in_dir(dir.path());

        let store = DatasetStore::default();
        let before = store.current();
        assert_eq!(before.summary().neighborhoods, 0);

        let summary = store.reload(&paths).unwrap();
        assert_eq!(summary.neighborhoods, 3);

        assert_eq!(before.summary().neighborhoods, 0);
        assert_eq!(store.current().summary().neighborhoods, 3);
    }

    #[test]
    fn reload_is_idempotent() {
        let dir = TempDir::new("store-idempotent");
        dir.write("neighborhoods.csv", fixtures::NEIGHBORHOODS);
        dir.write("listings.csv", fixtures::LISTINGS);
        dir.write("stops.txt", fixtures::STOPS);
        dir.write("malls.csv", fixtures::MALLS);
        let paths = DataPaths::in_dir(dir.path());

        let store = DatasetStore::open(&paths).unwrap();
        let first = store.current();
        store.reload(&paths).unwrap();
        let second = store.current();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.summary(), second.summary());
        assert!((first.average_rent(1) - second.average_rent(1)).abs() < f64::EPSILON);
    }

    #[test]
    fn failed_reload_keeps_current_dataset() {
        let dir = TempDir::new("store-failed");
        dir.write("neighborhoods.csv", fixtures::NEIGHBORHOODS);
        let paths = DataPaths::in_dir(dir.path());
        let store = DatasetStore::open(&paths).unwrap();

        // A directory where a file is expected cannot be opened as CSV.
        let broken = DataPaths {
            neighborhoods: dir.path().to_path_buf(),
            ..paths
        };
        assert!(store.reload(&broken).is_err());
        assert_eq!(store.current().summary().neighborhoods, 3);
    }

    #[test]
    fn concurrent_readers_see_whole_datasets() {
        let dir = TempDir::new("store-threads");
        dir.write("neighborhoods.csv", fixtures::NEIGHBORHOODS);
        let paths = DataPaths::in_dir(dir.path());
        let store = Arc::new(DatasetStore::default());

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for _ in 0..100 {
                        let count = store.current().summary().neighborhoods;
                        assert!(count == 0 || count == 3);
                    }
                });
            }
            store.reload(&paths).unwrap();
        });
    }
}
