//! Per-ticker artifact persistence.
//!
//! An [`ArtifactSet`] is everything a forecast needs from training: the fitted
//! scaler, the regressor snapshot and a metadata record (sequence length, feature
//! order, test metrics). It lives on disk as three JSON files:
//!
//! ```text
//! <root>/<TICKER>/metadata.json
//! <root>/<TICKER>/scaler.json
//! <root>/<TICKER>/model.json
//! ```
//!
//! Key behaviors:
//! - Each ticker has its own reader/writer lock. [`ArtifactStore::save_with`] holds
//!   the write guard while the set is built and written; [`ArtifactStore::open`]
//!   holds the read guard while it loads from disk. Readers never see a
//!   half-written set and different tickers never contend.
//! - Writes land in a hidden temporary directory that is renamed into place. A
//!   failed write leaves the previous set where it was.
//! - Loaded sets are cached in an `arc-swap` snapshot map; a successful save
//!   swaps in the new set atomically. Cache hits skip the lock and return the
//!   last published set.
//! - Tickers go through [`normalize_ticker`] before they touch the filesystem.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use arc_swap::ArcSwap;
use market_data_ingestor::{models::period::Period, providers::normalize_ticker};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use crate::{
    error::{ForecastError, Result},
    regressor::{PointRegressor, RegressorKind, RegressorSnapshot},
    scaler::ScalingModel,
};

const METADATA_FILE: &str = "metadata.json";
const SCALER_FILE: &str = "scaler.json";
const MODEL_FILE: &str = "model.json";

/// Timestamp format of [`ArtifactMetadata::trained_on`].
pub const TRAINED_ON_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Describes how and on what a model was trained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub ticker: String,
    pub period: Period,
    pub sequence_length: usize,
    pub num_features: usize,
    /// Mean squared error on the test partition, scaled units.
    pub test_loss: f64,
    /// Mean absolute error on the test partition, scaled units.
    pub test_mae: f64,
    pub trained_on: String,
    pub feature_column_order: Vec<String>,
    pub regressor: RegressorKind,
}

/// Scaler, regressor and metadata of one trained ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSet {
    pub metadata: ArtifactMetadata,
    pub scaling: ScalingModel,
    pub model: RegressorSnapshot,
}

impl ArtifactSet {
    /// Refuses sets whose feature count or order differ from `live_columns`.
    pub fn ensure_compatible(&self, live_columns: &[&str]) -> Result<()> {
        let meta = &self.metadata;
        if meta.num_features != live_columns.len() {
            return Err(ForecastError::ScalerMismatch(format!(
                "{} was trained on {} features, live extraction has {}",
                meta.ticker,
                meta.num_features,
                live_columns.len()
            )));
        }
        let same_order = meta.feature_column_order.len() == live_columns.len()
            && meta
                .feature_column_order
                .iter()
                .zip(live_columns)
                .all(|(a, b)| a == b);
        if !same_order {
            return Err(ForecastError::ScalerMismatch(format!(
                "{} feature order {:?} differs from live order {:?}",
                meta.ticker, meta.feature_column_order, live_columns
            )));
        }
        self.scaling.ensure_columns(live_columns)?;
        if meta.sequence_length == 0 {
            return Err(ForecastError::ScalerMismatch(format!(
                "{} metadata has a zero sequence length",
                meta.ticker
            )));
        }
        Ok(())
    }

    pub fn regressor(&self) -> Box<dyn PointRegressor> {
        self.model.clone().into_regressor()
    }
}

/// A loaded, immutable artifact set for one ticker.
///
/// Cloning is cheap; the set itself is shared.
#[derive(Debug, Clone)]
pub struct ArtifactHandle {
    ticker: String,
    set: Arc<ArtifactSet>,
}

impl ArtifactHandle {
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn set(&self) -> &ArtifactSet {
        &self.set
    }
}

type Snapshot = HashMap<String, Arc<ArtifactSet>>;

/// Root directory of all tickers' artifacts.
pub struct ArtifactStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
    cache: ArcSwap<Snapshot>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
            cache: ArcSwap::from_pointee(Snapshot::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of `ticker`'s artifacts. Fails for tickers that are not valid
    /// directory names, such as `..`.
    pub fn ticker_dir(&self, ticker: &str) -> Result<PathBuf> {
        Ok(self.root.join(normalize_ticker(ticker)?))
    }

    /// Returns the lock of `ticker`, dropping entries no caller holds.
    fn lock_for(&self, ticker: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(ticker.to_string()).or_default().clone()
    }

    /// Returns the current artifact set of `ticker`, loading it on first use.
    ///
    /// A cached set is returned without waiting for an in-flight save; the
    /// handle keeps the set it was given even if a retrain publishes a new one.
    pub fn open(&self, ticker: &str) -> Result<ArtifactHandle> {
        let ticker = normalize_ticker(ticker)?;
        if let Some(set) = self.cache.load().get(&ticker) {
            return Ok(ArtifactHandle {
                ticker,
                set: Arc::clone(set),
            });
        }

        let lock = self.lock_for(&ticker);
        let _guard = lock.read();
        let set = Arc::new(self.read_from_disk(&ticker)?);
        self.publish(&ticker, Arc::clone(&set));
        debug!(%ticker, "loaded artifacts from disk");
        Ok(ArtifactHandle { ticker, set })
    }

    /// Builds and persists a new set for `ticker` under its write lock.
    ///
    /// `build` runs while the lock is held, so no disk reader observes the
    /// ticker between the start of fitting and the final rename. On failure the
    /// previous set stays on disk and in the cache.
    pub fn save_with<F>(&self, ticker: &str, build: F) -> Result<ArtifactHandle>
    where
        F: FnOnce() -> Result<ArtifactSet>,
    {
        let ticker = normalize_ticker(ticker)?;
        let lock = self.lock_for(&ticker);
        let _guard = lock.write();

        let set = Arc::new(build()?);
        self.write_to_disk(&ticker, &set)?;
        self.publish(&ticker, Arc::clone(&set));
        info!(%ticker, dir = %self.root.join(&ticker).display(), "saved artifacts");
        Ok(ArtifactHandle { ticker, set })
    }

    pub fn save(&self, ticker: &str, set: ArtifactSet) -> Result<ArtifactHandle> {
        self.save_with(ticker, || Ok(set))
    }

    /// Drops the cached set so the next [`open`](Self::open) re-reads disk.
    pub fn invalidate(&self, ticker: &str) {
        let Ok(ticker) = normalize_ticker(ticker) else {
            return;
        };
        self.cache.rcu(|snap| {
            let mut next = Snapshot::clone(snap);
            next.remove(&ticker);
            next
        });
    }

    fn publish(&self, ticker: &str, set: Arc<ArtifactSet>) {
        self.cache.rcu(|snap| {
            let mut next = Snapshot::clone(snap);
            next.insert(ticker.to_string(), Arc::clone(&set));
            next
        });
    }

    fn read_from_disk(&self, ticker: &str) -> Result<ArtifactSet> {
        let dir = self.root.join(ticker);
        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.is_file() {
            return Err(ForecastError::ArtifactNotFound {
                ticker: ticker.to_string(),
                dir: self.root.clone(),
            });
        }
        Ok(ArtifactSet {
            metadata: read_json(&metadata_path)?,
            scaling: read_json(&dir.join(SCALER_FILE))?,
            model: read_json(&dir.join(MODEL_FILE))?,
        })
    }

    fn write_to_disk(&self, ticker: &str, set: &ArtifactSet) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|source| ForecastError::ArtifactIo {
            path: self.root.clone(),
            source,
        })?;
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let staging = self
            .root
            .join(format!(".{ticker}.tmp-{}-{nonce}", std::process::id()));
        let retired = self.root.join(format!(".{ticker}.old-{nonce}"));
        stage_and_swap(set, &staging, &self.root.join(ticker), &retired)
    }
}

/// Writes `set` into `staging` and moves it to `target`.
///
/// Whatever fails, `staging` is removed and a previous `target` is left in place.
fn stage_and_swap(set: &ArtifactSet, staging: &Path, target: &Path, retired: &Path) -> Result<()> {
    let result = fs::create_dir_all(staging)
        .map_err(|source| ForecastError::ArtifactIo {
            path: staging.to_path_buf(),
            source,
        })
        .and_then(|()| write_json(&staging.join(METADATA_FILE), &set.metadata))
        .and_then(|()| write_json(&staging.join(SCALER_FILE), &set.scaling))
        .and_then(|()| write_json(&staging.join(MODEL_FILE), &set.model))
        .and_then(|()| swap_into_place(staging, target, retired));

    if result.is_err() && staging.exists() {
        if let Err(err) = fs::remove_dir_all(staging) {
            warn!(path = %staging.display(), %err, "failed to remove staging directory");
        }
    }
    result
}

/// Renames `staging` to `target`, parking a previous `target` at `retired`
/// until the new one is in place.
fn swap_into_place(staging: &Path, target: &Path, retired: &Path) -> Result<()> {
    let had_previous = target.exists();
    if had_previous {
        fs::rename(target, retired).map_err(|source| ForecastError::ArtifactIo {
            path: target.to_path_buf(),
            source,
        })?;
    }

    if let Err(source) = fs::rename(staging, target) {
        if had_previous {
            if let Err(err) = fs::rename(retired, target) {
                warn!(
                    path = %retired.display(),
                    %err,
                    "failed to restore previous artifacts"
                );
            }
        }
        return Err(ForecastError::ArtifactIo {
            path: staging.to_path_buf(),
            source,
        });
    }

    if had_previous {
        if let Err(err) = fs::remove_dir_all(retired) {
            warn!(path = %retired.display(), %err, "failed to remove retired artifacts");
        }
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|source| ForecastError::ArtifactIo {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ForecastError::ArtifactFormat {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| ForecastError::ArtifactFormat {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, bytes).map_err(|source| ForecastError::ArtifactIo {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread, time::Duration};

    use tempfile::TempDir;

    use super::*;
    use crate::features::{FEATURE_COLUMNS, feature_column_order};

    fn sample(ticker: &str, loss: f64) -> ArtifactSet {
        let n = FEATURE_COLUMNS.len();
        ArtifactSet {
            metadata: ArtifactMetadata {
                ticker: ticker.into(),
                period: "5y".parse().unwrap(),
                sequence_length: 60,
                num_features: n,
                test_loss: loss,
                test_mae: 0.1,
                trained_on: "2024-03-08 12:00:00".into(),
                feature_column_order: feature_column_order(),
                regressor: RegressorKind::Persistence,
            },
            scaling: ScalingModel::new(feature_column_order(), vec![0.0; n], vec![1.0; n])
                .unwrap(),
            model: RegressorSnapshot::Persistence { target_index: 0 },
        }
    }

    #[test]
    fn save_then_open_from_a_fresh_store() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save("AAPL", sample("AAPL", 0.01)).unwrap();

        for f in [METADATA_FILE, SCALER_FILE, MODEL_FILE] {
            assert!(dir.path().join("AAPL").join(f).is_file(), "{f}");
        }
        // No staging or retired directories are left behind.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());

        let fresh = ArtifactStore::new(dir.path());
        let handle = fresh.open("AAPL").unwrap();
        assert_eq!(handle.ticker(), "AAPL");
        assert_eq!(handle.set(), &sample("AAPL", 0.01));
    }

    #[test]
    fn resave_replaces_and_refreshes_cache() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save("MSFT", sample("MSFT", 0.5)).unwrap();
        assert_eq!(store.open("MSFT").unwrap().set().metadata.test_loss, 0.5);

        store.save("MSFT", sample("MSFT", 0.25)).unwrap();
        assert_eq!(store.open("MSFT").unwrap().set().metadata.test_loss, 0.25);

        store.invalidate("MSFT");
        let reread = ArtifactStore::new(dir.path()).open("MSFT").unwrap();
        assert_eq!(reread.set().metadata.test_loss, 0.25);
    }

    #[test]
    fn missing_ticker_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = ArtifactStore::new(dir.path()).open("NOPE").unwrap_err();
        assert!(matches!(err, ForecastError::ArtifactNotFound { .. }));
    }

    #[test]
    fn corrupt_file_is_format_error() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save("AAPL", sample("AAPL", 0.01)).unwrap();
        fs::write(dir.path().join("AAPL").join(SCALER_FILE), b"{not json").unwrap();

        let err = ArtifactStore::new(dir.path()).open("AAPL").unwrap_err();
        assert!(matches!(err, ForecastError::ArtifactFormat { .. }));
    }

    #[test]
    fn compatibility_checks_order_and_width() {
        let set = sample("AAPL", 0.0);
        assert!(set.ensure_compatible(&FEATURE_COLUMNS).is_ok());

        let mut reordered: Vec<&str> = FEATURE_COLUMNS.to_vec();
        reordered.swap(0, 1);
        assert!(matches!(
            set.ensure_compatible(&reordered),
            Err(ForecastError::ScalerMismatch(_))
        ));
        assert!(matches!(
            set.ensure_compatible(&FEATURE_COLUMNS[..8]),
            Err(ForecastError::ScalerMismatch(_))
        ));

        let mut stale = sample("AAPL", 0.0);
        stale.metadata.num_features = 8;
        assert!(stale.ensure_compatible(&FEATURE_COLUMNS).is_err());
    }

    #[test]
    fn open_waits_for_an_in_flight_save() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path()));
        store.save("AAPL", sample("AAPL", 1.0)).unwrap();
        store.invalidate("AAPL");

        let started = Arc::new(Barrier::new(2));
        let writer = {
            let store = Arc::clone(&store);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                store
                    .save_with("AAPL", || {
                        started.wait();
                        thread::sleep(Duration::from_millis(100));
                        Ok(sample("AAPL", 2.0))
                    })
                    .unwrap();
            })
        };

        started.wait();
        // The writer holds the lock, so this read sees the finished new set.
        let seen = store.open("AAPL").unwrap();
        assert_eq!(seen.set().metadata.test_loss, 2.0);
        writer.join().unwrap();
    }

    #[test]
    fn failed_staging_write_keeps_previous_set() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save("AAPL", sample("AAPL", 1.0)).unwrap();

        // A directory where the metadata file should be written.
        let staging = dir.path().join(".AAPL.tmp-test");
        fs::create_dir_all(staging.join(METADATA_FILE)).unwrap();
        let retired = dir.path().join(".AAPL.old-test");
        let err = stage_and_swap(
            &sample("AAPL", 2.0),
            &staging,
            &dir.path().join("AAPL"),
            &retired,
        )
        .unwrap_err();

        assert!(matches!(err, ForecastError::ArtifactIo { .. }));
        assert!(!staging.exists());
        assert!(!retired.exists());
        let reread = ArtifactStore::new(dir.path()).open("AAPL").unwrap();
        assert_eq!(reread.set(), &sample("AAPL", 1.0));
    }

    #[test]
    fn failed_rename_restores_previous_set() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save("AAPL", sample("AAPL", 1.0)).unwrap();

        let retired = dir.path().join(".AAPL.old-test");
        let err = swap_into_place(
            &dir.path().join(".AAPL.tmp-missing"),
            &dir.path().join("AAPL"),
            &retired,
        )
        .unwrap_err();

        assert!(matches!(err, ForecastError::ArtifactIo { .. }));
        assert!(!retired.exists());
        let reread = ArtifactStore::new(dir.path()).open("AAPL").unwrap();
        assert_eq!(reread.set().metadata.test_loss, 1.0);
    }

    #[test]
    fn dot_tickers_stay_inside_the_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("models");
        let store = ArtifactStore::new(&root);

        for bad in [".", "..", "..."] {
            assert!(store.ticker_dir(bad).is_err(), "{bad}");
            assert!(
                matches!(store.open(bad), Err(ForecastError::Source(_))),
                "{bad}"
            );
            assert!(store.save(bad, sample(bad, 0.0)).is_err(), "{bad}");
        }
        assert!(!root.exists());
        assert_eq!(store.ticker_dir("aapl").unwrap(), root.join("AAPL"));
    }

    #[test]
    fn cached_open_during_save_returns_previous_set() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path()));
        store.save("AAPL", sample("AAPL", 1.0)).unwrap();

        let started = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let writer = {
            let store = Arc::clone(&store);
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                store
                    .save_with("AAPL", || {
                        started.wait();
                        release.wait();
                        Ok(sample("AAPL", 2.0))
                    })
                    .unwrap();
            })
        };

        started.wait();
        // The writer holds the lock; the warm cache still serves the whole old set.
        let during = store.open("AAPL").unwrap();
        release.wait();
        writer.join().unwrap();

        assert_eq!(during.set(), &sample("AAPL", 1.0));
        assert_eq!(store.open("AAPL").unwrap().set(), &sample("AAPL", 2.0));
    }

    #[test]
    fn lock_registry_only_keeps_tickers_in_flight() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let held = store.lock_for("AAPL");
        store.save("MSFT", sample("MSFT", 0.1)).unwrap();
        store.save("TSLA", sample("TSLA", 0.1)).unwrap();
        // AAPL is still held; MSFT was pruned when TSLA registered.
        assert_eq!(store.locks.lock().len(), 2);

        drop(held);
        store.save("NVDA", sample("NVDA", 0.1)).unwrap();
        let locks = store.locks.lock();
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key("NVDA"));
    }
}
