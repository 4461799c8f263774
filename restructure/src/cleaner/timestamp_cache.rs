use std::collections::HashSet;
use std::sync::Arc;

use apache_avro::types::Value;
use lru::LruCache;
use restructure_config::shared::{CompressionKind, FormatKind};
use tracing::warn;

use crate::compression::decompress;
use crate::error::RestructureResult;
use crate::format::{flattened_keys, scan_target};
use crate::paths::record_time_nanos;
use crate::storage::StorageDriver;

/// Result of looking a record up in its expected target file.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TargetCheck {
    /// The record's timestamp is present in the target.
    Found,
    /// The target exists but does not hold the record.
    NotFound,
    /// No file exists at the target path.
    FileNotFound,
    /// The target's schema does not match the record; try the next suffix.
    BadSchema,
}

struct CachedTarget {
    exists: bool,
    csv_header: Option<Vec<String>>,
    timestamps: HashSet<i64>,
}

/// Read-only cache of target files and the record timestamps they contain.
///
/// Targets are loaded once and kept until the periodic clear. The clear runs
/// every `clear_after` record checks so a long cleaner pass cannot hold every
/// target's timestamps in memory at once.
pub struct TimestampCache<T: StorageDriver> {
    storage: Arc<T>,
    format: FormatKind,
    compression: CompressionKind,
    entries: LruCache<String, CachedTarget>,
    checked: usize,
    clear_after: usize,
}

impl<T: StorageDriver> TimestampCache<T> {
    pub fn new(
        storage: Arc<T>,
        format: FormatKind,
        compression: CompressionKind,
        clear_after: usize,
    ) -> Self {
        Self {
            storage,
            format,
            compression,
            entries: LruCache::unbounded(),
            checked: 0,
            clear_after: clear_after.max(1),
        }
    }

    /// Checks whether a record is present in the target at `path`.
    pub async fn check(&mut self, path: &str, record: &Value) -> RestructureResult<TargetCheck> {
        self.checked += 1;
        if self.checked >= self.clear_after {
            self.entries.clear();
            self.checked = 0;
        }

        if !self.entries.contains(path) {
            let entry = self.load(path).await?;
            self.entries.put(path.to_string(), entry);
        }
        let entry = self
            .entries
            .get(path)
            .expect("entry was just inserted");

        if !entry.exists {
            return Ok(TargetCheck::FileNotFound);
        }

        if let Some(header) = &entry.csv_header
            && flattened_keys(record) != *header
        {
            return Ok(TargetCheck::BadSchema);
        }

        match record_time_nanos(record) {
            Some(nanos) if entry.timestamps.contains(&nanos) => Ok(TargetCheck::Found),
            _ => Ok(TargetCheck::NotFound),
        }
    }

    async fn load(&self, path: &str) -> RestructureResult<CachedTarget> {
        if !self.storage.exists(path).await? {
            return Ok(CachedTarget {
                exists: false,
                csv_header: None,
                timestamps: HashSet::new(),
            });
        }

        let bytes = self.storage.read(path).await?;
        let scanned = decompress(self.compression, &bytes)
            .and_then(|content| scan_target(self.format, &content));

        match scanned {
            Ok(scan) => Ok(CachedTarget {
                exists: true,
                csv_header: scan.csv_header,
                timestamps: scan.timestamps,
            }),
            Err(err) => {
                // An unreadable target cannot vouch for any record; report
                // everything as absent so the source file is retained.
                warn!(path = %path, error = %err, "target file is unreadable during cleaning");
                Ok(CachedTarget {
                    exists: true,
                    csv_header: None,
                    timestamps: HashSet::new(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use crate::test_utils::observation_record;
    use tempfile::TempDir;

    fn target_with(content: &str) -> (TempDir, Arc<LocalStorage>) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("t/p/u/s")).unwrap();
        std::fs::write(dir.path().join("t/p/u/s/19700101_00.csv"), content).unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()));
        (dir, storage)
    }

    fn header() -> &'static str {
        "key.projectId,key.userId,key.sourceId,value.time,value.x"
    }

    #[tokio::test]
    async fn found_when_timestamp_is_present() {
        let (_dir, storage) =
            target_with(&format!("{}\np,u,s,1000,1.0\n", header()));
        let mut cache =
            TimestampCache::new(storage, FormatKind::Csv, CompressionKind::None, 1000);

        let record = observation_record("p", "u", "s", 1000);
        let check = cache.check("t/p/u/s/19700101_00.csv", &record).await.unwrap();
        assert_eq!(check, TargetCheck::Found);
    }

    #[tokio::test]
    async fn not_found_when_timestamp_is_absent() {
        let (_dir, storage) =
            target_with(&format!("{}\np,u,s,1000,1.0\n", header()));
        let mut cache =
            TimestampCache::new(storage, FormatKind::Csv, CompressionKind::None, 1000);

        let record = observation_record("p", "u", "s", 2000);
        let check = cache.check("t/p/u/s/19700101_00.csv", &record).await.unwrap();
        assert_eq!(check, TargetCheck::NotFound);
    }

    #[tokio::test]
    async fn file_not_found_for_missing_target() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()));
        let mut cache =
            TimestampCache::new(storage, FormatKind::Csv, CompressionKind::None, 1000);

        let record = observation_record("p", "u", "s", 1000);
        let check = cache.check("t/p/u/s/19700101_00.csv", &record).await.unwrap();
        assert_eq!(check, TargetCheck::FileNotFound);
    }

    #[tokio::test]
    async fn bad_schema_when_header_differs() {
        let (_dir, storage) = target_with("some.other,columns\na,b\n");
        let mut cache =
            TimestampCache::new(storage, FormatKind::Csv, CompressionKind::None, 1000);

        let record = observation_record("p", "u", "s", 1000);
        let check = cache.check("t/p/u/s/19700101_00.csv", &record).await.unwrap();
        assert_eq!(check, TargetCheck::BadSchema);
    }

    #[tokio::test]
    async fn cache_clears_after_configured_checks() {
        let (_dir, storage) =
            target_with(&format!("{}\np,u,s,1000,1.0\n", header()));
        let mut cache =
            TimestampCache::new(storage, FormatKind::Csv, CompressionKind::None, 2);

        let record = observation_record("p", "u", "s", 1000);
        for _ in 0..5 {
            let check = cache.check("t/p/u/s/19700101_00.csv", &record).await.unwrap();
            assert_eq!(check, TargetCheck::Found);
        }
        // After clears the entry count stays bounded.
        assert!(cache.entries.len() <= 1);
    }
}
