//! Thin RocksDB wrapper: point reads, atomic batches, prefix scans

use crate::errors::{RewardsResult, StorageError};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct OptimizedStorage {
    db: Arc<DB>,
}

impl OptimizedStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> RewardsResult<Self> {
        Self::new_with_config(path, 64)
    }

    pub fn new_with_config<P: AsRef<Path>>(path: P, write_buffer_size_mb: usize) -> RewardsResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(write_buffer_size_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path.as_ref()).map_err(|e| {
            StorageError::DatabaseOpenFailed(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> RewardsResult<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()).into())
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> RewardsResult<()> {
        Ok(self.db.put(key, value)?)
    }

    /// Apply all puts and deletes atomically
    pub fn batch_write<K, V>(&self, puts: &[(K, V)], deletes: &[K]) -> RewardsResult<()>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut batch = WriteBatch::default();
        for (key, value) in puts {
            batch.put(key, value);
        }
        for key in deletes {
            batch.delete(key);
        }
        Ok(self.db.write(batch)?)
    }

    /// Keys under `prefix` in ascending order, starting strictly after `start_after`
    pub fn scan_prefix(
        &self,
        prefix: &[u8],
        start_after: Option<&[u8]>,
        limit: usize,
    ) -> RewardsResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let start = match start_after {
            Some(cursor) if cursor.starts_with(prefix) => cursor,
            _ => prefix,
        };

        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(start, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            if start_after.is_some_and(|cursor| &key[..] <= cursor) {
                continue;
            }
            rows.push((key.to_vec(), value.to_vec()));
            if rows.len() >= limit {
                break;
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scan_respects_prefix_and_cursor() {
        let dir = TempDir::new().unwrap();
        let storage = OptimizedStorage::new(dir.path()).unwrap();

        let puts: Vec<(Vec<u8>, Vec<u8>)> = (0u8..5)
            .map(|i| (vec![b'a', i], vec![i]))
            .chain(std::iter::once((b"b0".to_vec(), vec![9])))
            .collect();
        storage.batch_write(&puts, &[]).unwrap();

        let all = storage.scan_prefix(b"a", None, 10).unwrap();
        assert_eq!(all.len(), 5);

        let page = storage.scan_prefix(b"a", Some(&[b'a', 1]), 2).unwrap();
        assert_eq!(page.iter().map(|(_, v)| v[0]).collect::<Vec<_>>(), vec![2, 3]);

        storage.batch_write::<Vec<u8>, Vec<u8>>(&[], &[vec![b'a', 0]]).unwrap();
        assert!(storage.get(&[b'a', 0]).unwrap().is_none());
    }
}
