//! JSON manifest repository store.
//!
//! The manifest is a JSON array of repository records:
//!
//! ```json
//! [
//!   {
//!     "id": "6f0c6c4e",
//!     "status": "fetched",
//!     "endpoints": ["git://github.com/src-d/go-git.git"],
//!     "references": [{"name": "refs/heads/HEAD", "root": "fe83b0..."}]
//!   }
//! ]
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::{RecordCursor, RepositoryQuery, RepositoryStore, Result};
use crate::model::RepositoryRecord;

/// Store backed by a list of records loaded up front.
#[derive(Debug, Clone, Default)]
pub struct ManifestStore {
    records: Arc<Vec<RepositoryRecord>>,
}

impl ManifestStore {
    pub fn from_records(records: Vec<RepositoryRecord>) -> Self {
        Self {
            records: Arc::new(records),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let records: Vec<RepositoryRecord> = serde_json::from_slice(&data)?;
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RepositoryStore for ManifestStore {
    fn count(&self, query: &RepositoryQuery) -> Result<u64> {
        Ok(self.records.iter().filter(|r| query.matches(r)).count() as u64)
    }

    fn find(&self, query: &RepositoryQuery) -> Result<RecordCursor> {
        let records = Arc::clone(&self.records);
        let query = query.clone();
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        let cursor = (0..records.len())
            .filter_map(move |i| {
                let record = &records[i];
                query.matches(record).then(|| record.clone())
            })
            .skip(offset)
            .take(limit)
            .map(Ok);
        Ok(Box::new(cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FetchStatus;
    use tempfile::TempDir;

    fn record(id: &str, status: FetchStatus) -> RepositoryRecord {
        RepositoryRecord {
            id: id.to_string(),
            status,
            endpoints: vec![format!("https://github.com/x/{id}")],
            references: vec![],
        }
    }

    fn store() -> ManifestStore {
        ManifestStore::from_records(vec![
            record("a", FetchStatus::Fetched),
            record("b", FetchStatus::Pending),
            record("c", FetchStatus::Fetched),
            record("d", FetchStatus::Fetched),
        ])
    }

    fn ids(cursor: RecordCursor) -> Vec<String> {
        cursor.map(|r| r.unwrap().id).collect()
    }

    #[test]
    fn test_find_by_status() {
        let query = RepositoryQuery::new().find_by_status(FetchStatus::Fetched);
        assert_eq!(store().count(&query).unwrap(), 3);
        assert_eq!(ids(store().find(&query).unwrap()), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_pagination() {
        let query = RepositoryQuery::new()
            .find_by_status(FetchStatus::Fetched)
            .offset(1)
            .limit(1);
        assert_eq!(ids(store().find(&query).unwrap()), vec!["c"]);
        // Count is the total match count, pagination aside.
        assert_eq!(store().count(&query).unwrap(), 3);
    }

    #[test]
    fn test_open_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repos.json");
        let records = vec![record("a", FetchStatus::Fetched)];
        fs::write(&path, serde_json::to_vec(&records).unwrap()).unwrap();

        let store = ManifestStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);

        fs::write(&path, "{not json").unwrap();
        assert!(ManifestStore::open(&path).is_err());
    }
}
