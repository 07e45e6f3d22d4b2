//! Most-recent-first list of generation records

use crate::codec::{ParamRecord, RecordParams};
use tracing::warn;

/// Separator between packed records in the `h` slot
pub const HISTORY_SEPARATOR: char = ',';

/// Bounded history; adding past the cap drops the oldest entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    items: Vec<ParamRecord>,
    cap: usize,
}

impl History {
    pub fn new(cap: usize) -> Self {
        Self {
            items: Vec::new(),
            cap,
        }
    }

    /// Decode the `h` slot, keeping at most `cap` entries.
    ///
    /// Entries that fail to decode are skipped; the count of skipped entries
    /// is returned alongside.
    pub fn load(packed: &str, cap: usize) -> (Self, usize) {
        let mut history = Self::new(cap);
        let mut skipped = 0;

        for (index, part) in packed
            .split(HISTORY_SEPARATOR)
            .filter(|part| !part.is_empty())
            .enumerate()
        {
            if history.items.len() >= cap {
                break;
            }
            match ParamRecord::from_packed(part) {
                Ok(record) => history.items.push(record),
                Err(e) => {
                    warn!("Skipping history entry {}: {}", index, e);
                    skipped += 1;
                }
            }
        }

        (history, skipped)
    }

    /// Comma-joined packed records
    pub fn pack(&self) -> String {
        self.items
            .iter()
            .map(ParamRecord::packed_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Change the cap. Returns true when entries were dropped.
    pub fn set_cap(&mut self, cap: usize) -> bool {
        self.cap = cap;
        let before = self.items.len();
        self.items.truncate(cap);
        self.items.len() != before
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ParamRecord> {
        self.items.get(index)
    }

    /// Insert at the front and evict from the back
    pub fn add(&mut self, record: ParamRecord) {
        self.items.insert(0, record);
        self.items.truncate(self.cap);
    }

    /// Delete the entry at `index`.
    ///
    /// With a `timestamp`, an entry at `index` carrying a different timestamp
    /// means the list moved underneath the caller; the first entry with that
    /// timestamp is deleted instead, or nothing if none matches. An
    /// out-of-range index deletes nothing.
    pub fn delete(&mut self, index: usize, timestamp: Option<i64>) -> Option<ParamRecord> {
        let target = self.items.get(index)?;

        let index = match timestamp {
            Some(ts) if ts > 0 && target.timestamp() != ts => self
                .items
                .iter()
                .position(|record| record.timestamp() == ts)?,
            _ => index,
        };

        Some(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// First entry whose salt equals `salt`. An empty salt never matches.
    pub fn find_by_salt(&self, salt: &str) -> Option<&ParamRecord> {
        if salt.is_empty() {
            return None;
        }
        self.items.iter().find(|record| record.params().salt == salt)
    }

    /// Parameters of every entry, most recent first
    pub fn list(&self) -> Vec<RecordParams> {
        self.items.iter().map(|r| r.params().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(salt: &str, timestamp: i64) -> ParamRecord {
        ParamRecord::new(RecordParams {
            salt: salt.to_string(),
            ..RecordParams::defaults_at(timestamp)
        })
        .unwrap()
    }

    fn salts(history: &History) -> Vec<String> {
        history.list().into_iter().map(|p| p.salt).collect()
    }

    #[test]
    fn test_add_evicts_oldest() {
        let mut history = History::new(3);
        for (i, salt) in ["a", "b", "c", "d"].iter().enumerate() {
            history.add(record(salt, i as i64 + 1));
        }
        assert_eq!(salts(&history), vec!["d", "c", "b"]);
    }

    #[test]
    fn test_pack_and_load() {
        let mut history = History::new(10);
        history.add(record("one", 1));
        history.add(record("鹽", 2));

        let packed = history.pack();
        assert_eq!(packed.matches(',').count(), 1);

        let (loaded, skipped) = History::load(&packed, 10);
        assert_eq!(skipped, 0);
        assert_eq!(loaded, history);
    }

    #[test]
    fn test_load_respects_cap_and_skips_bad_entries() {
        let good = record("x", 1).packed_string();
        let packed = format!("{},garbage,{},{}", good, good, good);

        let (loaded, skipped) = History::load(&packed, 2);
        assert_eq!(loaded.len(), 2);
        assert_eq!(skipped, 1);

        let (empty, skipped) = History::load("", 5);
        assert!(empty.is_empty());
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_delete_by_index() {
        let mut history = History::new(10);
        history.add(record("a", 1));
        history.add(record("b", 2));

        assert!(history.delete(0, None).is_some());
        assert_eq!(salts(&history), vec!["a"]);
        assert!(history.delete(5, None).is_none());
    }

    #[test]
    fn test_delete_with_timestamp_cross_check() {
        let mut history = History::new(10);
        history.add(record("a", 1));
        history.add(record("b", 2));
        history.add(record("c", 3));

        // index 0 holds ts 3, so the entry with ts 1 is removed instead
        let removed = history.delete(0, Some(1)).unwrap();
        assert_eq!(removed.params().salt, "a");
        assert_eq!(salts(&history), vec!["c", "b"]);

        assert!(history.delete(0, Some(99)).is_none());
        assert_eq!(history.len(), 2);

        assert!(history.delete(1, Some(2)).is_some());
        assert_eq!(salts(&history), vec!["c"]);
    }

    #[test]
    fn test_find_by_salt() {
        let mut history = History::new(10);
        history.add(record("", 1));
        history.add(record("site", 2));
        history.add(record("site", 3));

        assert_eq!(history.find_by_salt("site").unwrap().timestamp(), 3);
        assert!(history.find_by_salt("").is_none());
        assert!(history.find_by_salt("other").is_none());
    }

    #[test]
    fn test_set_cap_truncates() {
        let mut history = History::new(10);
        for i in 0..5 {
            history.add(record("s", i));
        }
        assert!(history.set_cap(2));
        assert_eq!(history.len(), 2);
        assert!(!history.set_cap(4));
    }
}
