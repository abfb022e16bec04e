//! Cold tier
//!
//! Append-only compressed shards grouped by `(user_id, date)`:
//!
//! ```text
//! <root>/data/{user_id}/{YYYY-MM-DD}.jsonl.gz   record documents
//! <root>/index/{user_id}/{YYYY-MM-DD}.json      sidecar: ids + shard path
//! ```
//!
//! Appends add a new gzip member to the shard, so writes never rewrite
//! existing bytes; only hard deletes rewrite a shard.

use crate::error::StoreError;
use crate::record::Record;
use chrono::NaiveDate;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Sidecar listing the ids held by one shard
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ShardIndex {
    /// Path of the shard relative to the cold root
    shard: String,
    /// Record ids in append order
    ids: Vec<String>,
}

/// Cold store rooted at a directory
pub struct ColdStore {
    root: PathBuf,
}

impl ColdStore {
    /// Create a cold store under `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(root.join("data"))?;
        std::fs::create_dir_all(root.join("index"))?;
        Ok(Self { root })
    }

    fn shard_rel(user_id: &str, date: NaiveDate) -> String {
        format!("data/{user_id}/{}.jsonl.gz", date.format("%Y-%m-%d"))
    }

    fn shard_path(&self, user_id: &str, date: NaiveDate) -> PathBuf {
        self.root.join(Self::shard_rel(user_id, date))
    }

    fn index_path(&self, user_id: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join("index")
            .join(user_id)
            .join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// Append a record document to its `(user, date)` shard
    pub fn append(&self, record: &Record) -> Result<(), StoreError> {
        let date = record.timestamp.date_naive();
        let shard_path = self.shard_path(&record.user_id, date);
        if let Some(parent) = shard_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // One gzip member per append keeps the shard strictly append-only
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&line)?;
        let compressed = encoder.finish()?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&shard_path)?;
        file.write_all(&compressed)?;

        self.update_index(&record.user_id, date, |index| {
            if !index.ids.contains(&record.id) {
                index.ids.push(record.id.clone());
            }
        })
    }

    /// Fetch a record, optionally narrowed to a date
    pub fn get(
        &self,
        id: &str,
        user_id: &str,
        date_hint: Option<NaiveDate>,
    ) -> Result<Option<Record>, StoreError> {
        let dates = match date_hint {
            Some(d) => vec![d],
            None => self.dates_for(user_id)?,
        };
        for date in dates {
            let index = self.read_index(user_id, date)?;
            let Some(index) = index else { continue };
            if !index.ids.iter().any(|i| i == id) {
                continue;
            }
            for record in self.read_shard(user_id, date)? {
                if record.id == id {
                    return Ok(Some(record));
                }
            }
        }
        Ok(None)
    }

    /// Ids for a user whose shard date falls inside `[from, to]`
    pub fn ids_in_date_range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for date in self.dates_for(user_id)? {
            if date < from || date > to {
                continue;
            }
            if let Some(index) = self.read_index(user_id, date)? {
                ids.extend(index.ids);
            }
        }
        Ok(ids)
    }

    /// Remove a record from its shard; rewrites the shard without it
    pub fn remove(&self, id: &str, user_id: &str) -> Result<bool, StoreError> {
        for date in self.dates_for(user_id)? {
            let Some(index) = self.read_index(user_id, date)? else {
                continue;
            };
            if !index.ids.iter().any(|i| i == id) {
                continue;
            }

            let remaining: Vec<Record> = self
                .read_shard(user_id, date)?
                .into_iter()
                .filter(|r| r.id != id)
                .collect();

            let shard_path = self.shard_path(user_id, date);
            if remaining.is_empty() {
                std::fs::remove_file(&shard_path)?;
                std::fs::remove_file(self.index_path(user_id, date))?;
            } else {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                for record in &remaining {
                    encoder.write_all(&serde_json::to_vec(record)?)?;
                    encoder.write_all(b"\n")?;
                }
                let compressed = encoder.finish()?;
                std::fs::write(&shard_path, compressed)?;
                self.update_index(user_id, date, |index| {
                    index.ids.retain(|i| i != id);
                })?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Every shard date present for a user, ascending
    pub fn dates_for(&self, user_id: &str) -> Result<Vec<NaiveDate>, StoreError> {
        let dir = self.root.join("index").join(user_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut dates = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = Path::new(&name).file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    fn read_shard(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Record>, StoreError> {
        let path = self.shard_path(user_id, date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&path)?;
        let mut decoder = MultiGzDecoder::new(file);
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw)?;

        let mut records = Vec::new();
        for line in BufReader::new(raw.as_slice()).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    fn read_index(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<ShardIndex>, StoreError> {
        let path = self.index_path(user_id, date);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn update_index(
        &self,
        user_id: &str,
        date: NaiveDate,
        f: impl FnOnce(&mut ShardIndex),
    ) -> Result<(), StoreError> {
        let path = self.index_path(user_id, date);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut index = self.read_index(user_id, date)?.unwrap_or(ShardIndex {
            shard: Self::shard_rel(user_id, date),
            ids: Vec::new(),
        });
        f(&mut index);
        std::fs::write(&path, serde_json::to_string_pretty(&index)?)?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
