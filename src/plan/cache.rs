//! Persistent, append-only plan cache (spec §4.3: "identical natural
//! language input against an unchanged schema version always compiles to
//! the same plan, served from cache without calling the oracle").

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::plan::QueryPlan;

/// Schema version folded into the cache key: bumping this forces every
/// cached entry to miss and recompile, since a plan compiled under an
/// older schema may no longer validate.
pub const SCHEMA_VERSION: u32 = 1;

fn cache_key(turn_text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SCHEMA_VERSION.to_le_bytes().as_slice());
    hasher.update(turn_text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct CacheEntry {
    key: String,
    plan: QueryPlan,
}

/// An in-memory index backed by an append-only JSONL file on disk. Reads
/// never touch disk after the initial load; writes append one line and
/// update the in-memory index.
pub struct PlanCache {
    path: PathBuf,
    index: RwLock<HashMap<String, QueryPlan>>,
}

impl PlanCache {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let index = load_index(&path)?;
        Ok(Self {
            path,
            index: RwLock::new(index),
        })
    }

    pub fn get(&self, turn_text: &str) -> Option<QueryPlan> {
        let key = cache_key(turn_text);
        self.index.read().unwrap().get(&key).cloned()
    }

    pub fn put(&self, turn_text: &str, plan: &QueryPlan) -> anyhow::Result<()> {
        let key = cache_key(turn_text);
        let entry = CacheEntry {
            key: key.clone(),
            plan: plan.clone(),
        };
        let line = serde_json::to_string(&entry)?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;

        self.index.write().unwrap().insert(key, plan.clone());
        Ok(())
    }
}

fn load_index(path: &Path) -> anyhow::Result<HashMap<String, QueryPlan>> {
    let mut index = HashMap::new();
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(index),
        Err(e) => return Err(e.into()),
    };

    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CacheEntry>(line) {
            Ok(entry) => {
                index.insert(entry.key, entry.plan);
            }
            Err(e) => {
                tracing::warn!(lineno, error = %e, "skipping malformed plan cache line");
            }
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Field, Filter, FilterValue, Op};

    fn sample_plan() -> QueryPlan {
        QueryPlan {
            version: SCHEMA_VERSION,
            query_text: "books by aldus".to_string(),
            filters: vec![Filter {
                field: Field::Title,
                op: Op::Contains,
                value: FilterValue::Text("aldine".to_string()),
                notes: None,
            }],
            soft_filters: vec![],
            limit: None,
            debug: Default::default(),
            clarification: None,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PlanCache::open(dir.path().join("cache.jsonl")).unwrap();
        assert!(cache.get("books by aldus").is_none());
        cache.put("books by aldus", &sample_plan()).unwrap();
        assert_eq!(cache.get("books by aldus"), Some(sample_plan()));
    }

    #[test]
    fn reopening_loads_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.jsonl");
        {
            let cache = PlanCache::open(&path).unwrap();
            cache.put("books by aldus", &sample_plan()).unwrap();
        }
        let reopened = PlanCache::open(&path).unwrap();
        assert_eq!(reopened.get("books by aldus"), Some(sample_plan()));
    }

    #[test]
    fn distinct_text_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PlanCache::open(dir.path().join("cache.jsonl")).unwrap();
        cache.put("books by aldus", &sample_plan()).unwrap();
        assert!(cache.get("books by someone else").is_none());
    }
}
