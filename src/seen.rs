//! Seen-set: bounded-retention dedup markers under the `seen:` prefix.
//! Read errors fail open (the item is treated as unseen), write errors are
//! retried then swallowed; a duplicate on the next tick is tolerable.

use crate::kv::KvStore;
use crate::models::signal::{RawItem, SeenMarker};
use chrono::{DateTime, Utc};
use futures_util::future;
use std::sync::Arc;
use std::time::Duration;

const MARK_RETRIES: u32 = 3;

fn seen_key(raw_id: &str) -> String {
    format!("seen:{raw_id}")
}

pub struct SeenSet {
    kv: Arc<dyn KvStore>,
    retention_days: u32,
}

impl SeenSet {
    pub fn new(kv: Arc<dyn KvStore>, retention_days: u32) -> Self {
        Self { kv, retention_days }
    }

    /// Keep only items whose id has no live marker. Lookups run in
    /// parallel; a failed lookup counts as unseen.
    pub async fn filter_new(&self, items: Vec<RawItem>) -> Vec<RawItem> {
        let keys: Vec<String> = items.iter().map(|item| seen_key(&item.id)).collect();
        let lookups = keys.iter().map(|key| self.kv.get(key));
        let results = future::join_all(lookups).await;
        items
            .into_iter()
            .zip(results)
            .filter_map(|(item, result)| match result {
                Ok(Some(_)) => None,
                Ok(None) => Some(item),
                Err(e) => {
                    tracing::warn!("seen lookup failed for {}, treating as unseen: {e}", item.id);
                    Some(item)
                }
            })
            .collect()
    }

    /// Write a `{seenAt}` marker for each id with the retention TTL.
    /// Each write retries up to 3 times with exponential backoff, then the
    /// failure is logged and dropped.
    pub async fn mark_seen(&self, raw_ids: &[String], now: DateTime<Utc>) {
        let ttl_secs = self.retention_days as u64 * 86_400;
        let marker = SeenMarker {
            seen_at: now.timestamp_millis(),
        };
        let bytes = match serde_json::to_vec(&marker) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("seen marker encode failed: {e}");
                return;
            }
        };
        for raw_id in raw_ids {
            let key = seen_key(raw_id);
            let mut delay = Duration::from_millis(100);
            for attempt in 0..=MARK_RETRIES {
                match self.kv.put(&key, &bytes, Some(ttl_secs)).await {
                    Ok(()) => break,
                    Err(e) if attempt == MARK_RETRIES => {
                        tracing::warn!("mark_seen gave up on {raw_id}: {e}");
                    }
                    Err(e) => {
                        tracing::debug!("mark_seen retrying {raw_id} (attempt {attempt}): {e}");
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
    }
}
