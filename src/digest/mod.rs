//! Digest composition: reads the signal store's indexes, asks the router
//! for an editorial digest, falls back to a deterministic template, and
//! always makes the DigestRecord durable before messages leave the core.

pub mod daily;
pub mod template;
pub mod weekly;

use crate::config::RadarConfig;
use crate::kv::KvStore;
use crate::llm::LlmRouter;
use crate::models::digest::DigestRecord;
use crate::store::{self, SignalStore};
use serde::Deserialize;
use std::sync::Arc;

pub struct DigestOutput {
    pub markdown: String,
    pub messages: Vec<String>,
    /// `None` on empty days: nothing is written then.
    pub record: Option<DigestRecord>,
}

pub struct DigestComposer<'a> {
    pub(crate) kv: &'a Arc<dyn KvStore>,
    pub(crate) store: &'a SignalStore,
    pub(crate) router: &'a LlmRouter,
    pub(crate) config: &'a RadarConfig,
}

impl<'a> DigestComposer<'a> {
    pub fn new(
        kv: &'a Arc<dyn KvStore>,
        store: &'a SignalStore,
        router: &'a LlmRouter,
        config: &'a RadarConfig,
    ) -> Self {
        Self {
            kv,
            store,
            router,
            config,
        }
    }

    pub(crate) async fn write_record(
        &self,
        record: &DigestRecord,
        period: &str,
    ) -> anyhow::Result<()> {
        let key = store::digest_key(record.digest_type.as_str(), period);
        self.kv
            .put(&key, &serde_json::to_vec(record)?, Some(store::DIGEST_TTL_SECS))
            .await?;
        Ok(())
    }
}

/// Name-only pick as reported in `briefList` / `otherPicks`; everything but
/// the id is reproducible from the store, so only these two fields matter.
#[derive(Debug, Deserialize)]
pub(crate) struct BriefPick {
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub signal_id: String,
}

/// Prefix each message with `**[消息 i/N]**` so reading order survives
/// parallel delivery. Single-message digests carry no prefix.
pub(crate) fn number_messages(parts: Vec<String>) -> Vec<String> {
    let total = parts.len();
    if total <= 1 {
        return parts;
    }
    parts
        .into_iter()
        .enumerate()
        .map(|(i, body)| format!("**[消息 {}/{}]**\n\n{}", i + 1, total, body))
        .collect()
}

pub(crate) fn stars(score: u8) -> String {
    let filled = score.clamp(1, 5) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

/// Content length counted in Unicode scalars: CJK digest text is budgeted
/// per character, not per byte.
pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}
