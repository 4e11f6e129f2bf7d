use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestType {
    Daily,
    Weekly,
}

impl DigestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestType::Daily => "daily",
            DigestType::Weekly => "weekly",
        }
    }
}

/// Where a signal landed in the digest: top-N with a summary, or name-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestSection {
    Full,
    Brief,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestSignalRef {
    pub signal_id: String,
    pub rank: u32,
    pub section: DigestSection,
}

/// Fully-composed digest, written once under `digest:{type}:{period}` with a
/// 1-year TTL and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestRecord {
    /// `daily_YYYY-MM-DD` or `weekly_YYYY-WWW`.
    pub digest_id: String,
    #[serde(rename = "type")]
    pub digest_type: DigestType,
    pub date: String,
    pub signals: Vec<DigestSignalRef>,
    pub themes: Vec<String>,
    /// Producer identifier, router version included (`simple_template` for
    /// the non-LLM renderer).
    pub generated_by: String,
    pub prompt_version: String,
    /// 8-hex fingerprint of the system prompt, `"none"` for templates.
    pub prompt_hash: String,
    pub generation_time_ms: u64,
    pub content_markdown: String,
    /// Unicode scalar count of `content_markdown`.
    pub content_length: usize,
    pub created_at: String,
}
