use serde::{Deserialize, Serialize};
use std::fmt;

/// Feed a raw item came from. Known sources serialize as their snake_case
/// name; anything else round-trips as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    HackerNews,
    ProductHunt,
    #[serde(untagged)]
    Other(String),
}

impl Source {
    pub fn as_str(&self) -> &str {
        match self {
            Source::HackerNews => "hacker_news",
            Source::ProductHunt => "product_hunt",
            Source::Other(s) => s,
        }
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        match s {
            "hacker_news" => Source::HackerNews,
            "product_hunt" => Source::ProductHunt,
            other => Source::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate item as handed over by a feed adapter. Transient: never
/// persisted, only its id survives in the seen-set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawItem {
    /// Stable dedup key across refetches of the same logical item.
    pub id: String,
    pub source: Source,
    pub title: String,
    #[serde(default)]
    pub link: String,
    /// ISO8601 UTC, e.g. `2026-01-20T08:30:00Z`.
    #[serde(default)]
    pub detected_at: String,
}

/// Five integer dimensions in 1..=5. Always fully populated on a persisted
/// signal; the calibrator fills gaps with the neutral 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub innovation: u8,
    pub relevance: u8,
    pub actionability: u8,
    pub signal_strength: u8,
    pub timeliness: u8,
}

impl Default for ScoreBreakdown {
    fn default() -> Self {
        Self {
            innovation: 3,
            relevance: 3,
            actionability: 3,
            signal_strength: 3,
            timeliness: 3,
        }
    }
}

/// The durable unit of the pipeline: a scored, summarized item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// `{source}_{raw_item_id}`, globally unique in the store.
    pub id: String,
    pub source: Source,
    pub title: String,
    pub link: String,
    /// 150-250 CJK chars; the pipeline never truncates it mid-sentence.
    pub summary_zh: String,
    /// Always equals the weighted score of `score_breakdown`.
    pub value_score: u8,
    pub score_breakdown: ScoreBreakdown,
    pub score_confidence: f64,
    pub score_reasoning: String,
    /// Present whenever `score_confidence < 0.8`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty_reason: Option<String>,
    pub detected_at: String,
    /// Assigned by the store on persist.
    #[serde(default)]
    pub stored_at: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub target_audience: String,
    /// Initialized to 0 here.
    /// TODO: increment from the chat collaborator's feedback callback once
    /// that callback lands.
    #[serde(default)]
    pub feedback_count: u32,
}

impl Signal {
    pub fn derive_id(source: &Source, raw_id: &str) -> String {
        format!("{}_{}", source.as_str(), raw_id)
    }
}

/// Seen-set marker, keyed by `RawItem.id` with the retention TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenMarker {
    #[serde(rename = "seenAt")]
    pub seen_at: i64,
}
