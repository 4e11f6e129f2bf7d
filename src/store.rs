//! Signal store: signal payloads under day-scoped keys plus grow-only daily
//! and ISO-week indexes, all in the flat KV namespace. Indexes self-heal on
//! read; re-stores are idempotent overwrites.

use crate::kv::KvStore;
use crate::models::signal::Signal;
use crate::score::weighted_score;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::sync::Arc;

pub const SIGNAL_TTL_SECS: u64 = 90 * 24 * 3600;
pub const INDEX_TTL_SECS: u64 = 90 * 24 * 3600;
pub const DIGEST_TTL_SECS: u64 = 365 * 24 * 3600;

pub fn signal_key(date: &str, signal_id: &str) -> String {
    format!("signal:{date}:{signal_id}")
}

pub fn daily_index_key(date: &str) -> String {
    format!("index:daily:{date}")
}

pub fn weekly_index_key(week: &str) -> String {
    format!("index:weekly:{week}")
}

pub fn digest_key(kind: &str, period: &str) -> String {
    format!("digest:{kind}:{period}")
}

pub fn utc_date_str(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// ISO-8601 week label for a date, e.g. `2026-W05` (Monday start, week 1
/// contains Jan 4).
pub fn iso_week_str(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Monday of ISO week `week` of `year`: anchor on Jan 4 (always inside week
/// 1), walk back to that week's Monday, then step forward whole weeks.
pub fn week_monday(year: i32, week: u32) -> Option<NaiveDate> {
    let jan4 = NaiveDate::from_ymd_opt(year, 1, 4)?;
    let back = jan4.weekday().number_from_monday() as i64 - 1;
    let week1_monday = jan4 - Duration::days(back);
    Some(week1_monday + Duration::days(7 * (week as i64 - 1)))
}

/// The seven UTC dates of the given ISO week, Monday first.
pub fn week_dates(year: i32, week: u32) -> Vec<NaiveDate> {
    match week_monday(year, week) {
        Some(monday) => (0..7).map(|d| monday + Duration::days(d)).collect(),
        None => Vec::new(),
    }
}

/// `2026-W05` -> `(2026, 5)`.
fn parse_week_label(week: &str) -> Option<(i32, u32)> {
    let (year, w) = week.split_once("-W")?;
    Some((year.parse().ok()?, w.parse().ok()?))
}

pub struct SignalStore {
    kv: Arc<dyn KvStore>,
}

impl SignalStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Persist the signal under today's day key, then append its id to the
    /// daily and weekly indexes. Index inserts suppress duplicates; a crash
    /// between the writes is recovered by the self-healing read path.
    pub async fn store(&self, mut signal: Signal, now: DateTime<Utc>) -> anyhow::Result<()> {
        anyhow::ensure!(
            signal.value_score == weighted_score(&signal.score_breakdown),
            "signal {} value_score {} does not match its breakdown",
            signal.id,
            signal.value_score,
        );
        let date_str = utc_date_str(now);
        let week_str = iso_week_str(now.date_naive());
        signal.stored_at = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let payload = serde_json::to_vec(&signal)?;
        self.kv
            .put(&signal_key(&date_str, &signal.id), &payload, Some(SIGNAL_TTL_SECS))
            .await?;
        self.append_index(&daily_index_key(&date_str), &signal.id).await?;
        self.append_index(&weekly_index_key(&week_str), &signal.id).await?;
        tracing::debug!("stored signal {} (score {})", signal.id, signal.value_score);
        Ok(())
    }

    /// Signals of one UTC day, sorted by `value_score` desc then
    /// `detected_at` desc. Orphan index entries are pruned on the way.
    pub async fn list_by_date(&self, date: &str) -> anyhow::Result<Vec<Signal>> {
        let key = daily_index_key(date);
        let ids = self.read_index(&key).await?;
        let mut signals = Vec::with_capacity(ids.len());
        let mut live_ids = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.read_signal(date, id).await? {
                Some(signal) => {
                    live_ids.push(id.clone());
                    signals.push(signal);
                }
                None => {
                    tracing::warn!("pruning orphan index entry {id} from {key}");
                }
            }
        }
        if live_ids.len() != ids.len() {
            self.write_index(&key, &live_ids).await?;
        }
        sort_signals(&mut signals);
        Ok(signals)
    }

    /// Signals of one ISO week. Payloads live under their day key, so each
    /// candidate id is resolved against the week's seven dates, at most one
    /// read per (date, id) and none once found.
    pub async fn list_by_week(&self, week: &str) -> anyhow::Result<Vec<Signal>> {
        let key = weekly_index_key(week);
        let ids = self.read_index(&key).await?;
        let Some((year, week_no)) = parse_week_label(week) else {
            anyhow::bail!("malformed week label: {week}");
        };

        let mut remaining = ids.clone();
        let mut signals = Vec::with_capacity(ids.len());
        for date in week_dates(year, week_no) {
            if remaining.is_empty() {
                break;
            }
            let date_str = date.format("%Y-%m-%d").to_string();
            let mut unresolved = Vec::with_capacity(remaining.len());
            for id in remaining {
                match self.read_signal(&date_str, &id).await? {
                    Some(signal) => signals.push(signal),
                    None => unresolved.push(id),
                }
            }
            remaining = unresolved;
        }

        if !remaining.is_empty() {
            tracing::warn!("pruning {} orphan entries from {key}", remaining.len());
            let live: Vec<String> = ids
                .into_iter()
                .filter(|id| !remaining.contains(id))
                .collect();
            self.write_index(&key, &live).await?;
        }
        sort_signals(&mut signals);
        Ok(signals)
    }

    /// Read one signal payload; `None` for missing records. Rows violating
    /// the score invariant are dropped with a warning, not propagated.
    async fn read_signal(&self, date: &str, id: &str) -> anyhow::Result<Option<Signal>> {
        let Some(bytes) = self.kv.get(&signal_key(date, id)).await? else {
            return Ok(None);
        };
        let signal: Signal = match serde_json::from_slice(&bytes) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("dropping undecodable signal {id} at {date}: {e}");
                return Ok(None);
            }
        };
        if signal.value_score != weighted_score(&signal.score_breakdown) {
            tracing::warn!(
                "dropping signal {id}: value_score {} does not match breakdown",
                signal.value_score
            );
            return Ok(None);
        }
        Ok(Some(signal))
    }

    async fn read_index(&self, key: &str) -> anyhow::Result<Vec<String>> {
        match self.kv.get(key).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(ids) => Ok(ids),
                Err(e) => {
                    tracing::warn!("resetting undecodable index {key}: {e}");
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    async fn write_index(&self, key: &str, ids: &[String]) -> anyhow::Result<()> {
        self.kv
            .put(key, &serde_json::to_vec(ids)?, Some(INDEX_TTL_SECS))
            .await?;
        Ok(())
    }

    /// Read-modify-write append; inserting an id already present is a no-op.
    async fn append_index(&self, key: &str, id: &str) -> anyhow::Result<()> {
        let mut ids = self.read_index(key).await?;
        if ids.iter().any(|existing| existing == id) {
            return Ok(());
        }
        ids.push(id.to_string());
        self.write_index(key, &ids).await
    }
}

fn sort_signals(signals: &mut [Signal]) {
    signals.sort_by(|a, b| {
        b.value_score
            .cmp(&a.value_score)
            .then_with(|| b.detected_at.cmp(&a.detected_at))
    });
}
