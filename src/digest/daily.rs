//! Daily digest: Beijing civil date, top-N editorial prompt, fixed
//! multi-message rendering, template fallback.

use super::{
    BriefPick, DigestComposer, DigestOutput, char_len, number_messages, stars, template,
};
use crate::llm::{CallOpts, ROUTER_VERSION, ResponseFormat, prompts};
use crate::models::digest::{DigestRecord, DigestSection, DigestSignalRef, DigestType};
use crate::models::signal::Signal;
use crate::score::strip_code_fences;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::time::Instant;

const DAILY_MAX_TOKENS: u32 = 4096;
const FULL_SECTION_CAP: usize = 10;

/// Daily digests close at Beijing midnight: shift UTC by +8h, then take the
/// civil date.
pub fn beijing_date_str(now: DateTime<Utc>) -> String {
    (now + Duration::hours(8)).format("%Y-%m-%d").to_string()
}

#[derive(Debug, Deserialize)]
struct DailyLlmResponse {
    #[serde(default, rename = "fullSummary")]
    full_summary: Vec<DailyFullEntry>,
    #[serde(default, rename = "briefList")]
    brief_list: Vec<BriefPick>,
    #[serde(default)]
    themes: Vec<String>,
    #[serde(default)]
    insights: String,
}

#[derive(Debug, Deserialize)]
struct DailyFullEntry {
    #[serde(default)]
    rank: u32,
    #[serde(default)]
    signal_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    link: String,
}

impl DigestComposer<'_> {
    pub async fn compose_daily(&self, now: DateTime<Utc>) -> anyhow::Result<DigestOutput> {
        let date_str = beijing_date_str(now);
        let started = Instant::now();
        let signals = self.store.list_by_date(&date_str).await?;

        if signals.is_empty() {
            let placeholder =
                format!("**📡 每日科技信号日报 · {date_str}**\n\n今日暂无新信号，明天见。");
            return Ok(DigestOutput {
                markdown: placeholder.clone(),
                messages: vec![placeholder],
                record: None,
            });
        }

        if !self.config.daily_llm_enabled || !self.router.is_available() {
            return self
                .daily_template(&date_str, &signals, started, "simple_template", now)
                .await;
        }

        let split = signals
            .len()
            .min(self.config.daily_max_signals_for_llm)
            .min(FULL_SECTION_CAP);
        let (full_slice, brief_slice) = signals.split_at(split);
        let full_refs: Vec<&Signal> = full_slice.iter().collect();
        let brief_refs: Vec<&Signal> = brief_slice.iter().collect();

        let system = prompts::daily_system(&date_str);
        let user = prompts::daily_user(&full_refs, &brief_refs, &date_str);
        let opts = CallOpts {
            response_format: ResponseFormat::Json,
            timeout_ms: self.config.llm_timeout_daily_ms,
            max_tokens: DAILY_MAX_TOKENS,
        };

        let Some(raw) = self.router.call_llm(&system, &user, &opts).await? else {
            tracing::warn!("daily digest: all providers failed, using template");
            return self
                .daily_template(&date_str, &signals, started, "simple_template_fallback", now)
                .await;
        };
        let parsed: DailyLlmResponse = match serde_json::from_str(strip_code_fences(&raw)) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("daily digest JSON unusable ({e}), using template");
                return self
                    .daily_template(&date_str, &signals, started, "simple_template_fallback", now)
                    .await;
            }
        };

        let mut entries = parsed.full_summary;
        entries.sort_by_key(|e| e.rank);
        entries.truncate(FULL_SECTION_CAP);
        // The prompt asks for one entry per offered signal; anything less is
        // rendered as-is but flagged in provenance.
        let degraded = entries.len() < full_refs.len();
        if degraded {
            tracing::warn!(
                "daily digest degraded: {} of {} entries returned",
                entries.len(),
                full_refs.len()
            );
        }
        let generated_by = if degraded {
            format!("{ROUTER_VERSION}_degraded")
        } else {
            ROUTER_VERSION.to_string()
        };

        let rendered: Vec<String> = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| render_entry(i + 1, entry, full_refs.get(i).copied()))
            .collect();

        // Fixed shape: header + ranks 1-3, then 4-6, then 7-10, then themes
        // and insights; the middle messages drop out with their rank range.
        let mut header = format!(
            "**📡 每日科技信号日报 · {date_str}**\n\n共捕获 {} 条信号",
            signals.len()
        );
        for entry in &rendered[..rendered.len().min(3)] {
            header.push_str("\n\n");
            header.push_str(entry);
        }
        let mut parts = vec![header];
        if rendered.len() > 3 {
            parts.push(rendered[3..rendered.len().min(6)].join("\n\n"));
        }
        if rendered.len() > 6 {
            parts.push(rendered[6..rendered.len().min(FULL_SECTION_CAP)].join("\n\n"));
        }
        parts.push(format!(
            "【今日关键词】\n{}\n\n【今日趋势洞察】\n{}",
            parsed.themes.join(" / "),
            parsed.insights
        ));

        let markdown = parts.join("\n\n");
        let messages = number_messages(parts);

        let mut refs = Vec::with_capacity(entries.len() + parsed.brief_list.len());
        for (i, entry) in entries.iter().enumerate() {
            if let Some(signal_id) = resolve_id(&entry.signal_id, full_refs.get(i).copied()) {
                refs.push(DigestSignalRef {
                    signal_id,
                    rank: (i + 1) as u32,
                    section: DigestSection::Full,
                });
            }
        }
        let mut brief_list = parsed.brief_list;
        brief_list.sort_by_key(|b| b.rank);
        for (i, pick) in brief_list.iter().enumerate() {
            if let Some(signal_id) = resolve_id(&pick.signal_id, brief_refs.get(i).copied()) {
                refs.push(DigestSignalRef {
                    signal_id,
                    rank: (entries.len() + i + 1) as u32,
                    section: DigestSection::Brief,
                });
            }
        }

        let record = DigestRecord {
            digest_id: format!("daily_{date_str}"),
            digest_type: DigestType::Daily,
            date: date_str.clone(),
            signals: refs,
            themes: parsed.themes,
            generated_by,
            prompt_version: self.config.prompt_version.clone(),
            prompt_hash: prompts::prompt_hash(&system),
            generation_time_ms: started.elapsed().as_millis() as u64,
            content_markdown: markdown.clone(),
            content_length: char_len(&markdown),
            created_at: now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        };
        self.write_record(&record, &date_str).await?;

        Ok(DigestOutput {
            markdown,
            messages,
            record: Some(record),
        })
    }

    async fn daily_template(
        &self,
        date_str: &str,
        signals: &[Signal],
        started: Instant,
        generated_by: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<DigestOutput> {
        let markdown = template::render(DigestType::Daily, date_str, signals);
        let refs = signals
            .iter()
            .enumerate()
            .map(|(i, s)| DigestSignalRef {
                signal_id: s.id.clone(),
                rank: (i + 1) as u32,
                section: DigestSection::Full,
            })
            .collect();
        let record = DigestRecord {
            digest_id: format!("daily_{date_str}"),
            digest_type: DigestType::Daily,
            date: date_str.to_string(),
            signals: refs,
            themes: Vec::new(),
            generated_by: generated_by.to_string(),
            prompt_version: self.config.prompt_version.clone(),
            prompt_hash: "none".to_string(),
            generation_time_ms: started.elapsed().as_millis() as u64,
            content_markdown: markdown.clone(),
            content_length: char_len(&markdown),
            created_at: now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        };
        self.write_record(&record, date_str).await?;
        Ok(DigestOutput {
            markdown: markdown.clone(),
            messages: vec![markdown],
            record: Some(record),
        })
    }
}

fn render_entry(rank: usize, entry: &DailyFullEntry, signal: Option<&Signal>) -> String {
    let title = pick(&entry.title, signal.map(|s| s.title.as_str()));
    let source = pick(&entry.source, signal.map(|s| s.source.as_str()));
    let summary = pick(&entry.summary, signal.map(|s| s.summary_zh.as_str()));
    let link = pick(&entry.link, signal.map(|s| s.link.as_str()));
    let score = if entry.score >= 1.0 {
        (entry.score.round() as i64).clamp(1, 5) as u8
    } else {
        signal.map(|s| s.value_score).unwrap_or(3)
    };
    format!(
        "**{rank}. {title}**\n来源: {source} | 评分: {}\n{summary}\n🔗 {link}",
        stars(score)
    )
}

fn pick<'a>(primary: &'a str, fallback: Option<&'a str>) -> &'a str {
    if primary.trim().is_empty() {
        fallback.unwrap_or("")
    } else {
        primary
    }
}

fn resolve_id(reported: &str, signal: Option<&Signal>) -> Option<String> {
    if reported.trim().is_empty() {
        signal.map(|s| s.id.clone())
    } else {
        Some(reported.to_string())
    }
}
